use crate::catalogue::model::{Dataset, Protocol, ProtocolFilter, Resource};
use crate::datasource::DatasourcePriority;
use crate::error::{CatalogueError, Result};

pub const DEFAULT_PROTOCOL_PREFERENCE: &[Protocol] = &[Protocol::Wfs, Protocol::Wmts, Protocol::Wms];

/// Pick the resource of `dataset` to provision.
///
/// Candidates are the resources accepted by `filter`. The winner has the
/// best-ranked datasource; ties go to service resources over files, then to
/// the earliest protocol in `preference`, then to payload order.
pub fn select_resource<'a>(
    dataset: &'a Dataset,
    priority: &DatasourcePriority,
    filter: ProtocolFilter,
    preference: &[Protocol],
) -> Result<&'a Resource> {
    dataset
        .resources
        .iter()
        .enumerate()
        .filter(|(_, resource)| filter.matches(resource.protocol()))
        .min_by_key(|(position, resource)| {
            let protocol = resource.protocol();
            let protocol_rank = preference
                .iter()
                .position(|p| *p == protocol)
                .unwrap_or(preference.len());
            (
                priority.sort_key(&resource.datasource),
                !resource.is_ows(),
                protocol_rank,
                *position,
            )
        })
        .map(|(_, resource)| resource)
        .ok_or_else(|| CatalogueError::NoResourceAvailable {
            dataset: dataset.id.clone(),
        })
}
