mod common;

use common::{Reply, TestServer, availability_document, collections_document, datasets_document, routes};
use geo_catalogue::{CatalogueError, Credentials, Protocol, RegistryClient};
use std::time::Duration;

async fn catalogue_server(availability: Reply) -> TestServer {
    TestServer::start(routes(vec![
        ("/api/datasets", Reply::json(&datasets_document("https://files.example.org"))),
        ("/api/datasetCollections", Reply::json(&collections_document())),
        ("/api/datasetAvailabilities", availability),
    ]))
    .await
}

fn client_for(server: &TestServer) -> RegistryClient {
    RegistryClient::builder(server.url("/api"))
        .with_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

#[tokio::test]
async fn fetch_builds_snapshot_from_all_documents() {
    let server = catalogue_server(Reply::json(&availability_document())).await;
    let snapshot = client_for(&server).fetch().await.unwrap();

    assert_eq!(snapshot.len(), 3);
    let forest = snapshot.dataset("forest").unwrap();
    assert_eq!(forest.availability.as_deref(), Some("online"));
    assert_eq!(forest.owners, vec!["Agency A"]);
    let protocols: Vec<Protocol> = forest.resources.iter().map(|r| r.protocol()).collect();
    assert_eq!(protocols, vec![Protocol::Wms, Protocol::File]);

    let coast = snapshot.dataset("coast").unwrap();
    assert_eq!(coast.resources[0].url(), "https://api.dataforsyningen.dk/wfs?token=");
    assert_eq!(coast.resources[0].datasource, "dataforsyningen");

    assert!(snapshot.dataset("empty").unwrap().resources.is_empty());
    assert_eq!(snapshot.collections[0].datasets, vec!["forest"]);

    let requests = server.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().any(|r| r.contains("/api/datasets?include=wfssource,wmssource")));
    assert!(requests.iter().all(|r| r.contains("locale=da")));
}

#[tokio::test]
async fn missing_availability_is_not_fatal() {
    let server = catalogue_server(Reply::status(503, "maintenance")).await;
    let snapshot = client_for(&server).fetch().await.unwrap();

    assert_eq!(snapshot.len(), 3);
    assert!(snapshot.datasets.iter().all(|d| d.availability.is_none()));
}

#[tokio::test]
async fn server_error_is_network_failure() {
    let server = TestServer::start(routes(vec![
        ("/api/datasets", Reply::status(500, "boom")),
        ("/api/datasetCollections", Reply::json(&collections_document())),
    ]))
    .await;

    let err = client_for(&server).fetch().await.unwrap_err();
    match err {
        CatalogueError::NetworkFailure { message } => assert!(message.contains("datasets")),
        other => panic!("expected a network failure, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_payload_is_parse_failure() {
    let server = TestServer::start(routes(vec![
        ("/api/datasets", Reply::ok("application/json", "{\"data\": 42}")),
        ("/api/datasetCollections", Reply::json(&collections_document())),
    ]))
    .await;

    let err = client_for(&server).fetch().await.unwrap_err();
    assert!(matches!(err, CatalogueError::ParseFailure { .. }));
}

#[tokio::test]
async fn endpoint_credentials_are_sent_as_headers() {
    let server = catalogue_server(Reply::json(&availability_document())).await;
    let client = RegistryClient::builder(server.url("/api"))
        .with_credentials(Some(Credentials::bearer("catalogue-token")))
        .build()
        .unwrap();

    client.fetch().await.unwrap();
    assert!(server
        .requests()
        .iter()
        .all(|r| r.contains("authorization: bearer catalogue-token")));
}

#[tokio::test]
async fn fetch_from_validates_endpoint() {
    let server = catalogue_server(Reply::json(&availability_document())).await;
    let client = client_for(&server);

    let err = client.fetch_catalogue_from("", None).await.unwrap_err();
    assert!(matches!(err, CatalogueError::Validation(_)));
    assert_eq!(server.hits(), 0);
}
