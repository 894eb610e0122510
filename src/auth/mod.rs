//! Credential values, their per-scheme configuration and injection
//!
//! The engine never authenticates on its own. It picks the configured value
//! for a datasource's scheme and writes it into the resource URL (and the
//! download request headers).

pub mod resolver;

pub use resolver::CredentialResolver;

use crate::datasource::AuthScheme;
use crate::error::{CatalogueError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Credentials {
    #[default]
    Anonymous,
    Basic { login: String, password: String },
    Bearer { token: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Anonymous => f.write_str("Anonymous"),
            Credentials::Basic { login, .. } => f
                .debug_struct("Basic")
                .field("login", login)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Bearer { .. } => f.debug_struct("Bearer").field("token", &"<redacted>").finish(),
        }
    }
}

impl Credentials {
    pub fn basic(login: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            login: login.into(),
            password: password.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Credentials::Bearer { token: token.into() }
    }

    /// Anonymous, or a value whose fields are all blank
    pub fn is_empty(&self) -> bool {
        match self {
            Credentials::Anonymous => true,
            Credentials::Basic { login, password } => login.trim().is_empty() && password.is_empty(),
            Credentials::Bearer { token } => token.trim().is_empty(),
        }
    }

    pub fn scheme(&self) -> AuthScheme {
        match self {
            Credentials::Anonymous => AuthScheme::None,
            Credentials::Basic { .. } => AuthScheme::BasicLogin,
            Credentials::Bearer { .. } => AuthScheme::BearerToken,
        }
    }

    /// Rewrite the scheme's credential query keys in `url`.
    ///
    /// Only keys already present are replaced; other query pairs keep their
    /// order. URLs without the keys are returned unchanged.
    pub fn apply_to_url(&self, url: &str) -> Result<String> {
        let values: Vec<(&str, &str)> = match self {
            Credentials::Anonymous => return Ok(url.to_string()),
            Credentials::Basic { login, password } => {
                vec![("username", login.as_str()), ("password", password.as_str())]
            }
            Credentials::Bearer { token } => vec![("token", token.as_str())],
        };

        if !self.scheme().gates_url(url) {
            return Ok(url.to_string());
        }

        let mut parsed = url::Url::parse(url)?;
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(key, value)| {
                let replaced = values
                    .iter()
                    .find(|(name, _)| *name == key)
                    .map(|(_, v)| v.to_string());
                (key.into_owned(), replaced.unwrap_or_else(|| value.into_owned()))
            })
            .collect();
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
        Ok(parsed.to_string())
    }

    pub fn apply_to_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Credentials::Anonymous => request,
            Credentials::Basic { login, password } => request.basic_auth(login, Some(password)),
            Credentials::Bearer { token } => request.bearer_auth(token),
        }
    }
}

const REDACTED: &str = "REDACTED";

fn is_credential_key(key: &str) -> bool {
    [AuthScheme::BasicLogin, AuthScheme::BearerToken]
        .into_iter()
        .flat_map(AuthScheme::query_keys)
        .any(|k| k.eq_ignore_ascii_case(key))
}

/// `url` with credential query values and any userinfo password masked.
///
/// Use it for every URL that reaches a log field or an error message.
pub fn redact_url(url: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(url) else {
        return match url.split_once('?') {
            Some((base, _)) => format!("{}?{}", base, REDACTED),
            None => url.to_string(),
        };
    };

    let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    let has_secret_pair = pairs.iter().any(|(k, v)| is_credential_key(k) && !v.is_empty());
    let has_password = parsed.password().is_some();
    if !has_secret_pair && !has_password {
        return url.to_string();
    }

    if has_password {
        let _ = parsed.set_password(Some(REDACTED));
    }
    if has_secret_pair {
        let masked = pairs.into_iter().map(|(key, value)| {
            if is_credential_key(&key) && !value.is_empty() {
                (key, REDACTED.to_string())
            } else {
                (key, value)
            }
        });
        parsed.query_pairs_mut().clear().extend_pairs(masked);
    }
    parsed.to_string()
}

/// Default and override value for one scheme
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemeCredentials {
    #[serde(default)]
    pub default: Option<Credentials>,
    #[serde(default)]
    pub override_value: Option<Credentials>,
    #[serde(default)]
    pub override_enabled: bool,
}

impl SchemeCredentials {
    /// The value in effect: an enabled override replaces the default entirely
    pub fn effective(&self) -> Option<&Credentials> {
        let chosen = if self.override_enabled {
            self.override_value.as_ref()
        } else {
            self.default.as_ref()
        };
        chosen.filter(|c| !c.is_empty())
    }
}

/// Credential configuration for every scheme, persisted as one record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CredentialStore {
    #[serde(default)]
    pub basic: SchemeCredentials,
    #[serde(default)]
    pub bearer: SchemeCredentials,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_scheme(&self, scheme: AuthScheme) -> Option<&SchemeCredentials> {
        match scheme {
            AuthScheme::None => None,
            AuthScheme::BasicLogin => Some(&self.basic),
            AuthScheme::BearerToken => Some(&self.bearer),
        }
    }

    fn slot_mut(&mut self, scheme: AuthScheme, value: &Credentials) -> Result<&mut SchemeCredentials> {
        if value.scheme() != scheme {
            return Err(CatalogueError::Validation(format!(
                "{} credentials cannot be used for the {} scheme",
                value.scheme(),
                scheme
            )));
        }
        match scheme {
            AuthScheme::None => Err(CatalogueError::Validation(
                "The none scheme takes no credentials".to_string(),
            )),
            AuthScheme::BasicLogin => Ok(&mut self.basic),
            AuthScheme::BearerToken => Ok(&mut self.bearer),
        }
    }

    /// Set the user override for `scheme` and whether it is in effect
    pub fn configure(&mut self, scheme: AuthScheme, value: Credentials, override_enabled: bool) -> Result<()> {
        let slot = self.slot_mut(scheme, &value)?;
        slot.override_value = Some(value);
        slot.override_enabled = override_enabled;
        Ok(())
    }

    /// Set the global default used when no override is enabled
    pub fn set_default(&mut self, scheme: AuthScheme, value: Credentials) -> Result<()> {
        let slot = self.slot_mut(scheme, &value)?;
        slot.default = Some(value);
        Ok(())
    }
}
