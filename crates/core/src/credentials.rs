use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment variable names the credential snapshot is read from
pub mod env {
    pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
    pub const OURA_API_TOKEN: &str = "OURA_API_TOKEN";
    pub const GOOGLE_CLIENT_ID: &str = "GOOGLE_CLIENT_ID";
    pub const GOOGLE_CLIENT_SECRET: &str = "GOOGLE_CLIENT_SECRET";
    pub const GOOGLE_REFRESH_TOKEN: &str = "GOOGLE_REFRESH_TOKEN";
    pub const GOOGLE_DRIVE_FOLDER_ID: &str = "GOOGLE_DRIVE_FOLDER_ID";
}

/// Backend service a credential belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    GitHub,
    Oura,
    Google,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GitHub => write!(f, "GitHub"),
            Self::Oura => write!(f, "OURA"),
            Self::Google => write!(f, "Google"),
        }
    }
}

/// Secret value whose `Debug`/`Display` output never reveals the contents
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw value, for building request headers only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// A bearer-style credential for one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCredential {
    pub provider: Provider,
    pub secret: Secret,
}

impl ExternalCredential {
    pub fn new(provider: Provider, secret: impl Into<String>) -> Self {
        Self {
            provider,
            secret: Secret::new(secret),
        }
    }
}

/// OAuth2 refresh-token credentials for the Google APIs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleCredentials {
    pub client_id: String,
    pub client_secret: Secret,
    pub refresh_token: Secret,
}

/// Immutable credential snapshot, taken once at startup.
///
/// Every field is optional: a missing credential only disables the tools
/// that need it, which then report a configuration error naming the
/// missing setting.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub github: Option<ExternalCredential>,
    pub oura: Option<ExternalCredential>,
    pub google: Option<GoogleCredentials>,
    /// Drive folder new documents are created in (root when absent)
    pub google_drive_folder: Option<String>,
}

impl Credentials {
    /// Read the snapshot from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the snapshot from an arbitrary key lookup. Empty values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let google = match (
            get(env::GOOGLE_CLIENT_ID),
            get(env::GOOGLE_CLIENT_SECRET),
            get(env::GOOGLE_REFRESH_TOKEN),
        ) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Some(GoogleCredentials {
                client_id,
                client_secret: Secret::new(client_secret),
                refresh_token: Secret::new(refresh_token),
            }),
            _ => None,
        };

        Self {
            github: get(env::GITHUB_TOKEN).map(|t| ExternalCredential::new(Provider::GitHub, t)),
            oura: get(env::OURA_API_TOKEN).map(|t| ExternalCredential::new(Provider::Oura, t)),
            google,
            google_drive_folder: get(env::GOOGLE_DRIVE_FOLDER_ID),
        }
    }

    /// Names of the providers that have credentials configured
    pub fn configured_providers(&self) -> Vec<Provider> {
        let mut providers = Vec::new();
        if self.github.is_some() {
            providers.push(Provider::GitHub);
        }
        if self.oura.is_some() {
            providers.push(Provider::Oura);
        }
        if self.google.is_some() {
            providers.push(Provider::Google);
        }
        providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_secret_is_redacted() {
        let cred = ExternalCredential::new(Provider::GitHub, "ghp_supersecret");
        let debug = format!("{:?}", cred);
        assert!(!debug.contains("ghp_supersecret"));
        assert!(debug.contains("redacted"));
        assert_eq!(cred.secret.expose(), "ghp_supersecret");
    }

    #[test]
    fn test_from_lookup_partial() {
        let creds = Credentials::from_lookup(lookup(&[
            ("GITHUB_TOKEN", "ghp_x"),
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
        ]));

        assert!(creds.github.is_some());
        assert!(creds.oura.is_none());
        // Google needs all three values
        assert!(creds.google.is_none());
        assert_eq!(creds.configured_providers(), vec![Provider::GitHub]);
    }

    #[test]
    fn test_empty_values_are_absent() {
        let creds = Credentials::from_lookup(lookup(&[("OURA_API_TOKEN", "  ")]));
        assert!(creds.oura.is_none());
    }

    #[test]
    fn test_google_credentials_complete() {
        let creds = Credentials::from_lookup(lookup(&[
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("GOOGLE_REFRESH_TOKEN", "refresh"),
            ("GOOGLE_DRIVE_FOLDER_ID", "folder-1"),
        ]));

        let google = creds.google.expect("google credentials");
        assert_eq!(google.client_id, "id");
        assert_eq!(google.refresh_token.expose(), "refresh");
        assert_eq!(creds.google_drive_folder.as_deref(), Some("folder-1"));
    }
}
