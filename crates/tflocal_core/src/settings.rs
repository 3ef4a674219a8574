//! Runtime settings assembled once from the process environment.
//!
//! Every environment variable the wrapper honours is read here and nowhere
//! else. The rest of the crate receives a [`Settings`] value.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

pub const DEFAULT_TF_CMD: &str = "terraform";
pub const DEFAULT_HOSTNAME: &str = "localhost";
pub const DEFAULT_EDGE_PORT: u16 = 4566;
pub const DEFAULT_S3_HOSTNAME: &str = "s3.localhost.localstack.cloud";
pub const DEFAULT_REGION: &str = "us-east-1";

const TRUE_STRINGS: &[&str] = &["1", "true", "yes", "y", "on"];

/// Parse a bool-like environment value.
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    TRUE_STRINGS.contains(&value.as_str())
}

/// Network location of the emulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorEndpoint {
    pub protocol: String,
    pub hostname: String,
    pub port: Option<u16>,
}

impl Default for EmulatorEndpoint {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            hostname: DEFAULT_HOSTNAME.to_string(),
            port: Some(DEFAULT_EDGE_PORT),
        }
    }
}

impl EmulatorEndpoint {
    /// Parse a URL of the form `scheme://host[:port][/path]`.
    pub fn parse_url(url: &str) -> CoreResult<Self> {
        let (protocol, rest) = url
            .trim()
            .split_once("://")
            .ok_or_else(|| CoreError::Settings(format!("AWS_ENDPOINT_URL has no scheme: {url}")))?;
        if protocol != "http" && protocol != "https" {
            return Err(CoreError::Settings(format!(
                "AWS_ENDPOINT_URL scheme must be http or https: {url}"
            )));
        }

        let authority = rest.split('/').next().unwrap_or_default();
        let (hostname, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    CoreError::Settings(format!("AWS_ENDPOINT_URL has an invalid port: {url}"))
                })?;
                (host, Some(port))
            }
            None => (authority, None),
        };
        if hostname.is_empty() {
            return Err(CoreError::Settings(format!("AWS_ENDPOINT_URL has no host: {url}")));
        }

        Ok(Self {
            protocol: protocol.to_string(),
            hostname: hostname.to_string(),
            port,
        })
    }

    /// Base URL for a given host, keeping this endpoint's scheme and port.
    pub fn url_for_host(&self, hostname: &str) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.protocol, hostname, port),
            None => format!("{}://{}", self.protocol, hostname),
        }
    }

    pub fn base_url(&self) -> String {
        self.url_for_host(&self.hostname)
    }
}

/// Validated wrapper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Wrapped binary, `terraform` unless `TF_CMD` says otherwise.
    pub tf_cmd: String,
    pub endpoint: EmulatorEndpoint,
    /// Host used for virtual-hosted S3 addressing.
    pub s3_hostname: String,
    /// Whether the caller's access key may scope emulator accounts.
    pub customize_access_key: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub profile: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub default_region: String,
    pub dry_run: bool,
    pub skip_aliases: BTreeSet<String>,
    /// Extra module directories that receive their own override file.
    pub additional_locations: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tf_cmd: DEFAULT_TF_CMD.to_string(),
            endpoint: EmulatorEndpoint::default(),
            s3_hostname: DEFAULT_S3_HOSTNAME.to_string(),
            customize_access_key: false,
            access_key_id: None,
            secret_access_key: None,
            profile: None,
            credentials_file: None,
            default_region: DEFAULT_REGION.to_string(),
            dry_run: false,
            skip_aliases: BTreeSet::new(),
            additional_locations: Vec::new(),
        }
    }
}

impl Settings {
    /// Read settings from the current process environment.
    pub fn from_env() -> CoreResult<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Build settings from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> CoreResult<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let flag = |key: &str| get(key).map(|v| is_truthy(&v)).unwrap_or(false);

        let endpoint = match get("AWS_ENDPOINT_URL") {
            Some(url) => EmulatorEndpoint::parse_url(&url)?,
            None => {
                let port = match get("EDGE_PORT") {
                    Some(port) => port.parse::<u16>().map_err(|_| {
                        CoreError::Settings(format!(
                            "EDGE_PORT must be a port number, got {port:?}"
                        ))
                    })?,
                    None => DEFAULT_EDGE_PORT,
                };
                EmulatorEndpoint {
                    protocol: if flag("USE_SSL") { "https" } else { "http" }.to_string(),
                    hostname: get("LOCALSTACK_HOSTNAME")
                        .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string()),
                    port: Some(port),
                }
            }
        };

        let credentials_file = get("AWS_SHARED_CREDENTIALS_FILE")
            .map(PathBuf::from)
            .or_else(|| {
                get("HOME")
                    .or_else(|| get("USERPROFILE"))
                    .map(|home| PathBuf::from(home).join(".aws").join("credentials"))
            });

        let default_region = get("AWS_DEFAULT_REGION")
            .or_else(|| get("AWS_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let skip_aliases = get("SKIP_ALIASES")
            .map(|raw| split_list(&raw).map(str::to_string).collect())
            .unwrap_or_default();

        let additional_locations = get("ADDITIONAL_TF_OVERRIDE_LOCATIONS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            tf_cmd: get("TF_CMD").unwrap_or_else(|| DEFAULT_TF_CMD.to_string()),
            endpoint,
            s3_hostname: get("S3_HOSTNAME").unwrap_or_else(|| DEFAULT_S3_HOSTNAME.to_string()),
            customize_access_key: flag("CUSTOMIZE_ACCESS_KEY"),
            access_key_id: get("AWS_ACCESS_KEY_ID"),
            secret_access_key: get("AWS_SECRET_ACCESS_KEY"),
            profile: get("AWS_PROFILE"),
            credentials_file,
            default_region,
            dry_run: flag("DRY_RUN"),
            skip_aliases,
            additional_locations,
        })
    }

    pub fn with_s3_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.s3_hostname = hostname.into();
        self
    }

    pub fn with_skip_alias(mut self, alias: impl Into<String>) -> Self {
        self.skip_aliases.insert(alias.into());
        self
    }
}

/// Split a comma-or-whitespace separated list.
fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_vars(&HashMap::new()).unwrap();
        assert_eq!(settings.tf_cmd, "terraform");
        assert_eq!(settings.endpoint.base_url(), "http://localhost:4566");
        assert_eq!(settings.s3_hostname, DEFAULT_S3_HOSTNAME);
        assert_eq!(settings.default_region, "us-east-1");
        assert!(!settings.customize_access_key);
        assert!(!settings.dry_run);
        assert!(settings.credentials_file.is_none());
    }

    #[test]
    fn test_bool_like_values() {
        for value in ["1", "true", "TRUE", "yes", "on", " y "] {
            assert!(is_truthy(value), "{value} should be true");
        }
        for value in ["0", "false", "no", "", "enabled"] {
            assert!(!is_truthy(value), "{value} should be false");
        }
    }

    #[test]
    fn test_skip_aliases_comma_or_space() {
        let settings =
            Settings::from_vars(&vars(&[("SKIP_ALIASES", "east, west  north,,")])).unwrap();
        let aliases: Vec<_> = settings.skip_aliases.iter().cloned().collect();
        assert_eq!(aliases, vec!["east", "north", "west"]);
    }

    #[test]
    fn test_endpoint_url_overrides_host_and_port() {
        let settings = Settings::from_vars(&vars(&[
            ("AWS_ENDPOINT_URL", "https://emulator.internal:4567/"),
            ("LOCALSTACK_HOSTNAME", "ignored"),
        ]))
        .unwrap();
        assert_eq!(settings.endpoint.protocol, "https");
        assert_eq!(settings.endpoint.hostname, "emulator.internal");
        assert_eq!(settings.endpoint.port, Some(4567));
    }

    #[test]
    fn test_invalid_edge_port_is_rejected() {
        let err = Settings::from_vars(&vars(&[("EDGE_PORT", "not-a-port")])).unwrap_err();
        assert!(matches!(err, CoreError::Settings(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_credentials_file_defaults_to_home() {
        let settings = Settings::from_vars(&vars(&[("HOME", "/home/dev")])).unwrap();
        assert_eq!(
            settings.credentials_file,
            Some(PathBuf::from("/home/dev/.aws/credentials"))
        );

        let settings = Settings::from_vars(&vars(&[
            ("HOME", "/home/dev"),
            ("AWS_SHARED_CREDENTIALS_FILE", "/tmp/creds"),
        ]))
        .unwrap();
        assert_eq!(settings.credentials_file, Some(PathBuf::from("/tmp/creds")));
    }

    #[test]
    fn test_region_fallback_order() {
        let settings = Settings::from_vars(&vars(&[
            ("AWS_REGION", "eu-central-1"),
            ("AWS_DEFAULT_REGION", "eu-west-1"),
        ]))
        .unwrap();
        assert_eq!(settings.default_region, "eu-west-1");
    }
}
