//! Access-key selection for generated provider and backend blocks.
//!
//! The emulator never validates credentials. The access key only matters
//! because the emulator scopes resources to an account derived from it.
//! `CUSTOMIZE_ACCESS_KEY` decides whether `AWS_ACCESS_KEY_ID` is honoured;
//! profiles from the shared credentials file are always consulted.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::settings::Settings;
use crate::syntax::Expr;

/// Dummy credentials accepted by the emulator.
pub const PLACEHOLDER_ACCESS_KEY: &str = "test";
pub const PLACEHOLDER_SECRET_KEY: &str = "test";

pub const DEFAULT_PROFILE: &str = "default";

/// Where a credential decision came from, highest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    ExplicitProvider,
    EnvVar,
    ProfileFile,
    DefaultProfile,
    Unset,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CredentialSource::ExplicitProvider => "explicit provider keys",
            CredentialSource::EnvVar => "environment",
            CredentialSource::ProfileFile => "named profile",
            CredentialSource::DefaultProfile => "default profile",
            CredentialSource::Unset => "placeholder",
        };
        f.write_str(name)
    }
}

/// The key pair chosen for one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDecision {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub source: CredentialSource,
}

impl CredentialDecision {
    pub fn unset() -> Self {
        Self {
            access_key: None,
            secret_key: None,
            source: CredentialSource::Unset,
        }
    }

    /// Access key to inject, falling back to the placeholder.
    pub fn access_key_or_placeholder(&self) -> &str {
        self.access_key.as_deref().unwrap_or(PLACEHOLDER_ACCESS_KEY)
    }

    /// Secret key to inject, falling back to the placeholder.
    pub fn secret_key_or_placeholder(&self) -> &str {
        self.secret_key.as_deref().unwrap_or(PLACEHOLDER_SECRET_KEY)
    }
}

/// Profiles read from an AWS shared credentials file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedCredentials {
    profiles: HashMap<String, HashMap<String, String>>,
}

impl SharedCredentials {
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| CoreError::CredentialFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self::parse(&content))
    }

    /// Parse INI-style `[profile]` sections of `key = value` lines.
    pub fn parse(content: &str) -> Self {
        let mut profiles: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current: Option<String> = None;

        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = section.trim();
                let name = name.strip_prefix("profile ").unwrap_or(name).trim().to_string();
                profiles.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }
            if let (Some(profile), Some((key, value))) = (&current, line.split_once('=')) {
                profiles
                    .entry(profile.clone())
                    .or_default()
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Self { profiles }
    }

    /// A profile's key pair, if it declares an access key.
    pub fn keys(&self, profile: &str) -> Option<(String, Option<String>)> {
        let section = self.profiles.get(profile)?;
        let access_key = section.get("aws_access_key_id")?.clone();
        let secret_key = section.get("aws_secret_access_key").cloned();
        Some((access_key, secret_key))
    }
}

/// Applies the credential precedence chain.
pub struct CredentialResolver {
    customize_access_key: bool,
    env_access_key: Option<String>,
    env_secret_key: Option<String>,
    profile: Option<String>,
    credentials_file: Option<PathBuf>,
    shared: SharedCredentials,
}

impl CredentialResolver {
    /// Build a resolver, reading the shared credentials file once.
    /// An unreadable file only disables the profile steps.
    pub fn new(settings: &Settings) -> Self {
        let shared = match &settings.credentials_file {
            Some(path) => match SharedCredentials::load(path) {
                Ok(shared) => shared,
                Err(e) => {
                    debug!("Ignoring credentials file: {}", e);
                    SharedCredentials::default()
                }
            },
            None => SharedCredentials::default(),
        };
        Self::with_shared_credentials(settings, shared)
    }

    pub fn with_shared_credentials(settings: &Settings, shared: SharedCredentials) -> Self {
        Self {
            customize_access_key: settings.customize_access_key,
            env_access_key: settings.access_key_id.clone(),
            env_secret_key: settings.secret_access_key.clone(),
            profile: settings.profile.clone(),
            credentials_file: settings.credentials_file.clone(),
            shared,
        }
    }

    /// Decide the key pair for a block whose attributes are `explicit`.
    pub fn resolve(&self, explicit: &BTreeMap<String, Expr>) -> CredentialDecision {
        if let Some(access_key) = explicit.get("access_key") {
            return CredentialDecision {
                access_key: Some(expr_text(access_key)),
                secret_key: explicit.get("secret_key").map(expr_text),
                source: CredentialSource::ExplicitProvider,
            };
        }

        let env_access_key = self
            .env_access_key
            .as_ref()
            .filter(|_| self.customize_access_key);
        if let Some(access_key) = env_access_key {
            return CredentialDecision {
                access_key: Some(access_key.clone()),
                secret_key: self.env_secret_key.clone(),
                source: CredentialSource::EnvVar,
            };
        }

        if let Some(profile) = &self.profile {
            return match self.shared.keys(profile) {
                Some((access_key, secret_key)) => CredentialDecision {
                    access_key: Some(access_key),
                    secret_key,
                    source: CredentialSource::ProfileFile,
                },
                None => {
                    let err = CoreError::CredentialFile {
                        path: self.credentials_file.clone().unwrap_or_default(),
                        message: format!("profile {profile:?} not found"),
                    };
                    warn!("{}; using placeholder credentials", err);
                    CredentialDecision::unset()
                }
            };
        }

        match self.shared.keys(DEFAULT_PROFILE) {
            Some((access_key, secret_key)) => CredentialDecision {
                access_key: Some(access_key),
                secret_key,
                source: CredentialSource::DefaultProfile,
            },
            None => CredentialDecision::unset(),
        }
    }
}

fn expr_text(expr: &Expr) -> String {
    expr.as_str()
        .map(str::to_string)
        .unwrap_or_else(|| expr.source.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREDENTIALS: &str = r#"
    [default]
    aws_access_key_id = 000000000001
    aws_secret_access_key = default-secret

    [team]
    aws_access_key_id = 000000000002
    region = eu-west-1

    [profile nokey]
    region = eu-west-1
    "#;

    fn resolver(settings: Settings) -> CredentialResolver {
        CredentialResolver::with_shared_credentials(
            &settings,
            SharedCredentials::parse(CREDENTIALS),
        )
    }

    fn explicit(keys: &[(&str, &str)]) -> BTreeMap<String, Expr> {
        keys.iter()
            .map(|(k, v)| (k.to_string(), Expr::from_source(*v)))
            .collect()
    }

    #[test]
    fn test_parse_shared_credentials() {
        let shared = SharedCredentials::parse(CREDENTIALS);
        assert_eq!(
            shared.keys("default"),
            Some(("000000000001".to_string(), Some("default-secret".to_string())))
        );
        assert_eq!(shared.keys("team"), Some(("000000000002".to_string(), None)));
        assert_eq!(shared.keys("nokey"), None);
        assert_eq!(shared.keys("missing"), None);
    }

    /// Exhaustive check of every combination of available sources.
    #[test]
    fn test_precedence_matrix() {
        for explicit_key in [false, true] {
            for flag in [false, true] {
                for env in [false, true] {
                    for profile in [None, Some("team"), Some("missing")] {
                        for default in [false, true] {
                            let settings = Settings {
                                customize_access_key: flag,
                                access_key_id: env.then(|| "111111111111".to_string()),
                                profile: profile.map(str::to_string),
                                ..Settings::default()
                            };
                            let content = if default {
                                CREDENTIALS.to_string()
                            } else {
                                CREDENTIALS.replace("[default]", "[other]")
                            };
                            let resolver = CredentialResolver::with_shared_credentials(
                                &settings,
                                SharedCredentials::parse(&content),
                            );
                            let keys = if explicit_key {
                                explicit(&[("access_key", "\"222222222222\"")])
                            } else {
                                BTreeMap::new()
                            };

                            let expected = if explicit_key {
                                CredentialSource::ExplicitProvider
                            } else if flag && env {
                                CredentialSource::EnvVar
                            } else if profile == Some("team") {
                                CredentialSource::ProfileFile
                            } else if profile.is_some() {
                                CredentialSource::Unset
                            } else if default {
                                CredentialSource::DefaultProfile
                            } else {
                                CredentialSource::Unset
                            };

                            let decision = resolver.resolve(&keys);
                            assert_eq!(
                                decision.source, expected,
                                "explicit={explicit_key} flag={flag} env={env} \
                                 profile={profile:?} default={default}"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_flag_is_a_hard_gate_for_env_var() {
        let settings = Settings {
            access_key_id: Some("123456789012".to_string()),
            ..Settings::default()
        };
        let decision = CredentialResolver::with_shared_credentials(
            &settings,
            SharedCredentials::default(),
        )
        .resolve(&BTreeMap::new());
        assert_eq!(decision.source, CredentialSource::Unset);
        assert_eq!(decision.access_key_or_placeholder(), PLACEHOLDER_ACCESS_KEY);
    }

    #[test]
    fn test_profiles_apply_without_flag() {
        let named = resolver(Settings {
            access_key_id: Some("123456789012".to_string()),
            profile: Some("team".to_string()),
            ..Settings::default()
        })
        .resolve(&BTreeMap::new());
        assert_eq!(named.source, CredentialSource::ProfileFile);
        assert_eq!(named.access_key.as_deref(), Some("000000000002"));

        let default = resolver(Settings::default()).resolve(&BTreeMap::new());
        assert_eq!(default.source, CredentialSource::DefaultProfile);
        assert_eq!(default.access_key.as_deref(), Some("000000000001"));
    }

    #[test]
    fn test_env_var_with_flag() {
        let decision = resolver(Settings {
            customize_access_key: true,
            access_key_id: Some("123456789012".to_string()),
            ..Settings::default()
        })
        .resolve(&BTreeMap::new());
        assert_eq!(decision.source, CredentialSource::EnvVar);
        assert_eq!(decision.access_key.as_deref(), Some("123456789012"));
        assert_eq!(decision.secret_key_or_placeholder(), PLACEHOLDER_SECRET_KEY);
    }

    #[test]
    fn test_named_profile_values() {
        let decision = resolver(Settings {
            customize_access_key: true,
            profile: Some("team".to_string()),
            ..Settings::default()
        })
        .resolve(&BTreeMap::new());
        assert_eq!(decision.source, CredentialSource::ProfileFile);
        assert_eq!(decision.access_key.as_deref(), Some("000000000002"));
    }

    #[test]
    fn test_explicit_keys_keep_user_values() {
        let decision = resolver(Settings {
            customize_access_key: true,
            access_key_id: Some("123456789012".to_string()),
            ..Settings::default()
        })
        .resolve(&explicit(&[
            ("access_key", "var.access_key"),
            ("secret_key", "\"s3cr3t\""),
        ]));
        assert_eq!(decision.source, CredentialSource::ExplicitProvider);
        assert_eq!(decision.access_key.as_deref(), Some("var.access_key"));
        assert_eq!(decision.secret_key.as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn test_missing_credentials_file_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            customize_access_key: true,
            credentials_file: Some(dir.path().join("does-not-exist")),
            ..Settings::default()
        };
        let decision = CredentialResolver::new(&settings).resolve(&BTreeMap::new());
        assert_eq!(decision.source, CredentialSource::Unset);
    }

    #[test]
    fn test_credentials_file_loaded_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");
        fs::write(&path, CREDENTIALS).unwrap();
        let settings = Settings {
            credentials_file: Some(path),
            ..Settings::default()
        };
        let decision = CredentialResolver::new(&settings).resolve(&BTreeMap::new());
        assert_eq!(decision.source, CredentialSource::DefaultProfile);
        assert_eq!(decision.secret_key.as_deref(), Some("default-secret"));
    }
}
