//! Terraform version detection and endpoint schema classification.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// First Terraform release that only accepts the consolidated `endpoints`
/// map in the S3 backend.
pub const CURRENT_SCHEMA_THRESHOLD: Version = Version::new(1, 6, 0);

/// AWS provider release that renamed `s3_force_path_style`.
pub const PROVIDER_USE_PATH_STYLE_THRESHOLD: Version = Version::new(5, 0, 0);

/// Shape used to declare per-service endpoints in backend-style blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointSchema {
    /// Flat top-level keys (`endpoint`, `iam_endpoint`, ...).
    Legacy,
    /// A single nested `endpoints = { ... }` map.
    Current,
}

impl EndpointSchema {
    pub fn for_version(version: &Version) -> Self {
        if version < &CURRENT_SCHEMA_THRESHOLD {
            EndpointSchema::Legacy
        } else {
            EndpointSchema::Current
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointSchema::Legacy => "legacy",
            EndpointSchema::Current => "current",
        }
    }
}

impl fmt::Display for EndpointSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Versions reported by the wrapped tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolVersion {
    pub terraform: Version,
    /// Selected `hashicorp/aws` provider, known only after `init`.
    pub aws_provider: Option<Version>,
}

#[derive(Deserialize)]
struct VersionReport {
    terraform_version: String,
    #[serde(default)]
    provider_selections: std::collections::HashMap<String, String>,
}

impl ToolVersion {
    /// Parse the output of `terraform version -json`, falling back to the
    /// plain-text banner printed by older releases.
    pub fn parse(output: &str) -> CoreResult<Self> {
        let trimmed = output.trim_start();
        if trimmed.starts_with('{') {
            Self::from_json(trimmed)
        } else {
            Self::from_text(trimmed)
        }
    }

    pub fn from_json(output: &str) -> CoreResult<Self> {
        let report: VersionReport = serde_json::from_str(output)
            .map_err(|e| CoreError::VersionProbe(format!("malformed version report: {e}")))?;
        let terraform = parse_version(&report.terraform_version)?;
        let aws_provider = report
            .provider_selections
            .iter()
            .find(|(source, _)| source.ends_with("hashicorp/aws"))
            .and_then(|(_, v)| parse_version(v).ok());

        debug!(%terraform, ?aws_provider, "Parsed JSON version report");
        Ok(Self {
            terraform,
            aws_provider,
        })
    }

    pub fn from_text(output: &str) -> CoreResult<Self> {
        let first_line = output.lines().next().unwrap_or_default();
        let token = version_token()
            .captures(first_line)
            .and_then(|caps| caps.get(1))
            .ok_or_else(|| CoreError::VersionProbe(format!("unrecognized output {first_line:?}")))?;
        let terraform = parse_version(token.as_str())?;

        let aws_provider = output
            .lines()
            .filter(|line| line.contains("hashicorp/aws"))
            .find_map(|line| version_token().captures(line))
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_version(m.as_str()).ok());

        Ok(Self {
            terraform,
            aws_provider,
        })
    }

    pub fn schema(&self) -> EndpointSchema {
        EndpointSchema::for_version(&self.terraform)
    }

    /// Name of the provider's path-style flag for the selected AWS provider.
    pub fn provider_path_style_key(&self) -> &'static str {
        match &self.aws_provider {
            Some(v) if v < &PROVIDER_USE_PATH_STYLE_THRESHOLD => "s3_force_path_style",
            _ => "s3_use_path_style",
        }
    }
}

fn version_token() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\bv(\d+\.\d+(?:\.\d+)?(?:-[0-9A-Za-z.-]+)?)").expect("static version pattern")
    })
}

/// Parse a version string, padding a missing patch component.
///
/// Pre-release suffixes keep semver precedence, so `1.6.0-beta1` sorts
/// below `1.6.0`.
pub fn parse_version(raw: &str) -> CoreResult<Version> {
    let raw = raw.trim().trim_start_matches('v');
    let (core, pre) = match raw.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (raw, None),
    };
    let padded = match core.split('.').count() {
        2 => format!("{core}.0"),
        _ => core.to_string(),
    };
    let candidate = match pre {
        Some(pre) => format!("{padded}-{pre}"),
        None => padded,
    };
    Version::parse(&candidate)
        .map_err(|e| CoreError::VersionProbe(format!("invalid version {raw:?}: {e}")))
}
