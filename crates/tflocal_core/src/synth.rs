//! Override document synthesis.
//!
//! Turns a [`ScanResult`] into the blocks of the generated override file.
//! Terraform merges override files attribute-by-attribute for provider and
//! data blocks, but replaces a backend block wholesale, so the backend
//! override carries the user's own settings forward.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::catalog::{self, EndpointMap, HostConfig};
use crate::credentials::CredentialResolver;
use crate::error::{CoreError, CoreResult};
use crate::scanner::{
    BackendBlockRef, ProviderBlockRef, RemoteStateRef, ScanResult, OVERRIDE_FILE_NAME, S3_BACKEND,
};
use crate::settings::Settings;
use crate::syntax::Expr;
use crate::version::{EndpointSchema, ToolVersion};

/// State bucket used when the backend block does not name one.
pub const DEFAULT_STATE_BUCKET: &str = "tf-test-state";
/// State key used when the backend block does not name one.
pub const DEFAULT_STATE_KEY: &str = "terraform.tfstate";

/// Keys that turn off calls the emulator cannot answer like AWS does.
/// Always written by the synthesizer, whatever the user declared.
pub const PROVIDER_SKIP_KEYS: &[&str] = &[
    "skip_credentials_validation",
    "skip_metadata_api_check",
    "skip_requesting_account_id",
];

const BACKEND_SKIP_KEYS: &[&str] = &[
    "skip_credentials_validation",
    "skip_metadata_api_check",
    "skip_region_validation",
];

/// Only understood by the S3 backend from Terraform 1.6 on.
const CURRENT_BACKEND_SKIP_KEYS: &[&str] = &["skip_requesting_account_id"];

const PATH_STYLE_KEYS: &[&str] = &["use_path_style", "force_path_style"];

const FILE_HEADER: &str =
    "# Generated by tflocal. This file is rewritten on every run; do not edit.\n";

/// A rendered attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    /// HCL source text written as-is.
    Raw(String),
    /// An object constructor of raw values.
    Map(BTreeMap<String, String>),
}

impl SettingValue {
    pub fn string(value: &str) -> Self {
        SettingValue::Raw(quote(value))
    }

    pub fn bool(value: bool) -> Self {
        SettingValue::Raw(value.to_string())
    }

    pub fn as_raw(&self) -> Option<&str> {
        match self {
            SettingValue::Raw(raw) => Some(raw),
            SettingValue::Map(_) => None,
        }
    }
}

/// Override for one `provider "aws"` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOverride {
    pub alias: Option<String>,
    /// Attributes in output order.
    pub attributes: Vec<(String, SettingValue)>,
    pub endpoints: BTreeMap<&'static str, String>,
}

impl ProviderOverride {
    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Replacement for the module's S3 backend block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOverride {
    pub backend_type: String,
    pub attributes: BTreeMap<String, SettingValue>,
}

/// Rewritten `terraform_remote_state` data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStateOverride {
    pub name: String,
    pub config: BTreeMap<String, SettingValue>,
    /// Copied from the user's block without evaluation.
    pub workspace: Option<String>,
}

/// The complete generated file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideDocument {
    pub providers: Vec<ProviderOverride>,
    pub backend: Option<BackendOverride>,
    pub remote_states: Vec<RemoteStateOverride>,
}

impl OverrideDocument {
    /// Render the document as HCL.
    pub fn render(&self) -> String {
        let mut w = HclWriter::default();
        w.out.push_str(FILE_HEADER);

        for provider in &self.providers {
            w.out.push('\n');
            w.open("provider \"aws\"");
            for (key, value) in &provider.attributes {
                w.setting(key, value);
            }
            w.open("endpoints");
            for (service, url) in &provider.endpoints {
                w.attr(service, &quote(url));
            }
            w.close();
            w.close();
        }

        if let Some(backend) = &self.backend {
            w.out.push('\n');
            w.open("terraform");
            w.open(&format!("backend {}", quote(&backend.backend_type)));
            for (key, value) in &backend.attributes {
                w.setting(key, value);
            }
            w.close();
            w.close();
        }

        for remote in &self.remote_states {
            w.out.push('\n');
            w.open(&format!("data \"terraform_remote_state\" {}", quote(&remote.name)));
            w.attr("backend", &quote(S3_BACKEND));
            w.open("config = ");
            for (key, value) in &remote.config {
                w.setting(key, value);
            }
            w.close();
            if let Some(workspace) = &remote.workspace {
                w.attr("workspace", workspace);
            }
            w.close();
        }

        w.out
    }

    /// Write the rendered document into `dir`, replacing any previous file.
    pub fn write_to(&self, dir: &Path) -> CoreResult<PathBuf> {
        let path = dir.join(OVERRIDE_FILE_NAME);
        fs::write(&path, self.render())?;
        info!("Wrote override file {:?}", path);
        Ok(path)
    }
}

/// Builds override documents for one run.
pub struct OverrideSynthesizer<'a> {
    settings: &'a Settings,
    credentials: &'a CredentialResolver,
    hosts: HostConfig,
    schema: EndpointSchema,
    provider_path_style_key: &'static str,
}

impl<'a> OverrideSynthesizer<'a> {
    pub fn new(
        settings: &'a Settings,
        version: &ToolVersion,
        credentials: &'a CredentialResolver,
    ) -> Self {
        Self {
            settings,
            credentials,
            hosts: HostConfig::from(settings),
            schema: version.schema(),
            provider_path_style_key: version.provider_path_style_key(),
        }
    }

    pub fn schema(&self) -> EndpointSchema {
        self.schema
    }

    /// Produce the override document for a scanned module.
    ///
    /// Backend and remote-state blocks that cannot be redirected safely are
    /// skipped with a warning; provider overrides are always produced.
    pub fn synthesize(&self, scan: &ScanResult) -> OverrideDocument {
        let providers = scan
            .providers
            .iter()
            .filter(|provider| match &provider.alias {
                Some(alias) if self.settings.skip_aliases.contains(alias) => {
                    info!("Leaving provider {} untouched", provider.display_name());
                    false
                }
                _ => true,
            })
            .map(|provider| self.provider_override(provider))
            .collect();

        let backend = scan.backend.as_ref().and_then(|backend| {
            match self.backend_override(backend) {
                Ok(backend) => Some(backend),
                Err(e) => {
                    warn!("{}; the backend block is left as declared", e);
                    None
                }
            }
        });

        let remote_states = scan
            .remote_states
            .iter()
            .filter_map(|remote| match self.remote_state_override(remote) {
                Ok(remote) => Some(remote),
                Err(e) => {
                    warn!("{}; remote state {} is left as declared", e, remote.name);
                    None
                }
            })
            .collect();

        OverrideDocument {
            providers,
            backend,
            remote_states,
        }
    }

    pub fn provider_override(&self, provider: &ProviderBlockRef) -> ProviderOverride {
        let existing = &provider.existing_keys;
        let decision = self.credentials.resolve(existing);
        debug!(
            "Provider {} uses {} credentials",
            provider.display_name(),
            decision.source
        );

        let mut attributes = Vec::new();
        if let Some(alias) = &provider.alias {
            attributes.push(("alias".to_string(), SettingValue::string(alias)));
        }
        if !existing.contains_key("access_key") {
            attributes.push((
                "access_key".to_string(),
                SettingValue::string(decision.access_key_or_placeholder()),
            ));
        }
        if !existing.contains_key("secret_key") {
            attributes.push((
                "secret_key".to_string(),
                SettingValue::string(decision.secret_key_or_placeholder()),
            ));
        }
        let region = match existing.get("region") {
            Some(expr) => SettingValue::Raw(expr.source.clone()),
            None => SettingValue::string(&self.settings.default_region),
        };
        attributes.push(("region".to_string(), region));
        for key in PROVIDER_SKIP_KEYS {
            attributes.push((key.to_string(), SettingValue::bool(true)));
        }
        attributes.push((
            self.provider_path_style_key.to_string(),
            SettingValue::bool(self.hosts.use_s3_path_style()),
        ));

        ProviderOverride {
            alias: provider.alias.clone(),
            attributes,
            endpoints: catalog::provider_endpoints(&self.hosts),
        }
    }

    pub fn backend_override(&self, backend: &BackendBlockRef) -> CoreResult<BackendOverride> {
        if backend.backend_type != S3_BACKEND {
            return Err(CoreError::Synthesis(format!(
                "backend type {:?} is not redirected",
                backend.backend_type
            )));
        }
        if !backend.nested_blocks.is_empty() {
            return Err(CoreError::Synthesis(format!(
                "backend declares nested blocks ({}) that cannot be carried over",
                backend.nested_blocks.join(", ")
            )));
        }

        let attributes = self.state_settings(&backend.existing_keys, true);
        Ok(BackendOverride {
            backend_type: backend.backend_type.clone(),
            attributes,
        })
    }

    pub fn remote_state_override(
        &self,
        remote: &RemoteStateRef,
    ) -> CoreResult<RemoteStateOverride> {
        let existing: BTreeMap<String, Expr> = match &remote.config {
            None => BTreeMap::new(),
            Some(expr) => expr
                .as_object()
                .ok_or_else(|| {
                    CoreError::Synthesis(format!(
                        "config of remote state {} is not an object literal",
                        remote.name
                    ))
                })?
                .iter()
                .cloned()
                .collect(),
        };

        Ok(RemoteStateOverride {
            name: remote.name.clone(),
            config: self.state_settings(&existing, false),
            workspace: remote.workspace.as_ref().map(|expr| expr.source.clone()),
        })
    }

    /// Settings shared by the S3 backend and S3 remote-state configs:
    /// defaults, then the user's keys, then the keys we always control.
    fn state_settings(
        &self,
        existing: &BTreeMap<String, Expr>,
        with_state_defaults: bool,
    ) -> BTreeMap<String, SettingValue> {
        let mut settings = BTreeMap::new();

        if with_state_defaults {
            settings.insert("bucket".to_string(), SettingValue::string(DEFAULT_STATE_BUCKET));
            settings.insert("key".to_string(), SettingValue::string(DEFAULT_STATE_KEY));
        }
        settings.insert(
            "region".to_string(),
            SettingValue::string(&self.settings.default_region),
        );

        let decision = self.credentials.resolve(existing);
        settings.insert(
            "access_key".to_string(),
            SettingValue::string(decision.access_key_or_placeholder()),
        );
        settings.insert(
            "secret_key".to_string(),
            SettingValue::string(decision.secret_key_or_placeholder()),
        );

        if !PATH_STYLE_KEYS.iter().any(|key| existing.contains_key(*key)) {
            let key = match self.schema {
                EndpointSchema::Current => "use_path_style",
                EndpointSchema::Legacy => "force_path_style",
            };
            settings.insert(key.to_string(), SettingValue::bool(self.hosts.use_s3_path_style()));
        }

        for (key, expr) in existing {
            if is_controlled_state_key(key) {
                debug!("Replacing user setting {}", key);
                continue;
            }
            settings.insert(key.clone(), SettingValue::Raw(expr.source.clone()));
        }

        for key in BACKEND_SKIP_KEYS {
            settings.insert(key.to_string(), SettingValue::bool(true));
        }
        match catalog::endpoints_for(self.schema, &self.hosts) {
            EndpointMap::Current(map) => {
                for key in CURRENT_BACKEND_SKIP_KEYS {
                    settings.insert(key.to_string(), SettingValue::bool(true));
                }
                let map = map
                    .into_iter()
                    .map(|(service, url)| (service.to_string(), quote(&url)))
                    .collect();
                settings.insert("endpoints".to_string(), SettingValue::Map(map));
            }
            EndpointMap::Legacy(map) => {
                for (key, url) in map {
                    settings.insert(key.to_string(), SettingValue::string(&url));
                }
            }
        }

        settings
    }
}

/// Keys of a backend-style block that the synthesizer always owns.
pub fn is_controlled_state_key(key: &str) -> bool {
    catalog::backend_endpoint_keys().any(|k| k == key)
        || BACKEND_SKIP_KEYS.contains(&key)
        || CURRENT_BACKEND_SKIP_KEYS.contains(&key)
}

/// Quote a string as an HCL literal.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn render_key(key: &str) -> String {
    let mut chars = key.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        key.to_string()
    } else {
        quote(key)
    }
}

#[derive(Default)]
struct HclWriter {
    out: String,
    depth: usize,
}

impl HclWriter {
    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
    }

    /// Open a block, or an object constructor when `header` ends in `= `.
    fn open(&mut self, header: &str) {
        self.indent();
        self.out.push_str(header);
        if !header.ends_with(' ') {
            self.out.push(' ');
        }
        self.out.push_str("{\n");
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth -= 1;
        self.indent();
        self.out.push_str("}\n");
    }

    fn attr(&mut self, key: &str, raw: &str) {
        self.indent();
        self.out.push_str(&render_key(key));
        self.out.push_str(" = ");
        self.out.push_str(raw);
        self.out.push('\n');
    }

    fn setting(&mut self, key: &str, value: &SettingValue) {
        match value {
            SettingValue::Raw(raw) => self.attr(key, raw),
            SettingValue::Map(map) => {
                self.open(&format!("{} = ", render_key(key)));
                for (k, v) in map {
                    self.attr(k, v);
                }
                self.close();
            }
        }
    }
}
