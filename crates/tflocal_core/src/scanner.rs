//! Discovery of provider, backend and remote-state blocks in a module.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{CoreError, CoreResult};
use crate::syntax::{self, Block, Body, Expr};

/// Name of the generated file. Terraform merges any `*_override.tf` file
/// over the rest of the module.
pub const OVERRIDE_FILE_NAME: &str = "localstack_providers_override.tf";

/// Provider type whose blocks are redirected.
pub const AWS_PROVIDER: &str = "aws";

/// Backend type whose block is redirected.
pub const S3_BACKEND: &str = "s3";

/// A declared (or implicit) `provider "aws"` configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderBlockRef {
    pub alias: Option<String>,
    pub existing_keys: BTreeMap<String, Expr>,
    /// File that declared it; `None` for the implicit default provider.
    pub source: Option<PathBuf>,
}

impl ProviderBlockRef {
    /// The unaliased provider Terraform configures even when undeclared.
    pub fn implicit() -> Self {
        Self {
            alias: None,
            existing_keys: BTreeMap::new(),
            source: None,
        }
    }

    pub fn display_name(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{AWS_PROVIDER}.{alias}"),
            None => AWS_PROVIDER.to_string(),
        }
    }
}

/// The module's `terraform { backend "<type>" { ... } }` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendBlockRef {
    pub backend_type: String,
    pub existing_keys: BTreeMap<String, Expr>,
    /// Names of nested blocks, which cannot be carried into an override.
    pub nested_blocks: Vec<String>,
    pub source: PathBuf,
}

/// A `data "terraform_remote_state"` block.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteStateRef {
    pub name: String,
    pub backend: String,
    /// The `config` attribute, verbatim.
    pub config: Option<Expr>,
    /// The `workspace` attribute, verbatim and unevaluated.
    pub workspace: Option<Expr>,
    pub source: PathBuf,
}

/// Everything the synthesizer needs from one module directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanResult {
    pub providers: Vec<ProviderBlockRef>,
    pub backend: Option<BackendBlockRef>,
    pub remote_states: Vec<RemoteStateRef>,
    pub files: Vec<PathBuf>,
}

impl ScanResult {
    pub fn provider(&self, alias: Option<&str>) -> Option<&ProviderBlockRef> {
        self.providers.iter().find(|p| p.alias.as_deref() == alias)
    }
}

/// Scanner for the `.tf` files of a single module directory.
pub struct ConfigScanner;

impl ConfigScanner {
    /// Configuration files in `dir`, regular files first, then Terraform
    /// override files, each group sorted by name. The generated override
    /// file is never included.
    pub fn config_files(dir: &Path) -> CoreResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| CoreError::ConfigParse {
                path: e.path().unwrap_or(dir).to_path_buf(),
                line: 0,
                message: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            if path.extension().is_some_and(|ext| ext == "tf")
                && path.file_name().is_some_and(|name| name != OVERRIDE_FILE_NAME)
            {
                files.push(path);
            }
        }

        files.sort_by_key(|path| (is_override_file(path), path.file_name().map(|n| n.to_owned())));
        Ok(files)
    }

    /// Scan every configuration file in `dir`. Any file that fails to parse
    /// aborts the whole scan.
    pub fn scan(dir: &Path) -> CoreResult<ScanResult> {
        if !dir.is_dir() {
            return Err(CoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("module directory {} does not exist", dir.display()),
            )));
        }

        let mut result = ScanResult::default();
        for path in Self::config_files(dir)? {
            debug!("Scanning {:?}", path);
            let content = fs::read_to_string(&path).map_err(|e| CoreError::ConfigParse {
                path: path.clone(),
                line: 0,
                message: e.to_string(),
            })?;
            let body = syntax::parse(&path, &content)?;
            Self::collect(&mut result, &path, &body)?;
            result.files.push(path);
        }
        Self::finish(&mut result);

        info!(
            "Scanned {} file(s) in {:?}: {} provider(s), backend {:?}, {} remote state(s)",
            result.files.len(),
            dir,
            result.providers.len(),
            result.backend.as_ref().map(|b| b.backend_type.as_str()),
            result.remote_states.len()
        );
        Ok(result)
    }

    /// Scan a single file's contents, as if it were the whole module.
    pub fn scan_source(path: impl AsRef<Path>, source: &str) -> CoreResult<ScanResult> {
        let path = path.as_ref();
        let body = syntax::parse(path, source)?;
        let mut result = ScanResult::default();
        Self::collect(&mut result, path, &body)?;
        result.files.push(path.to_path_buf());
        Self::finish(&mut result);
        Ok(result)
    }

    /// Add the implicit provider and drop remote states that, after all
    /// override files, do not read from S3.
    fn finish(result: &mut ScanResult) {
        if result.provider(None).is_none() {
            result.providers.insert(0, ProviderBlockRef::implicit());
        }
        result.remote_states.retain(|state| {
            let redirected = state.backend == S3_BACKEND;
            if !redirected {
                debug!(
                    "Leaving remote state {} with backend {:?} untouched",
                    state.name, state.backend
                );
            }
            redirected
        });
    }

    fn collect(result: &mut ScanResult, path: &Path, body: &Body) -> CoreResult<()> {
        let overriding = is_override_file(path);

        for block in body.blocks() {
            match (block.kind.as_str(), block.label(0)) {
                ("provider", Some(AWS_PROVIDER)) => {
                    Self::collect_provider(result, path, block, overriding)
                }
                ("terraform", _) => {
                    for backend in block.body.blocks_of("backend") {
                        Self::collect_backend(result, path, backend, overriding)?;
                    }
                }
                ("data", Some("terraform_remote_state")) => {
                    Self::collect_remote_state(result, path, block, overriding)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn collect_provider(result: &mut ScanResult, path: &Path, block: &Block, overriding: bool) {
        let alias = block.body.get_str("alias").map(str::to_string);
        let keys = attribute_map(&block.body);

        if let Some(existing) = result
            .providers
            .iter_mut()
            .find(|p| p.alias == alias)
        {
            if !overriding {
                warn!(
                    "Duplicate provider configuration {} in {:?}; merging",
                    existing.display_name(),
                    path
                );
            }
            existing.existing_keys.extend(keys);
            return;
        }

        let provider = ProviderBlockRef {
            alias,
            existing_keys: keys,
            source: Some(path.to_path_buf()),
        };
        debug!("Found provider {}", provider.display_name());
        result.providers.push(provider);
    }

    fn collect_backend(
        result: &mut ScanResult,
        path: &Path,
        block: &Block,
        overriding: bool,
    ) -> CoreResult<()> {
        let backend_type = block
            .label(0)
            .ok_or_else(|| CoreError::parse(path, block.line, "backend block without a type"))?
            .to_string();
        let keys = attribute_map(&block.body);
        let nested_blocks = block.body.blocks().map(|b| b.kind.clone()).collect();

        match result.backend.as_mut() {
            Some(existing) if overriding && existing.backend_type == backend_type => {
                existing.existing_keys.extend(keys);
            }
            Some(_) if overriding => {
                result.backend = Some(BackendBlockRef {
                    backend_type,
                    existing_keys: keys,
                    nested_blocks,
                    source: path.to_path_buf(),
                });
            }
            Some(existing) => {
                return Err(CoreError::parse(
                    path,
                    block.line,
                    format!(
                        "duplicate backend configuration, already declared in {}",
                        existing.source.display()
                    ),
                ));
            }
            None => {
                debug!("Found {} backend in {:?}", backend_type, path);
                result.backend = Some(BackendBlockRef {
                    backend_type,
                    existing_keys: keys,
                    nested_blocks,
                    source: path.to_path_buf(),
                });
            }
        }
        Ok(())
    }

    /// Remote-state blocks are keyed by name. A block in an override file
    /// replaces the attributes it sets and keeps the others.
    fn collect_remote_state(
        result: &mut ScanResult,
        path: &Path,
        block: &Block,
        overriding: bool,
    ) -> CoreResult<()> {
        let Some(name) = block.label(1) else {
            return Ok(());
        };
        let backend = block.body.get_str("backend").map(str::to_string);
        let config = block.body.attribute("config").map(|a| a.expr.clone());
        let workspace = block.body.attribute("workspace").map(|a| a.expr.clone());

        match result.remote_states.iter_mut().find(|s| s.name == name) {
            Some(existing) if overriding => {
                debug!("Merging remote state {} from {:?}", name, path);
                if let Some(backend) = backend {
                    existing.backend = backend;
                }
                if config.is_some() {
                    existing.config = config;
                }
                if workspace.is_some() {
                    existing.workspace = workspace;
                }
            }
            Some(existing) => {
                return Err(CoreError::parse(
                    path,
                    block.line,
                    format!(
                        "duplicate remote state {:?}, already declared in {}",
                        name,
                        existing.source.display()
                    ),
                ));
            }
            None => {
                result.remote_states.push(RemoteStateRef {
                    name: name.to_string(),
                    backend: backend.unwrap_or_default(),
                    config,
                    workspace,
                    source: path.to_path_buf(),
                });
            }
        }
        Ok(())
    }
}

/// Terraform treats `override.tf` and `*_override.tf` as override files.
pub fn is_override_file(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem == "override" || stem.ends_with("_override"))
}

fn attribute_map(body: &Body) -> BTreeMap<String, Expr> {
    body.attributes()
        .map(|attr| (attr.key.clone(), attr.expr.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_default_provider() {
        let scan = ConfigScanner::scan_source(
            "main.tf",
            r#"resource "aws_s3_bucket" "b" { bucket = "x" }"#,
        )
        .unwrap();
        assert_eq!(scan.providers, vec![ProviderBlockRef::implicit()]);
        assert!(scan.backend.is_none());
    }

    #[test]
    fn test_aliases_are_discovered_in_order() {
        let scan = ConfigScanner::scan_source(
            "main.tf",
            r#"
provider "aws" {
  alias  = "us_east_2"
  region = "us-east-2"
}
provider "aws" {
  region = "eu-west-1"
}
provider "google" {
  project = "p"
}
"#,
        )
        .unwrap();
        let names: Vec<_> = scan.providers.iter().map(|p| p.display_name()).collect();
        assert_eq!(names, vec!["aws.us_east_2", "aws"]);
        assert_eq!(
            scan.provider(None).unwrap().existing_keys["region"].source,
            r#""eu-west-1""#
        );
    }

    #[test]
    fn test_backend_and_remote_state() {
        let scan = ConfigScanner::scan_source(
            "main.tf",
            r#"
terraform {
  backend "s3" {
    bucket = "state"
    key    = "terraform.tfstate"
  }
}
data "terraform_remote_state" "net" {
  backend   = "s3"
  workspace = terraform.workspace
  config = {
    bucket = "state"
  }
}
data "terraform_remote_state" "local" {
  backend = "local"
}
"#,
        )
        .unwrap();
        let backend = scan.backend.unwrap();
        assert_eq!(backend.backend_type, "s3");
        assert_eq!(backend.existing_keys["bucket"].as_str(), Some("state"));
        assert_eq!(scan.remote_states.len(), 1);
        assert_eq!(scan.remote_states[0].name, "net");
        assert_eq!(
            scan.remote_states[0].workspace.as_ref().unwrap().source,
            "terraform.workspace"
        );
    }

    #[test]
    fn test_remote_state_override_merges_by_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("main.tf"),
            r#"
data "terraform_remote_state" "net" {
  backend = "s3"
  config = {
    bucket = "state"
    key    = "net.tfstate"
  }
}
data "terraform_remote_state" "dns" {
  backend = "local"
}
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("ws_override.tf"),
            r#"
data "terraform_remote_state" "net" {
  workspace = "staging"
}
data "terraform_remote_state" "dns" {
  backend = "s3"
  config  = { bucket = "dns" }
}
"#,
        )
        .unwrap();

        let scan = ConfigScanner::scan(dir.path()).unwrap();
        let names: Vec<_> = scan.remote_states.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["net", "dns"]);

        let net = &scan.remote_states[0];
        let config = net.config.as_ref().unwrap().as_object().unwrap();
        let keys: Vec<_> = config.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["bucket", "key"]);
        assert_eq!(net.workspace.as_ref().unwrap().as_str(), Some("staging"));
        assert_eq!(net.source, dir.path().join("main.tf"));
    }

    #[test]
    fn test_duplicate_remote_state_is_a_parse_error() {
        let source = r#"
data "terraform_remote_state" "net" {
  backend = "s3"
}
data "terraform_remote_state" "net" {
  backend = "s3"
}
"#;
        let err = ConfigScanner::scan_source("main.tf", source).unwrap_err();
        assert!(matches!(err, CoreError::ConfigParse { line: 5, .. }), "{err}");
    }

    #[test]
    fn test_unreadable_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");

        let err = ConfigScanner::config_files(&missing).unwrap_err();
        match err {
            CoreError::ConfigParse { path, .. } => assert_eq!(path, missing),
            other => panic!("expected a parse error, got {other}"),
        }
    }

    #[test]
    fn test_override_file_detection() {
        assert!(is_override_file(Path::new("override.tf")));
        assert!(is_override_file(Path::new("backend_override.tf")));
        assert!(is_override_file(Path::new(OVERRIDE_FILE_NAME)));
        assert!(!is_override_file(Path::new("main.tf")));
        assert!(!is_override_file(Path::new("overrides.tf")));
    }
}
