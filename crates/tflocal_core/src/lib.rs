//! # tflocal_core
//!
//! Override synthesis for running Terraform against a local AWS emulator.
//!
//! The crate reads a module's configuration, works out which endpoint
//! schema the installed Terraform expects, and produces an override file
//! that points every AWS provider, the S3 backend and S3 remote-state data
//! sources at the emulator.
//!
//! ## Features
//!
//! - Structural reader for the Terraform configuration language
//! - Provider, backend and remote-state discovery per module directory
//! - Service endpoint catalog with legacy and current backend schemas
//! - Credential precedence resolution, including shared profiles
//! - Deterministic override rendering
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use tflocal_core::{
//!     ConfigScanner, CredentialResolver, OverrideSynthesizer, Settings, ToolVersion,
//! };
//!
//! let settings = Settings::from_env().unwrap();
//! let version = ToolVersion::parse("Terraform v1.6.2").unwrap();
//! let scan = ConfigScanner::scan(Path::new(".")).unwrap();
//!
//! let credentials = CredentialResolver::new(&settings);
//! let document = OverrideSynthesizer::new(&settings, &version, &credentials).synthesize(&scan);
//! document.write_to(Path::new(".")).unwrap();
//! ```

pub mod catalog;
pub mod credentials;
pub mod error;
pub mod scanner;
pub mod settings;
pub mod syntax;
pub mod synth;
pub mod version;

pub use catalog::{
    endpoints_for, provider_endpoints, EndpointMap, HostConfig, ServiceEndpointEntry, SERVICES,
};
pub use credentials::{CredentialDecision, CredentialResolver, CredentialSource, SharedCredentials};
pub use error::{CoreError, CoreResult};
pub use scanner::{
    BackendBlockRef, ConfigScanner, ProviderBlockRef, RemoteStateRef, ScanResult,
    OVERRIDE_FILE_NAME,
};
pub use settings::{EmulatorEndpoint, Settings};
pub use synth::{
    BackendOverride, OverrideDocument, OverrideSynthesizer, ProviderOverride, RemoteStateOverride,
    SettingValue,
};
pub use version::{EndpointSchema, ToolVersion};
