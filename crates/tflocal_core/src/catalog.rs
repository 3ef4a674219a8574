//! Static table of emulated services and their endpoint URLs.
//!
//! The table is versioned alongside the AWS provider: a service listed here
//! must be a valid key of the provider's `endpoints` block (or of the S3
//! backend's endpoint settings for backend-only rows).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::settings::{EmulatorEndpoint, Settings};
use crate::version::EndpointSchema;

/// Hostname that always forces path-style S3 addressing.
pub const LOOPBACK_HOSTNAME: &str = "localhost";

/// Subdomain prefix required for virtual-hosted S3 addressing.
pub const S3_SUBDOMAIN_PREFIX: &str = "s3.";

/// Services never written to an endpoint map. The emulator answers for them,
/// but declaring them makes the provider fall back to live-account behaviour.
pub const EXCLUDED_SERVICES: &[&str] = &["dynamodbstreams", "meteringmarketplace"];

/// One emulated service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpointEntry {
    /// Key in the consolidated endpoint map.
    pub service_id: &'static str,
    /// Flat top-level key used by the pre-1.6 S3 backend, if one existed.
    pub legacy_key: Option<&'static str>,
    /// Valid inside a provider `endpoints` block.
    pub provider: bool,
    /// Valid inside the S3 backend / remote-state endpoint settings.
    pub backend: bool,
}

impl ServiceEndpointEntry {
    const fn provider(service_id: &'static str) -> Self {
        Self {
            service_id,
            legacy_key: None,
            provider: true,
            backend: false,
        }
    }

    const fn shared(service_id: &'static str, legacy_key: Option<&'static str>) -> Self {
        Self {
            service_id,
            legacy_key,
            provider: true,
            backend: true,
        }
    }

    const fn backend_only(service_id: &'static str) -> Self {
        Self {
            service_id,
            legacy_key: None,
            provider: false,
            backend: true,
        }
    }

    /// Endpoint URL for this service.
    pub fn url(&self, hosts: &HostConfig) -> String {
        if self.service_id == "s3" {
            hosts.s3_url()
        } else {
            hosts.endpoint.base_url()
        }
    }

    pub fn is_excluded(&self) -> bool {
        EXCLUDED_SERVICES.contains(&self.service_id)
    }
}

/// Every known service, sorted by `service_id`.
pub const SERVICES: &[ServiceEndpointEntry] = &[
    ServiceEndpointEntry::provider("accessanalyzer"),
    ServiceEndpointEntry::provider("account"),
    ServiceEndpointEntry::provider("acm"),
    ServiceEndpointEntry::provider("acmpca"),
    ServiceEndpointEntry::provider("amp"),
    ServiceEndpointEntry::provider("amplify"),
    ServiceEndpointEntry::provider("apigateway"),
    ServiceEndpointEntry::provider("apigatewayv2"),
    ServiceEndpointEntry::provider("appautoscaling"),
    ServiceEndpointEntry::provider("appconfig"),
    ServiceEndpointEntry::provider("appflow"),
    ServiceEndpointEntry::provider("appsync"),
    ServiceEndpointEntry::provider("athena"),
    ServiceEndpointEntry::provider("autoscaling"),
    ServiceEndpointEntry::provider("backup"),
    ServiceEndpointEntry::provider("batch"),
    ServiceEndpointEntry::provider("budgets"),
    ServiceEndpointEntry::provider("ce"),
    ServiceEndpointEntry::provider("cloudcontrol"),
    ServiceEndpointEntry::provider("cloudformation"),
    ServiceEndpointEntry::provider("cloudfront"),
    ServiceEndpointEntry::provider("cloudsearch"),
    ServiceEndpointEntry::provider("cloudtrail"),
    ServiceEndpointEntry::provider("cloudwatch"),
    ServiceEndpointEntry::provider("codeartifact"),
    ServiceEndpointEntry::provider("codebuild"),
    ServiceEndpointEntry::provider("codecommit"),
    ServiceEndpointEntry::provider("codedeploy"),
    ServiceEndpointEntry::provider("codepipeline"),
    ServiceEndpointEntry::provider("cognitoidentity"),
    ServiceEndpointEntry::provider("cognitoidp"),
    ServiceEndpointEntry::provider("configservice"),
    ServiceEndpointEntry::provider("dms"),
    ServiceEndpointEntry::provider("docdb"),
    ServiceEndpointEntry::provider("ds"),
    ServiceEndpointEntry::shared("dynamodb", Some("dynamodb_endpoint")),
    ServiceEndpointEntry::provider("dynamodbstreams"),
    ServiceEndpointEntry::provider("ec2"),
    ServiceEndpointEntry::provider("ecr"),
    ServiceEndpointEntry::provider("ecs"),
    ServiceEndpointEntry::provider("efs"),
    ServiceEndpointEntry::provider("eks"),
    ServiceEndpointEntry::provider("elasticache"),
    ServiceEndpointEntry::provider("elasticbeanstalk"),
    ServiceEndpointEntry::provider("elb"),
    ServiceEndpointEntry::provider("elbv2"),
    ServiceEndpointEntry::provider("emr"),
    ServiceEndpointEntry::provider("emrserverless"),
    ServiceEndpointEntry::provider("es"),
    ServiceEndpointEntry::provider("events"),
    ServiceEndpointEntry::provider("firehose"),
    ServiceEndpointEntry::provider("fis"),
    ServiceEndpointEntry::provider("glacier"),
    ServiceEndpointEntry::provider("glue"),
    ServiceEndpointEntry::shared("iam", Some("iam_endpoint")),
    ServiceEndpointEntry::provider("identitystore"),
    ServiceEndpointEntry::provider("iot"),
    ServiceEndpointEntry::provider("kafka"),
    ServiceEndpointEntry::provider("kinesis"),
    ServiceEndpointEntry::provider("kinesisanalytics"),
    ServiceEndpointEntry::provider("kinesisanalyticsv2"),
    ServiceEndpointEntry::provider("kms"),
    ServiceEndpointEntry::provider("lakeformation"),
    ServiceEndpointEntry::provider("lambda"),
    ServiceEndpointEntry::provider("logs"),
    ServiceEndpointEntry::provider("mediaconvert"),
    ServiceEndpointEntry::provider("mediastore"),
    ServiceEndpointEntry::provider("meteringmarketplace"),
    ServiceEndpointEntry::provider("mq"),
    ServiceEndpointEntry::provider("neptune"),
    ServiceEndpointEntry::provider("opensearch"),
    ServiceEndpointEntry::provider("organizations"),
    ServiceEndpointEntry::provider("pinpoint"),
    ServiceEndpointEntry::provider("pipes"),
    ServiceEndpointEntry::provider("qldb"),
    ServiceEndpointEntry::provider("ram"),
    ServiceEndpointEntry::provider("rds"),
    ServiceEndpointEntry::provider("redshift"),
    ServiceEndpointEntry::provider("redshiftdata"),
    ServiceEndpointEntry::provider("resourcegroups"),
    ServiceEndpointEntry::provider("resourcegroupstaggingapi"),
    ServiceEndpointEntry::provider("route53"),
    ServiceEndpointEntry::provider("route53resolver"),
    ServiceEndpointEntry::shared("s3", Some("endpoint")),
    ServiceEndpointEntry::provider("s3control"),
    ServiceEndpointEntry::provider("scheduler"),
    ServiceEndpointEntry::provider("secretsmanager"),
    ServiceEndpointEntry::provider("serverlessrepo"),
    ServiceEndpointEntry::provider("servicediscovery"),
    ServiceEndpointEntry::provider("ses"),
    ServiceEndpointEntry::provider("sesv2"),
    ServiceEndpointEntry::provider("sfn"),
    ServiceEndpointEntry::provider("shield"),
    ServiceEndpointEntry::provider("sns"),
    ServiceEndpointEntry::provider("sqs"),
    ServiceEndpointEntry::provider("ssm"),
    ServiceEndpointEntry::backend_only("sso"),
    ServiceEndpointEntry::provider("ssoadmin"),
    ServiceEndpointEntry::shared("sts", Some("sts_endpoint")),
    ServiceEndpointEntry::provider("support"),
    ServiceEndpointEntry::provider("swf"),
    ServiceEndpointEntry::provider("timestreamwrite"),
    ServiceEndpointEntry::provider("transcribe"),
    ServiceEndpointEntry::provider("transfer"),
    ServiceEndpointEntry::provider("wafv2"),
    ServiceEndpointEntry::provider("xray"),
];

/// Decide between path-style and virtual-hosted S3 addressing.
///
/// Path-style is required unless the hostname starts with `s3.`, and is
/// always required for the bare loopback name. Container names such as
/// `localstack` therefore select path-style; any `s3.`-prefixed host, not
/// only the emulator's own domain, selects virtual-hosted style.
pub fn use_s3_path_style(s3_hostname: &str) -> bool {
    let hostname = s3_hostname.trim();
    hostname == LOOPBACK_HOSTNAME || !hostname.starts_with(S3_SUBDOMAIN_PREFIX)
}

/// The host inputs that every endpoint URL is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub endpoint: EmulatorEndpoint,
    pub s3_hostname: String,
}

impl HostConfig {
    pub fn new(endpoint: EmulatorEndpoint, s3_hostname: impl Into<String>) -> Self {
        Self {
            endpoint,
            s3_hostname: s3_hostname.into(),
        }
    }

    pub fn use_s3_path_style(&self) -> bool {
        use_s3_path_style(&self.s3_hostname)
    }

    pub fn s3_url(&self) -> String {
        if self.use_s3_path_style() {
            self.endpoint.base_url()
        } else {
            self.endpoint.url_for_host(self.s3_hostname.trim())
        }
    }
}

impl From<&Settings> for HostConfig {
    fn from(settings: &Settings) -> Self {
        Self::new(settings.endpoint.clone(), settings.s3_hostname.clone())
    }
}

/// Endpoint settings for a backend-style block, shaped by schema.
///
/// The two variants can never be mixed: a value is either a consolidated
/// map or a set of flat keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointMap {
    /// Rendered as `endpoints = { <service_id> = <url> }`.
    Current(BTreeMap<&'static str, String>),
    /// Rendered as `<legacy_key> = <url>` at the top level.
    Legacy(BTreeMap<&'static str, String>),
}

impl EndpointMap {
    pub fn schema(&self) -> EndpointSchema {
        match self {
            EndpointMap::Current(_) => EndpointSchema::Current,
            EndpointMap::Legacy(_) => EndpointSchema::Legacy,
        }
    }

    pub fn entries(&self) -> &BTreeMap<&'static str, String> {
        match self {
            EndpointMap::Current(map) | EndpointMap::Legacy(map) => map,
        }
    }
}

/// Endpoint settings for the S3 backend and remote-state configs.
///
/// `Current` yields one entry per backend service keyed by `service_id`.
/// `Legacy` yields only services that had a flat key; the rest are omitted.
pub fn endpoints_for(schema: EndpointSchema, hosts: &HostConfig) -> EndpointMap {
    let rows = SERVICES
        .iter()
        .filter(|entry| entry.backend && !entry.is_excluded());

    match schema {
        EndpointSchema::Current => EndpointMap::Current(
            rows.map(|entry| (entry.service_id, entry.url(hosts))).collect(),
        ),
        EndpointSchema::Legacy => EndpointMap::Legacy(
            rows.filter_map(|entry| entry.legacy_key.map(|key| (key, entry.url(hosts))))
                .collect(),
        ),
    }
}

/// Full map for a provider `endpoints` block.
pub fn provider_endpoints(hosts: &HostConfig) -> BTreeMap<&'static str, String> {
    SERVICES
        .iter()
        .filter(|entry| entry.provider && !entry.is_excluded())
        .map(|entry| (entry.service_id, entry.url(hosts)))
        .collect()
}

/// Every key that can carry an endpoint in a backend-style block,
/// across both schemas.
pub fn backend_endpoint_keys() -> impl Iterator<Item = &'static str> {
    std::iter::once("endpoints").chain(SERVICES.iter().filter_map(|entry| entry.legacy_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(s3_hostname: &str) -> HostConfig {
        HostConfig::new(EmulatorEndpoint::default(), s3_hostname)
    }

    #[test]
    fn test_path_style_decision_table() {
        assert!(use_s3_path_style("localhost"));
        assert!(!use_s3_path_style("s3.localhost.localstack.cloud"));
        assert!(use_s3_path_style("localstack"));
        assert!(!use_s3_path_style("s3.internal.host"));
        assert!(use_s3_path_style("127.0.0.1"));
    }

    #[test]
    fn test_service_ids_unique_and_sorted() {
        let ids: Vec<_> = SERVICES.iter().map(|e| e.service_id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_s3_url_follows_addressing_style() {
        assert_eq!(hosts("localhost").s3_url(), "http://localhost:4566");
        assert_eq!(
            hosts("s3.localhost.localstack.cloud").s3_url(),
            "http://s3.localhost.localstack.cloud:4566"
        );
    }

    #[test]
    fn test_excluded_services_never_emitted() {
        let hosts = hosts("localhost");
        let provider = provider_endpoints(&hosts);
        for excluded in EXCLUDED_SERVICES {
            assert!(
                SERVICES.iter().any(|entry| entry.service_id == *excluded),
                "{excluded} should be catalogued"
            );
            assert!(!provider.contains_key(excluded));
        }
        for schema in [EndpointSchema::Current, EndpointSchema::Legacy] {
            let map = endpoints_for(schema, &hosts);
            for excluded in EXCLUDED_SERVICES {
                assert!(!map.entries().contains_key(excluded));
            }
        }
    }

    #[test]
    fn test_current_backend_map() {
        let map = endpoints_for(EndpointSchema::Current, &hosts("localhost"));
        assert_eq!(map.schema(), EndpointSchema::Current);
        let keys: Vec<_> = map.entries().keys().copied().collect();
        assert_eq!(keys, vec!["dynamodb", "iam", "s3", "sso", "sts"]);
    }

    #[test]
    fn test_legacy_backend_map_omits_services_without_flat_key() {
        let map = endpoints_for(EndpointSchema::Legacy, &hosts("localhost"));
        assert_eq!(map.schema(), EndpointSchema::Legacy);
        let keys: Vec<_> = map.entries().keys().copied().collect();
        assert_eq!(
            keys,
            vec!["dynamodb_endpoint", "endpoint", "iam_endpoint", "sts_endpoint"]
        );
    }

    #[test]
    fn test_provider_map_excludes_backend_only_rows() {
        let map = provider_endpoints(&hosts("localhost"));
        assert!(map.contains_key("s3"));
        assert!(map.contains_key("sqs"));
        assert!(!map.contains_key("sso"));
        assert!(map.values().all(|url| url == "http://localhost:4566"));
    }
}
