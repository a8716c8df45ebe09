//! Provider registry lookup (NPPES-style NPI API).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_status, decode, endpoint, IntegrationError};
use crate::config::ServiceConfig;

const SERVICE: &str = "registry";

/// A provider as listed in the national registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRecord {
    /// The ten-digit NPI.
    pub npi: String,
    /// Display name assembled from the registry's name fields.
    pub name: String,
    /// Credential suffix such as "MD" or "NP".
    pub credential: Option<String>,
    /// Primary taxonomy description.
    pub specialty: Option<String>,
    /// Whether the registry lists the enumeration as active.
    pub active: bool,
}

/// Looks up providers by NPI.
#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    /// Returns `None` when the registry has no record for `npi`.
    async fn lookup_npi(&self, npi: &str) -> Result<Option<RegistryRecord>, IntegrationError>;
}

/// Registry client over HTTP.
pub struct HttpProviderRegistry {
    client: reqwest::Client,
    config: ServiceConfig,
}

impl HttpProviderRegistry {
    pub fn new(client: reqwest::Client, config: ServiceConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ProviderRegistry for HttpProviderRegistry {
    async fn lookup_npi(&self, npi: &str) -> Result<Option<RegistryRecord>, IntegrationError> {
        if !self.config.is_configured() {
            return Err(IntegrationError::NotConfigured(SERVICE));
        }

        let response = self
            .client
            .get(endpoint(&self.config, "/"))
            .query(&[("version", "2.1"), ("number", npi)])
            .send()
            .await?;
        let response = check_status(SERVICE, response).await?;
        let body: RegistryResponse = decode(SERVICE, response).await?;

        tracing::debug!(npi, result_count = body.result_count, "Registry lookup");
        Ok(body.into_record())
    }
}

#[derive(Debug, Deserialize)]
struct RegistryResponse {
    #[serde(default)]
    result_count: u32,
    #[serde(default)]
    results: Vec<RegistryResult>,
}

#[derive(Debug, Deserialize)]
struct RegistryResult {
    number: serde_json::Value,
    #[serde(default)]
    basic: RegistryBasic,
    #[serde(default)]
    taxonomies: Vec<RegistryTaxonomy>,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryBasic {
    first_name: Option<String>,
    last_name: Option<String>,
    organization_name: Option<String>,
    credential: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegistryTaxonomy {
    desc: Option<String>,
    #[serde(default)]
    primary: bool,
}

impl RegistryResponse {
    fn into_record(self) -> Option<RegistryRecord> {
        if self.result_count == 0 {
            return None;
        }
        let result = self.results.into_iter().next()?;

        let npi = match result.number {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        let basic = result.basic;
        let name = match (&basic.organization_name, &basic.first_name, &basic.last_name) {
            (Some(org), _, _) => org.clone(),
            (None, first, last) => [first.as_deref(), last.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" "),
        };
        let specialty = result
            .taxonomies
            .iter()
            .find(|t| t.primary)
            .or_else(|| result.taxonomies.first())
            .and_then(|t| t.desc.clone());

        Some(RegistryRecord {
            npi,
            name,
            credential: basic.credential,
            specialty,
            active: basic.status.as_deref().map_or(true, |s| s == "A"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Option<RegistryRecord> {
        serde_json::from_str::<RegistryResponse>(json)
            .unwrap()
            .into_record()
    }

    #[test]
    fn test_individual_provider_record() {
        let record = parse(
            r#"{
                "result_count": 1,
                "results": [{
                    "number": 1234567893,
                    "basic": {"first_name": "JANE", "last_name": "DOE", "credential": "MD", "status": "A"},
                    "taxonomies": [
                        {"desc": "Internal Medicine", "primary": false},
                        {"desc": "Family Medicine", "primary": true}
                    ]
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(record.npi, "1234567893");
        assert_eq!(record.name, "JANE DOE");
        assert_eq!(record.credential.as_deref(), Some("MD"));
        assert_eq!(record.specialty.as_deref(), Some("Family Medicine"));
        assert!(record.active);
    }

    #[test]
    fn test_organization_record() {
        let record = parse(
            r#"{
                "result_count": 1,
                "results": [{
                    "number": "1999999984",
                    "basic": {"organization_name": "CORNER PHARMACY", "status": "D"},
                    "taxonomies": [{"desc": "Pharmacy"}]
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(record.npi, "1999999984");
        assert_eq!(record.name, "CORNER PHARMACY");
        assert_eq!(record.specialty.as_deref(), Some("Pharmacy"));
        assert!(!record.active);
    }

    #[test]
    fn test_no_results() {
        assert!(parse(r#"{"result_count": 0, "results": []}"#).is_none());
        // The registry answers validation failures with an `Errors` array only
        assert!(parse(r#"{"Errors": [{"description": "bad number"}]}"#).is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_registry() {
        let registry = HttpProviderRegistry::new(reqwest::Client::new(), ServiceConfig::default());
        let result = registry.lookup_npi("1234567893").await;
        assert!(matches!(result, Err(IntegrationError::NotConfigured("registry"))));
    }
}
