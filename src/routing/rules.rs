use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

/// A single configured mapping from a routing tier to a destination.
///
/// Configuration-time data; read-only at dispatch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingRule {
    pub platform: String,
    pub resource_key: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl MappingRule {
    pub fn new(platform: impl Into<String>, resource_key: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            resource_key: resource_key.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// A rule with blank platform or resource key can never resolve
    pub fn is_well_formed(&self) -> bool {
        !self.platform.trim().is_empty() && !self.resource_key.trim().is_empty()
    }
}

/// Tiered mapping rules: type-specific, category, default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingRules {
    /// Rules keyed by notification type id; presence of a key claims the
    /// tier exclusively, even if every rule in it is disabled
    #[serde(default)]
    pub by_type: HashMap<String, Vec<MappingRule>>,
    /// Rules keyed by category
    #[serde(default)]
    pub by_category: HashMap<String, Vec<MappingRule>>,
    /// Unconditional fallback rules
    #[serde(default)]
    pub default_rules: Vec<MappingRule>,
}

/// Registry of configured webhook endpoints, `platform -> resource_key -> URL`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointRegistry {
    #[serde(default)]
    endpoints: HashMap<String, HashMap<String, String>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint URL for a destination
    pub fn register(
        &mut self,
        platform: impl Into<String>,
        resource_key: impl Into<String>,
        url: impl Into<String>,
    ) {
        self.endpoints
            .entry(platform.into())
            .or_default()
            .insert(resource_key.into(), url.into());
    }

    /// Look up the endpoint URL for a destination
    pub fn endpoint_url(&self, platform: &str, resource_key: &str) -> Option<&str> {
        self.endpoints
            .get(platform)
            .and_then(|keys| keys.get(resource_key))
            .map(String::as_str)
    }
}

/// A resolved delivery destination.
///
/// `platform` + `resource_key` is the identity used for resilience state
/// and config overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTarget {
    pub platform: String,
    pub resource_key: String,
    pub endpoint_url: String,
}

impl DeliveryTarget {
    /// Resilience-resource identity for this destination
    pub fn resource_id(&self) -> String {
        format!("{}:{}", self.platform, self.resource_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_defaults_enabled() {
        let rule: MappingRule =
            serde_json::from_str(r#"{"platform":"slack","resource_key":"ops"}"#).unwrap();
        assert!(rule.enabled);
        assert!(rule.is_well_formed());
    }

    #[test]
    fn test_blank_fields_not_well_formed() {
        assert!(!MappingRule::new("", "ops").is_well_formed());
        assert!(!MappingRule::new("slack", "   ").is_well_formed());
    }

    #[test]
    fn test_endpoint_registry_lookup() {
        let mut registry = EndpointRegistry::new();
        registry.register("slack", "ops", "https://hooks.example.com/ops");

        assert_eq!(
            registry.endpoint_url("slack", "ops"),
            Some("https://hooks.example.com/ops")
        );
        assert_eq!(registry.endpoint_url("slack", "missing"), None);
        assert_eq!(registry.endpoint_url("teams", "ops"), None);
    }

    #[test]
    fn test_resource_id() {
        let target = DeliveryTarget {
            platform: "slack".into(),
            resource_key: "ops".into(),
            endpoint_url: "https://hooks.example.com/ops".into(),
        };
        assert_eq!(target.resource_id(), "slack:ops");
    }
}
