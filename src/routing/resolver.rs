use super::rules::{DeliveryTarget, EndpointRegistry, MappingRule, RoutingRules};

/// Resolves a notification's (type_id, category) to delivery targets.
///
/// Tier precedence does not fall through: a type-specific rule list claims
/// the resolution exclusively even when filtering leaves it empty, then the
/// category list, then the defaults. Individually invalid rules are dropped
/// without discarding their siblings; an empty result is a valid outcome
/// (nothing is delivered, no error).
pub struct RoutingResolver {
    rules: RoutingRules,
    endpoints: EndpointRegistry,
}

impl RoutingResolver {
    pub fn new(rules: RoutingRules, endpoints: EndpointRegistry) -> Self {
        Self { rules, endpoints }
    }

    /// Resolve the ordered list of delivery targets for a notification
    pub fn resolve(&self, type_id: &str, category: &str) -> Vec<DeliveryTarget> {
        let tier = if let Some(rules) = self.rules.by_type.get(type_id) {
            rules.as_slice()
        } else if let Some(rules) = self.rules.by_category.get(category) {
            rules.as_slice()
        } else {
            self.rules.default_rules.as_slice()
        };

        let targets: Vec<DeliveryTarget> = tier
            .iter()
            .filter(|rule| rule.enabled)
            .filter_map(|rule| self.resolve_rule(rule))
            .collect();

        tracing::debug!(
            type_id = %type_id,
            category = %category,
            target_count = targets.len(),
            "Resolved routing targets"
        );

        targets
    }

    /// Resolve a single rule against the endpoint registry.
    /// Malformed rules and unknown destinations drop the rule only.
    fn resolve_rule(&self, rule: &MappingRule) -> Option<DeliveryTarget> {
        if !rule.is_well_formed() {
            tracing::warn!(
                platform = %rule.platform,
                resource_key = %rule.resource_key,
                "Dropping mapping rule with blank fields"
            );
            return None;
        }

        match self.endpoints.endpoint_url(&rule.platform, &rule.resource_key) {
            Some(url) => Some(DeliveryTarget {
                platform: rule.platform.clone(),
                resource_key: rule.resource_key.clone(),
                endpoint_url: url.to_string(),
            }),
            None => {
                tracing::warn!(
                    platform = %rule.platform,
                    resource_key = %rule.resource_key,
                    "Dropping mapping rule with no configured endpoint"
                );
                None
            }
        }
    }
}
