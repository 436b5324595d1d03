//! Routing of notifications to delivery targets.
//!
//! Mapping rules are grouped into three tiers (type-specific, category,
//! default); the resolver picks exactly one tier and resolves each rule
//! against the endpoint registry.

mod resolver;
mod rules;

pub use resolver::RoutingResolver;
pub use rules::{DeliveryTarget, EndpointRegistry, MappingRule, RoutingRules};
