// Infrastructure layer (shared components)
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Domain layer (business logic)
pub mod deadletter;
pub mod dispatch;
pub mod notification;
pub mod outbound;
pub mod resilience;
pub mod routing;

// Supporting modules
pub mod tasks;
