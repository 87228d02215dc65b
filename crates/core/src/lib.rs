pub mod config;
pub mod domain;
pub mod errors;
pub mod routing;

pub use domain::cost::{CostEntry, CostFilter, ModelTier, OperationKind};
pub use domain::lead::{Lead, LeadPatch, Stage};
pub use errors::ToolError;
pub use routing::RoutingPolicy;
