//! Cost-aware routing of generation calls through a metered forward proxy.
//!
//! The upstream generation API is never called directly. Every request goes
//! through the billing proxy, which meters tokens per forward token, and the
//! resulting cost is returned to the caller for ledger persistence.

pub mod client;
pub mod prompts;
pub mod route;

pub use client::{Completion, ForwardClient, GenerationClient, UpstreamError};
pub use route::{CostRouter, RoutedResponse};
