use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use leadpipe_core::domain::cost::{CostEntry, CostFilter, ModelTier, OperationKind};
use leadpipe_core::domain::lead::{Lead, LeadPatch};

pub mod cost;
pub mod lead;
pub mod memory;

pub use cost::SqlCostLedger;
pub use lead::SqlLeadRepository;
pub use memory::{InMemoryCostLedger, InMemoryLeadRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait LeadRepository: Send + Sync {
    /// Create the lead if absent, otherwise merge non-null patch fields into
    /// the stored row. Returns the resulting lead either way.
    async fn upsert(&self, email: &str, patch: LeadPatch) -> Result<Lead, RepositoryError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Lead>, RepositoryError>;

    /// Case-insensitive substring match over name, company, context, and
    /// tags, most recently updated first. The empty query matches everything.
    async fn search(&self, query: &str) -> Result<Vec<Lead>, RepositoryError>;

    async fn list_unenriched(&self) -> Result<Vec<Lead>, RepositoryError>;

    async fn count(&self) -> Result<i64, RepositoryError>;
}

#[async_trait]
pub trait CostLedger: Send + Sync {
    /// Pure insert. The ledger is append-only; there is no update path.
    async fn append(&self, entry: CostEntry) -> Result<(), RepositoryError>;

    async fn aggregate(&self, filter: &CostFilter) -> Result<CostSummary, RepositoryError>;
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CostSummary {
    pub total_cost: f64,
    pub total_operations: i64,
    pub total_tokens: i64,
    pub breakdown: Vec<CostBreakdownRow>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CostBreakdownRow {
    pub operation: OperationKind,
    pub tier: ModelTier,
    pub count: i64,
    pub tokens: i64,
    pub cost: f64,
}
