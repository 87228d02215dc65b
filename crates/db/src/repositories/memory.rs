//! In-memory repository implementations for tests and doctor probes.

use std::collections::HashMap;
use tokio::sync::RwLock;

use chrono::Utc;

use leadpipe_core::domain::cost::{CostEntry, CostFilter};
use leadpipe_core::domain::lead::{Lead, LeadPatch};

use super::{CostBreakdownRow, CostLedger, CostSummary, LeadRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryLeadRepository {
    leads: RwLock<HashMap<String, Lead>>,
}

impl InMemoryLeadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_leads(leads: impl IntoIterator<Item = Lead>) -> Self {
        let map = leads.into_iter().map(|lead| (lead.email.clone(), lead)).collect();
        Self { leads: RwLock::new(map) }
    }
}

#[async_trait::async_trait]
impl LeadRepository for InMemoryLeadRepository {
    async fn upsert(&self, email: &str, patch: LeadPatch) -> Result<Lead, RepositoryError> {
        let mut guard = self.leads.write().await;
        let lead = guard.entry(email.to_string()).or_insert_with(|| Lead::new(email));
        lead.apply(patch, Utc::now());
        Ok(lead.clone())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Lead>, RepositoryError> {
        let guard = self.leads.read().await;
        Ok(guard.get(email).cloned())
    }

    async fn search(&self, query: &str) -> Result<Vec<Lead>, RepositoryError> {
        let needle = query.to_lowercase();
        let guard = self.leads.read().await;
        let mut hits: Vec<Lead> = guard
            .values()
            .filter(|lead| {
                let haystack = [
                    Some(lead.email.as_str()),
                    lead.name.as_deref(),
                    lead.company.as_deref(),
                    lead.context.as_deref(),
                ];
                haystack
                    .into_iter()
                    .flatten()
                    .any(|field| field.to_lowercase().contains(&needle))
                    || lead.tags.iter().any(|tag| tag.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(hits)
    }

    async fn list_unenriched(&self) -> Result<Vec<Lead>, RepositoryError> {
        let guard = self.leads.read().await;
        let mut pending: Vec<Lead> = guard.values().filter(|l| !l.enriched).cloned().collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let guard = self.leads.read().await;
        Ok(guard.len() as i64)
    }
}

#[derive(Default)]
pub struct InMemoryCostLedger {
    entries: RwLock<Vec<CostEntry>>,
}

impl InMemoryCostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<CostEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait::async_trait]
impl CostLedger for InMemoryCostLedger {
    async fn append(&self, entry: CostEntry) -> Result<(), RepositoryError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn aggregate(&self, filter: &CostFilter) -> Result<CostSummary, RepositoryError> {
        let entries = self.entries.read().await;
        let matching: Vec<&CostEntry> = entries
            .iter()
            .filter(|entry| {
                filter
                    .lead_email
                    .as_ref()
                    .map_or(true, |email| entry.lead_email.as_deref() == Some(email.as_str()))
                    && filter.operation.map_or(true, |op| entry.operation == op)
            })
            .collect();

        let mut buckets: HashMap<(String, String), CostBreakdownRow> = HashMap::new();
        for entry in &matching {
            let key = (entry.operation.as_str().to_string(), entry.tier.as_str().to_string());
            let row = buckets.entry(key).or_insert_with(|| CostBreakdownRow {
                operation: entry.operation,
                tier: entry.tier,
                count: 0,
                tokens: 0,
                cost: 0.0,
            });
            row.count += 1;
            row.tokens += i64::from(entry.tokens);
            row.cost += entry.cost;
        }
        let mut breakdown: Vec<CostBreakdownRow> = buckets.into_values().collect();
        breakdown.sort_by(|a, b| {
            (a.operation.as_str(), a.tier.as_str()).cmp(&(b.operation.as_str(), b.tier.as_str()))
        });

        Ok(CostSummary {
            total_cost: matching.iter().map(|e| e.cost).sum(),
            total_operations: matching.len() as i64,
            total_tokens: matching.iter().map(|e| i64::from(e.tokens)).sum(),
            breakdown,
        })
    }
}
