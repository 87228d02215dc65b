use chrono::{DateTime, Utc};
use sqlx::Row;

use leadpipe_core::domain::cost::{CostEntry, CostFilter, ModelTier, OperationKind};

use super::{CostBreakdownRow, CostLedger, CostSummary, RepositoryError};
use crate::DbPool;

pub struct SqlCostLedger {
    pool: DbPool,
}

impl SqlCostLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Full entry listing, newest first. Used by fixtures verification and
    /// operator tooling; the tool surface only exposes aggregates.
    pub async fn list(&self) -> Result<Vec<CostEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT operation, tier, tokens, cost, lead_email, recorded_at
             FROM ai_costs ORDER BY recorded_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect::<Result<Vec<_>, _>>()
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<CostEntry, RepositoryError> {
    let operation_raw: String =
        row.try_get("operation").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tier_raw: String =
        row.try_get("tier").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tokens: i64 =
        row.try_get("tokens").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let cost: f64 = row.try_get("cost").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let lead_email: Option<String> =
        row.try_get("lead_email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let recorded_at_raw: String =
        row.try_get("recorded_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let operation = OperationKind::parse(&operation_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown ledger operation `{operation_raw}`"))
    })?;
    let tier = ModelTier::parse(&tier_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown ledger tier `{tier_raw}`")))?;

    Ok(CostEntry {
        operation,
        tier,
        tokens: u32::try_from(tokens)
            .map_err(|_| RepositoryError::Decode(format!("negative token count {tokens}")))?,
        cost,
        lead_email,
        recorded_at: DateTime::parse_from_rfc3339(&recorded_at_raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[async_trait::async_trait]
impl CostLedger for SqlCostLedger {
    async fn append(&self, entry: CostEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ai_costs (operation, tier, tokens, cost, lead_email, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.operation.as_str())
        .bind(entry.tier.as_str())
        .bind(i64::from(entry.tokens))
        .bind(entry.cost)
        .bind(&entry.lead_email)
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn aggregate(&self, filter: &CostFilter) -> Result<CostSummary, RepositoryError> {
        let mut conditions = Vec::new();
        if filter.lead_email.is_some() {
            conditions.push("lead_email = ?");
        }
        if filter.operation.is_some() {
            conditions.push("operation = ?");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let totals_sql = format!(
            "SELECT IFNULL(SUM(cost), 0.0) AS total_cost,
                    COUNT(*) AS total_operations,
                    IFNULL(SUM(tokens), 0) AS total_tokens
             FROM ai_costs{where_clause}"
        );
        let mut totals_query = sqlx::query(&totals_sql);
        if let Some(lead_email) = &filter.lead_email {
            totals_query = totals_query.bind(lead_email);
        }
        if let Some(operation) = filter.operation {
            totals_query = totals_query.bind(operation.as_str());
        }
        let totals = totals_query.fetch_one(&self.pool).await?;

        let breakdown_sql = format!(
            "SELECT operation, tier, COUNT(*) AS count,
                    IFNULL(SUM(tokens), 0) AS tokens, IFNULL(SUM(cost), 0.0) AS cost
             FROM ai_costs{where_clause}
             GROUP BY operation, tier
             ORDER BY operation, tier"
        );
        let mut breakdown_query = sqlx::query(&breakdown_sql);
        if let Some(lead_email) = &filter.lead_email {
            breakdown_query = breakdown_query.bind(lead_email);
        }
        if let Some(operation) = filter.operation {
            breakdown_query = breakdown_query.bind(operation.as_str());
        }
        let breakdown_rows = breakdown_query.fetch_all(&self.pool).await?;

        let breakdown = breakdown_rows
            .iter()
            .map(|row| {
                let operation_raw: String =
                    row.try_get("operation").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let tier_raw: String =
                    row.try_get("tier").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                Ok(CostBreakdownRow {
                    operation: OperationKind::parse(&operation_raw).ok_or_else(|| {
                        RepositoryError::Decode(format!(
                            "unknown ledger operation `{operation_raw}`"
                        ))
                    })?,
                    tier: ModelTier::parse(&tier_raw).ok_or_else(|| {
                        RepositoryError::Decode(format!("unknown ledger tier `{tier_raw}`"))
                    })?,
                    count: row
                        .try_get("count")
                        .map_err(|e| RepositoryError::Decode(e.to_string()))?,
                    tokens: row
                        .try_get("tokens")
                        .map_err(|e| RepositoryError::Decode(e.to_string()))?,
                    cost: row
                        .try_get("cost")
                        .map_err(|e| RepositoryError::Decode(e.to_string()))?,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(CostSummary {
            total_cost: totals
                .try_get("total_cost")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            total_operations: totals
                .try_get("total_operations")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            total_tokens: totals
                .try_get("total_tokens")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            breakdown,
        })
    }
}

#[cfg(test)]
mod tests {
    use leadpipe_core::domain::cost::{CostEntry, CostFilter, ModelTier, OperationKind};

    use super::SqlCostLedger;
    use crate::repositories::CostLedger;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn enrichment_entry(lead_email: &str) -> CostEntry {
        CostEntry::new(
            OperationKind::Enrichment,
            ModelTier::Flagship,
            500,
            0.0025,
            Some(lead_email.to_string()),
        )
    }

    #[tokio::test]
    async fn append_then_aggregate_counts_every_entry() {
        let ledger = SqlCostLedger::new(setup().await);

        ledger.append(enrichment_entry("a@x.com")).await.expect("append 1");
        ledger
            .append(CostEntry::new(
                OperationKind::Suggestion,
                ModelTier::Mini,
                100,
                0.000015,
                Some("a@x.com".to_string()),
            ))
            .await
            .expect("append 2");

        let summary = ledger.aggregate(&CostFilter::default()).await.expect("aggregate");
        assert_eq!(summary.total_operations, 2);
        assert_eq!(summary.total_tokens, 600);
        assert!((summary.total_cost - 0.002515).abs() < 1e-9);
        assert_eq!(summary.breakdown.len(), 2);
    }

    #[tokio::test]
    async fn aggregate_total_is_monotonic_across_appends() {
        let ledger = SqlCostLedger::new(setup().await);
        let mut previous_total = 0.0;

        for _ in 0..3 {
            ledger.append(enrichment_entry("a@x.com")).await.expect("append");
            let summary = ledger.aggregate(&CostFilter::default()).await.expect("aggregate");
            assert!(summary.total_cost >= previous_total, "total must never decrease");
            previous_total = summary.total_cost;
        }
    }

    #[tokio::test]
    async fn aggregate_filters_by_lead_email_and_operation() {
        let ledger = SqlCostLedger::new(setup().await);

        ledger.append(enrichment_entry("a@x.com")).await.expect("append a");
        ledger.append(enrichment_entry("b@y.com")).await.expect("append b");
        ledger
            .append(CostEntry::new(
                OperationKind::EmailDraft,
                ModelTier::Flagship,
                300,
                0.0015,
                Some("a@x.com".to_string()),
            ))
            .await
            .expect("append draft");

        let for_a = ledger
            .aggregate(&CostFilter {
                lead_email: Some("a@x.com".to_string()),
                ..CostFilter::default()
            })
            .await
            .expect("filter lead");
        assert_eq!(for_a.total_operations, 2);

        let drafts = ledger
            .aggregate(&CostFilter {
                operation: Some(OperationKind::EmailDraft),
                ..CostFilter::default()
            })
            .await
            .expect("filter operation");
        assert_eq!(drafts.total_operations, 1);
        assert_eq!(drafts.total_tokens, 300);
    }

    #[tokio::test]
    async fn entries_survive_without_an_owning_lead() {
        // The ledger references leads by email only; no lead row needs to
        // exist for an entry to be recorded or aggregated.
        let ledger = SqlCostLedger::new(setup().await);

        ledger.append(enrichment_entry("ghost@gone.com")).await.expect("append");
        let listed = ledger.list().await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].lead_email.as_deref(), Some("ghost@gone.com"));
    }
}
