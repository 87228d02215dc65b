use chrono::{DateTime, Utc};
use sqlx::Row;

use leadpipe_core::domain::lead::{Lead, LeadPatch, Stage};

use super::{LeadRepository, RepositoryError};
use crate::DbPool;

pub struct SqlLeadRepository {
    pool: DbPool,
}

impl SqlLeadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const LEAD_COLUMNS: &str = "email, name, company, title, context, tags, stage, next_action,
                            enriched, created_at, updated_at";

fn row_to_lead(row: &sqlx::sqlite::SqliteRow) -> Result<Lead, RepositoryError> {
    let email: String =
        row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: Option<String> =
        row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let company: Option<String> =
        row.try_get("company").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let title: Option<String> =
        row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let context: Option<String> =
        row.try_get("context").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tags_raw: String =
        row.try_get("tags").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let stage_raw: String =
        row.try_get("stage").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let next_action: Option<String> =
        row.try_get("next_action").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let enriched: i64 =
        row.try_get("enriched").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_raw: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_raw: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let tags: Vec<String> = serde_json::from_str(&tags_raw)
        .map_err(|e| RepositoryError::Decode(format!("tags column is not a JSON array: {e}")))?;

    Ok(Lead {
        email,
        name,
        company,
        title,
        context,
        tags,
        stage: Stage::parse(&stage_raw),
        next_action,
        enriched: enriched != 0,
        created_at: parse_timestamp(&created_at_raw),
        updated_at: parse_timestamp(&updated_at_raw),
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

async fn save_lead(pool: &DbPool, lead: &Lead) -> Result<(), RepositoryError> {
    let tags = serde_json::to_string(&lead.tags)
        .map_err(|e| RepositoryError::Decode(format!("tags are not serializable: {e}")))?;

    sqlx::query(
        "INSERT INTO leads (email, name, company, title, context, tags, stage, next_action,
                            enriched, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(email) DO UPDATE SET
             name = excluded.name,
             company = excluded.company,
             title = excluded.title,
             context = excluded.context,
             tags = excluded.tags,
             stage = excluded.stage,
             next_action = excluded.next_action,
             enriched = excluded.enriched,
             updated_at = excluded.updated_at",
    )
    .bind(&lead.email)
    .bind(&lead.name)
    .bind(&lead.company)
    .bind(&lead.title)
    .bind(&lead.context)
    .bind(&tags)
    .bind(lead.stage.as_str())
    .bind(&lead.next_action)
    .bind(i64::from(lead.enriched))
    .bind(lead.created_at.to_rfc3339())
    .bind(lead.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

#[async_trait::async_trait]
impl LeadRepository for SqlLeadRepository {
    async fn upsert(&self, email: &str, patch: LeadPatch) -> Result<Lead, RepositoryError> {
        // Read-modify-write: concurrent upserts for the same email are
        // last-writer-wins on the row, which matches the documented
        // concurrency model for this store.
        let mut lead = self.find_by_email(email).await?.unwrap_or_else(|| Lead::new(email));
        lead.apply(patch, Utc::now());
        save_lead(&self.pool, &lead).await?;
        Ok(lead)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Lead>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_lead(r)?)),
            None => Ok(None),
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<Lead>, RepositoryError> {
        let pattern = format!("%{}%", query.trim().to_lowercase());
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads
             WHERE LOWER(email) LIKE ?
                OR LOWER(IFNULL(name, '')) LIKE ?
                OR LOWER(IFNULL(company, '')) LIKE ?
                OR LOWER(IFNULL(context, '')) LIKE ?
                OR LOWER(tags) LIKE ?
             ORDER BY updated_at DESC"
        ))
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_lead).collect::<Result<Vec<_>, _>>()
    }

    async fn list_unenriched(&self) -> Result<Vec<Lead>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE enriched = 0 ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_lead).collect::<Result<Vec<_>, _>>()
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM leads")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use leadpipe_core::domain::lead::{LeadPatch, Stage};

    use super::SqlLeadRepository;
    use crate::repositories::LeadRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn context_patch(context: &str) -> LeadPatch {
        LeadPatch { context: Some(context.to_string()), ..LeadPatch::default() }
    }

    #[tokio::test]
    async fn upsert_then_find_round_trips_email() {
        let repo = SqlLeadRepository::new(setup().await);

        let created = repo.upsert("a@x.com", context_patch("met at conf")).await.expect("upsert");
        assert_eq!(created.email, "a@x.com");
        assert_eq!(created.stage, Stage::New);

        let found = repo.find_by_email("a@x.com").await.expect("find").expect("exists");
        assert_eq!(found.email, "a@x.com");
        assert_eq!(found.context.as_deref(), Some("met at conf"));
    }

    #[tokio::test]
    async fn find_returns_none_for_absent_lead() {
        let repo = SqlLeadRepository::new(setup().await);
        let found = repo.find_by_email("nobody@x.com").await.expect("find");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn upsert_merges_instead_of_replacing() {
        let repo = SqlLeadRepository::new(setup().await);

        repo.upsert(
            "a@x.com",
            LeadPatch { name: Some("Ada".to_string()), ..context_patch("met at conf") },
        )
        .await
        .expect("create");

        let updated = repo
            .upsert("a@x.com", LeadPatch { title: Some("CTO".to_string()), ..LeadPatch::default() })
            .await
            .expect("merge");

        assert_eq!(updated.name.as_deref(), Some("Ada"));
        assert_eq!(updated.title.as_deref(), Some("CTO"));
        assert_eq!(updated.context.as_deref(), Some("met at conf"));
    }

    #[tokio::test]
    async fn search_matches_name_company_and_context_case_insensitively() {
        let repo = SqlLeadRepository::new(setup().await);

        repo.upsert(
            "john@techstartup.io",
            LeadPatch {
                name: Some("John Smith".to_string()),
                company: Some("TechStartup".to_string()),
                ..context_patch("raised seed round")
            },
        )
        .await
        .expect("seed john");
        repo.upsert(
            "sarah@growth.co",
            LeadPatch {
                name: Some("Sarah Johnson".to_string()),
                company: Some("Growth Co".to_string()),
                ..context_patch("200+ sales team")
            },
        )
        .await
        .expect("seed sarah");

        let by_company = repo.search("TECHSTARTUP").await.expect("search company");
        assert_eq!(by_company.len(), 1);
        assert_eq!(by_company[0].email, "john@techstartup.io");

        let by_context = repo.search("sales team").await.expect("search context");
        assert_eq!(by_context.len(), 1);
        assert_eq!(by_context[0].email, "sarah@growth.co");
    }

    #[tokio::test]
    async fn empty_query_returns_all_leads_nonexistent_token_returns_none() {
        let repo = SqlLeadRepository::new(setup().await);

        repo.upsert("a@x.com", context_patch("one")).await.expect("seed a");
        repo.upsert("b@y.com", context_patch("two")).await.expect("seed b");

        let all = repo.search("").await.expect("search all");
        assert_eq!(all.len(), 2);

        let none = repo.search("zebra-unicycle").await.expect("search none");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn search_orders_by_recency() {
        let repo = SqlLeadRepository::new(setup().await);

        repo.upsert("old@x.com", context_patch("first")).await.expect("seed old");
        repo.upsert("new@x.com", context_patch("second")).await.expect("seed new");
        // Touching the older lead makes it the most recently updated.
        repo.upsert("old@x.com", context_patch("followed up")).await.expect("touch old");

        let all = repo.search("").await.expect("search");
        assert_eq!(all[0].email, "old@x.com");
    }

    #[tokio::test]
    async fn list_unenriched_excludes_enriched_leads() {
        let repo = SqlLeadRepository::new(setup().await);

        repo.upsert("raw@x.com", context_patch("new lead")).await.expect("seed raw");
        repo.upsert(
            "done@x.com",
            LeadPatch { enriched: Some(true), ..context_patch("already profiled") },
        )
        .await
        .expect("seed done");

        let pending = repo.list_unenriched().await.expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].email, "raw@x.com");
    }
}
