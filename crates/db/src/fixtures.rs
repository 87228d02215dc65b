use serde::Serialize;
use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Canonical demo pipeline used for local development and tours.
const DEMO_LEADS: &[DemoLeadContract] = &[
    DemoLeadContract {
        email: "john@techstartup.io",
        name: "John Smith",
        company: "TechStartup",
        title: "Founder & CEO",
        context: "Met at Cal Hacks booth. Recently raised $2M seed round. Hiring 3 engineers. Active on LinkedIn.",
        tags: &["cal-hacks", "funded"],
        stage: "demo",
        next_action: "Send investor deck - they just raised $2M seed",
    },
    DemoLeadContract {
        email: "sarah@growth.co",
        name: "Sarah Johnson",
        company: "Growth Co",
        title: "VP of Sales",
        context: "200+ sales team. Looking for automation tools. Attends major conferences.",
        tags: &["enterprise"],
        stage: "contacted",
        next_action: "Follow up about automation tools demo",
    },
    DemoLeadContract {
        email: "mike@enterprise.com",
        name: "Mike Chen",
        company: "Enterprise Corp",
        title: "CTO",
        context: "Active professional at Enterprise Corp. Good engagement potential.",
        tags: &[],
        stage: "new",
        next_action: "Research their tech stack, mention AI integration",
    },
    DemoLeadContract {
        email: "emily@startup.ai",
        name: "Emily Davis",
        company: "Startup AI",
        title: "Product Manager",
        context: "AI-focused startup. Looking for workflow tools.",
        tags: &["ai"],
        stage: "contacted",
        next_action: "Send case study on workflow automation",
    },
    DemoLeadContract {
        email: "alex@innovate.tech",
        name: "Alex Martinez",
        company: "Innovate Tech",
        title: "Engineering Lead",
        context: "Met at Cal Hacks. Interested in developer tools.",
        tags: &["cal-hacks"],
        stage: "new",
        next_action: "Connect on LinkedIn, mention Cal Hacks",
    },
];

/// One flagship enrichment plus one mini suggestion per demo lead.
const DEMO_COST_ROWS: &[(&str, &str, i64, f64)] =
    &[("enrichment", "flagship", 500, 0.0025), ("suggestion", "mini", 100, 0.000_015)];

/// Demo dataset of five enriched leads with matching ledger history.
///
/// Loading is destructive on the two managed tables and intended for
/// empty or throwaway databases only.
pub struct DemoDataset;

impl DemoDataset {
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query("DELETE FROM ai_costs")).await?;
        tx.execute(sqlx::query("DELETE FROM leads")).await?;

        let now = chrono::Utc::now().to_rfc3339();
        for lead in DEMO_LEADS {
            let tags_json = serde_json::to_string(lead.tags)
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;
            sqlx::query(
                "INSERT INTO leads
                     (email, name, company, title, context, tags, stage, next_action,
                      enriched, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
            )
            .bind(lead.email)
            .bind(lead.name)
            .bind(lead.company)
            .bind(lead.title)
            .bind(lead.context)
            .bind(&tags_json)
            .bind(lead.stage)
            .bind(lead.next_action)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            for (operation, tier, tokens, cost) in DEMO_COST_ROWS {
                sqlx::query(
                    "INSERT INTO ai_costs (operation, tier, tokens, cost, lead_email, recorded_at)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(operation)
                .bind(tier)
                .bind(tokens)
                .bind(cost)
                .bind(lead.email)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        Ok(SeedResult {
            leads_seeded: DEMO_LEADS.len(),
            cost_entries_seeded: DEMO_LEADS.len() * DEMO_COST_ROWS.len(),
        })
    }

    /// Verify that the demo dataset is present and intact.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for lead in DEMO_LEADS {
            let lead_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM leads
                     WHERE email = ?1 AND stage = ?2 AND enriched = 1)",
            )
            .bind(lead.email)
            .bind(lead.stage)
            .fetch_one(pool)
            .await?;
            checks.push(Check { label: lead.email.to_string(), passed: lead_ok == 1 });

            let ledger_count: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM ai_costs WHERE lead_email = ?1")
                    .bind(lead.email)
                    .fetch_one(pool)
                    .await?;
            checks.push(Check {
                label: format!("{}-ledger", lead.email),
                passed: ledger_count == DEMO_COST_ROWS.len() as i64,
            });
        }

        let all_present = checks.iter().all(|check| check.passed);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug, Clone, Copy)]
struct DemoLeadContract {
    email: &'static str,
    name: &'static str,
    company: &'static str,
    title: &'static str,
    context: &'static str,
    tags: &'static [&'static str],
    stage: &'static str,
    next_action: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedResult {
    pub leads_seeded: usize,
    pub cost_entries_seeded: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub label: String,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<Check>,
}
