//! The external-facing tool surface.
//!
//! Each tool is a pure composition of repository, router, and notifier:
//! validate input → fetch/create lead → optionally route a generation call →
//! persist → notify → structured JSON result. Tools never depend on one
//! another's in-flight state, and concurrent writes to the same lead are
//! last-writer-wins (no per-email lock; a known, documented gap). Ledger
//! appends are intentionally non-idempotent: each routed call bills once.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use leadpipe_core::domain::cost::{CostEntry, CostFilter, ModelTier, OperationKind};
use leadpipe_core::domain::lead::{validate_email, Lead, LeadPatch};
use leadpipe_core::routing::price_per_token;
use leadpipe_core::ToolError;
use leadpipe_db::repositories::{CostLedger, CostSummary, LeadRepository, RepositoryError};
use leadpipe_notify::{send_best_effort, Notifier};
use leadpipe_router::{prompts, CostRouter, RoutedResponse, UpstreamError};

pub struct ToolService {
    leads: Arc<dyn LeadRepository>,
    ledger: Arc<dyn CostLedger>,
    router: CostRouter,
    notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Deserialize)]
pub struct AddLeadRequest {
    pub email: String,
    pub context: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LeadEmailRequest {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BillingParams {
    pub lead_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AddLeadResponse {
    pub email: String,
    pub lead: Lead,
}

#[derive(Debug, Serialize)]
pub struct EnrichResponse {
    pub email: String,
    pub lead: Lead,
    pub ai_cost: f64,
}

#[derive(Debug, Serialize)]
pub struct DraftResponse {
    pub email: String,
    pub email_text: String,
    pub ai_cost: f64,
}

#[derive(Debug, Serialize)]
pub struct SuggestResponse {
    pub email: String,
    pub suggestion: String,
    pub ai_cost: f64,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub count: usize,
    pub leads: Vec<Lead>,
}

/// Margin arithmetic against a flagship-only baseline: what the same token
/// volume would have cost had every operation used the flagship tier.
#[derive(Debug, Serialize)]
pub struct RoutingSavings {
    pub actual_cost: f64,
    pub flagship_only_cost: f64,
    pub savings: f64,
    pub savings_percent: f64,
}

#[derive(Debug, Serialize)]
pub struct BillingResponse {
    #[serde(flatten)]
    pub summary: CostSummary,
    pub routing_savings: RoutingSavings,
}

#[derive(Debug, Serialize)]
pub struct EnrichPendingResponse {
    pub enriched: Vec<String>,
    pub failed: Vec<EnrichFailure>,
}

#[derive(Debug, Serialize)]
pub struct EnrichFailure {
    pub email: String,
    pub error: String,
}

impl ToolService {
    pub fn new(
        leads: Arc<dyn LeadRepository>,
        ledger: Arc<dyn CostLedger>,
        router: CostRouter,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { leads, ledger, router, notifier }
    }

    /// Create or merge a lead. Issues no generation call and never bills.
    pub async fn add_lead(&self, request: AddLeadRequest) -> Result<AddLeadResponse, ToolError> {
        let email = validate_email(&request.email)?.to_string();
        if request.context.trim().is_empty() {
            return Err(ToolError::InvalidInput("context must not be empty".to_string()));
        }

        let patch = LeadPatch {
            name: request.name.filter(|n| !n.trim().is_empty()),
            context: Some(request.context),
            ..LeadPatch::default()
        };
        let lead = self.leads.upsert(&email, patch).await.map_err(storage_error)?;

        info!(%email, "lead added to pipeline");
        send_best_effort(self.notifier.as_ref(), &format!("Added lead: {email}")).await;

        Ok(AddLeadResponse { email, lead })
    }

    /// Research a lead through the flagship tier, merge the resulting
    /// profile, and bill exactly one ledger entry.
    pub async fn enrich_contact(&self, email: &str) -> Result<EnrichResponse, ToolError> {
        let email = validate_email(email)?.to_string();
        let lead = self.require_lead(&email).await?;

        let prompt = prompts::enrichment_prompt(&email, lead.context.as_deref());
        let routed = self.router.route(OperationKind::Enrichment, &prompt).await;
        let routed = self.bill(OperationKind::Enrichment, Some(&email), routed).await?;

        let mut patch = prompts::parse_enrichment_profile(&email, &routed.text);
        patch.enriched = Some(true);
        let lead = self.leads.upsert(&email, patch).await.map_err(storage_error)?;

        info!(%email, cost = format!("{:.6}", routed.cost), "lead enriched");
        send_best_effort(
            self.notifier.as_ref(),
            &format!(
                "Profile enriched: {}\n{} @ {}\nAI cost: ${:.6}",
                lead.name.as_deref().unwrap_or(&email),
                lead.title.as_deref().unwrap_or("Unknown title"),
                lead.company.as_deref().unwrap_or("unknown company"),
                routed.cost
            ),
        )
        .await;

        Ok(EnrichResponse { email, lead, ai_cost: routed.cost })
    }

    /// Draft a first-touch cold email. Bills one ledger entry; the lead row
    /// itself is not modified.
    pub async fn draft_cold_email(&self, email: &str) -> Result<DraftResponse, ToolError> {
        let email = validate_email(email)?.to_string();
        let lead = self.require_lead(&email).await?;

        let prompt = prompts::cold_email_prompt(&lead);
        let routed = self.router.route(OperationKind::EmailDraft, &prompt).await;
        let routed = self.bill(OperationKind::EmailDraft, Some(&email), routed).await?;

        info!(%email, cost = format!("{:.6}", routed.cost), "cold email drafted");
        Ok(DraftResponse { email, email_text: routed.text, ai_cost: routed.cost })
    }

    /// Suggest the next action through the mini tier and store it on the lead.
    pub async fn suggest_action(&self, email: &str) -> Result<SuggestResponse, ToolError> {
        let email = validate_email(email)?.to_string();
        let lead = self.require_lead(&email).await?;

        let prompt = prompts::suggestion_prompt(&lead);
        let routed = self.router.route(OperationKind::Suggestion, &prompt).await;
        let routed = self.bill(OperationKind::Suggestion, Some(&email), routed).await?;

        let suggestion = routed.text.clone();
        let patch = LeadPatch { next_action: Some(suggestion.clone()), ..LeadPatch::default() };
        self.leads.upsert(&email, patch).await.map_err(storage_error)?;

        info!(%email, %suggestion, "next action suggested");
        Ok(SuggestResponse { email, suggestion, ai_cost: routed.cost })
    }

    pub async fn search_leads(&self, query: &str) -> Result<SearchResponse, ToolError> {
        let leads = self.leads.search(query).await.map_err(storage_error)?;
        Ok(SearchResponse { query: query.to_string(), count: leads.len(), leads })
    }

    pub async fn get_billing(
        &self,
        lead_email: Option<String>,
    ) -> Result<BillingResponse, ToolError> {
        let filter = CostFilter { lead_email, ..CostFilter::default() };
        let summary = self.ledger.aggregate(&filter).await.map_err(storage_error)?;

        let flagship_price = price_per_token(ModelTier::Flagship);
        let flagship_only_cost: f64 = summary
            .breakdown
            .iter()
            .map(|row| row.tokens as f64 * flagship_price)
            .sum();
        let actual_cost = summary.total_cost;
        let savings = flagship_only_cost - actual_cost;
        let savings_percent = if flagship_only_cost > 0.0 {
            (savings / flagship_only_cost) * 100.0
        } else {
            0.0
        };

        Ok(BillingResponse {
            summary,
            routing_savings: RoutingSavings {
                actual_cost: summary_round(actual_cost),
                flagship_only_cost: summary_round(flagship_only_cost),
                savings: summary_round(savings),
                savings_percent: summary_round(savings_percent),
            },
        })
    }

    /// Operator sweep: enrich every lead still marked unenriched. Failures
    /// are collected per lead instead of aborting the pass.
    pub async fn enrich_pending(&self) -> Result<EnrichPendingResponse, ToolError> {
        let pending = self.leads.list_unenriched().await.map_err(storage_error)?;

        let mut enriched = Vec::new();
        let mut failed = Vec::new();
        for lead in pending {
            match self.enrich_contact(&lead.email).await {
                Ok(_) => enriched.push(lead.email),
                Err(error) => {
                    error!(email = %lead.email, %error, "batch enrichment failed for lead");
                    failed.push(EnrichFailure { email: lead.email, error: error.class().to_string() });
                }
            }
        }

        Ok(EnrichPendingResponse { enriched, failed })
    }

    async fn require_lead(&self, email: &str) -> Result<Lead, ToolError> {
        self.leads
            .find_by_email(email)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| ToolError::NotFound(email.to_string()))
    }

    /// Persist the bill for a routed call. The entry is written exactly when
    /// the upstream call succeeded, before any further lead mutation, so a
    /// later storage fault can never un-bill a completed generation.
    async fn bill(
        &self,
        operation: OperationKind,
        lead_email: Option<&str>,
        routed: Result<RoutedResponse, UpstreamError>,
    ) -> Result<RoutedResponse, ToolError> {
        let routed = routed.map_err(upstream_error)?;
        let entry = CostEntry::new(
            operation,
            routed.tier,
            routed.tokens,
            routed.cost,
            lead_email.map(str::to_string),
        );
        self.ledger.append(entry).await.map_err(storage_error)?;
        Ok(routed)
    }
}

fn summary_round(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

fn storage_error(error: RepositoryError) -> ToolError {
    ToolError::Storage(error.to_string())
}

fn upstream_error(error: UpstreamError) -> ToolError {
    ToolError::Upstream(error.to_string())
}

// ---------------------------------------------------------------------------
// HTTP surface
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ToolFailureBody {
    error: &'static str,
    message: &'static str,
}

struct ToolFailure(ToolError);

impl IntoResponse for ToolFailure {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ToolError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ToolError::NotFound(_) => StatusCode::NOT_FOUND,
            ToolError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ToolError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        error!(class = self.0.class(), detail = %self.0, "tool invocation failed");
        let body = ToolFailureBody { error: self.0.class(), message: self.0.user_message() };
        (status, Json(body)).into_response()
    }
}

impl From<ToolError> for ToolFailure {
    fn from(error: ToolError) -> Self {
        Self(error)
    }
}

pub fn router(tools: Arc<ToolService>) -> Router {
    Router::new()
        .route("/api/v1/tools/add_lead", post(add_lead))
        .route("/api/v1/tools/enrich_contact", post(enrich_contact))
        .route("/api/v1/tools/draft_cold_email", post(draft_cold_email))
        .route("/api/v1/tools/suggest_action", post(suggest_action))
        .route("/api/v1/tools/enrich_pending", post(enrich_pending))
        .route("/api/v1/tools/search_leads", get(search_leads))
        .route("/api/v1/tools/get_billing", get(get_billing))
        .with_state(tools)
}

async fn add_lead(
    State(tools): State<Arc<ToolService>>,
    Json(request): Json<AddLeadRequest>,
) -> Result<Json<AddLeadResponse>, ToolFailure> {
    Ok(Json(tools.add_lead(request).await?))
}

async fn enrich_contact(
    State(tools): State<Arc<ToolService>>,
    Json(request): Json<LeadEmailRequest>,
) -> Result<Json<EnrichResponse>, ToolFailure> {
    Ok(Json(tools.enrich_contact(&request.email).await?))
}

async fn draft_cold_email(
    State(tools): State<Arc<ToolService>>,
    Json(request): Json<LeadEmailRequest>,
) -> Result<Json<DraftResponse>, ToolFailure> {
    Ok(Json(tools.draft_cold_email(&request.email).await?))
}

async fn suggest_action(
    State(tools): State<Arc<ToolService>>,
    Json(request): Json<LeadEmailRequest>,
) -> Result<Json<SuggestResponse>, ToolFailure> {
    Ok(Json(tools.suggest_action(&request.email).await?))
}

async fn enrich_pending(
    State(tools): State<Arc<ToolService>>,
) -> Result<Json<EnrichPendingResponse>, ToolFailure> {
    Ok(Json(tools.enrich_pending().await?))
}

async fn search_leads(
    State(tools): State<Arc<ToolService>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ToolFailure> {
    Ok(Json(tools.search_leads(&params.query).await?))
}

async fn get_billing(
    State(tools): State<Arc<ToolService>>,
    Query(params): Query<BillingParams>,
) -> Result<Json<BillingResponse>, ToolFailure> {
    Ok(Json(tools.get_billing(params.lead_email).await?))
}
