//! Lead scoring through an external service.
//!
//! A lead is reduced to a flat feature record and sent along with three
//! reference leads of known quality. The service answers with a single
//! number in `0..=100`, which is persisted onto the lead.

use std::time::Duration;

use async_trait::async_trait;
use entity::{customer, lead};
use platform_api::{ApiError, ApiResult};
use platform_db::{DbPool, db_error};
use reqwest::Client;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::leads::find_lead;

pub const MAX_SCORE: f64 = 100.0;

/// Scorer input; missing lead attributes become empty strings or zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LeadFeatures {
    pub company_name: String,
    pub industry: String,
    pub employee_count: i64,
    pub budget_estimate: f64,
    pub country: String,
    pub description: String,
}

impl From<&lead::Model> for LeadFeatures {
    fn from(model: &lead::Model) -> Self {
        Self {
            company_name: model.company_name.clone(),
            industry: model.industry.clone().unwrap_or_default(),
            employee_count: model.employee_count.map(i64::from).unwrap_or_default(),
            budget_estimate: model.budget_estimate.unwrap_or_default(),
            country: model.country.clone().unwrap_or_default(),
            description: model.description.clone().unwrap_or_default(),
        }
    }
}

/// A reference lead with the score a human assigned it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoredExample {
    #[serde(flatten)]
    pub features: LeadFeatures,
    pub score: f64,
}

/// One strong, one middling and one weak reference lead.
pub fn reference_examples() -> Vec<ScoredExample> {
    vec![
        ScoredExample {
            features: LeadFeatures {
                company_name: "Nimbus Analytics".into(),
                industry: "Software".into(),
                employee_count: 850,
                budget_estimate: 250_000.0,
                country: "United States".into(),
                description: "Series C data platform replacing its legacy CRM across three sales regions; \
                              budget approved, decision this quarter."
                    .into(),
            },
            score: 92.0,
        },
        ScoredExample {
            features: LeadFeatures {
                company_name: "Harbor Logistics".into(),
                industry: "Transportation".into(),
                employee_count: 120,
                budget_estimate: 40_000.0,
                country: "Germany".into(),
                description: "Regional freight operator evaluating tools for its dispatch team; \
                              timeline not fixed."
                    .into(),
            },
            score: 58.0,
        },
        ScoredExample {
            features: LeadFeatures {
                company_name: "Corner Bakery".into(),
                industry: "Food & Beverage".into(),
                employee_count: 6,
                budget_estimate: 500.0,
                country: "Portugal".into(),
                description: "Single storefront asking about pricing; no stated need.".into(),
            },
            score: 12.0,
        },
    ]
}

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("lead scoring is not configured")]
    NotConfigured,
    #[error("scoring request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("scoring service answered with status {0}")]
    Status(u16),
    #[error("scoring service returned a malformed response: {0}")]
    Malformed(String),
    #[error("scoring service returned out-of-range score {0}")]
    OutOfRange(f64),
}

impl From<ScoringError> for ApiError {
    fn from(err: ScoringError) -> Self {
        ApiError::upstream(err.to_string())
    }
}

#[async_trait]
pub trait LeadScorer: Send + Sync {
    async fn score(&self, lead: &LeadFeatures, examples: &[ScoredExample]) -> Result<f64, ScoringError>;
}

/// Used when no scoring endpoint is configured; every call fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredScorer;

#[async_trait]
impl LeadScorer for UnconfiguredScorer {
    async fn score(&self, _lead: &LeadFeatures, _examples: &[ScoredExample]) -> Result<f64, ScoringError> {
        Err(ScoringError::NotConfigured)
    }
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    lead: &'a LeadFeatures,
    examples: &'a [ScoredExample],
}

#[derive(Deserialize)]
struct ScoreResponse {
    score: serde_json::Value,
}

#[derive(Clone, Debug)]
pub struct HttpLeadScorer {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpLeadScorer {
    pub fn new(endpoint: Url, api_key: Option<String>, timeout: Duration) -> Result<Self, ScoringError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl LeadScorer for HttpLeadScorer {
    async fn score(&self, lead: &LeadFeatures, examples: &[ScoredExample]) -> Result<f64, ScoringError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&ScoreRequest { lead, examples });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScoringError::Status(status.as_u16()));
        }
        let body: ScoreResponse = response
            .json()
            .await
            .map_err(|err| ScoringError::Malformed(err.to_string()))?;
        parse_score(&body.score)
    }
}

/// Accepts a JSON number or numeric string within `0..=100`.
pub fn parse_score(value: &serde_json::Value) -> Result<f64, ScoringError> {
    let score = match value {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| ScoringError::Malformed(format!("score is not a number: {value}")))?;
    if !score.is_finite() || !(0.0..=MAX_SCORE).contains(&score) {
        return Err(ScoringError::OutOfRange(score));
    }
    Ok(score)
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ScoreResult {
    pub score: f64,
}

/// Score a lead and store the result. Converted leads are no longer scored.
#[instrument(skip(db, scorer))]
pub async fn score_lead(db: &DbPool, scorer: &dyn LeadScorer, lead_id: i32) -> ApiResult<ScoreResult> {
    let lead = find_lead(db, lead_id).await?;
    let converted = customer::Entity::find()
        .filter(customer::Column::ConvertedFromLead.eq(lead_id))
        .count(db)
        .await
        .map_err(db_error)?;
    if converted > 0 {
        return Err(ApiError::invalid(
            "lead",
            "This lead has already been converted and can no longer be scored.",
        ));
    }

    let features = LeadFeatures::from(&lead);
    let score = scorer
        .score(&features, &reference_examples())
        .await
        .inspect_err(|err| tracing::warn!(lead_id, error = %err, "lead scoring failed"))?;

    let mut active: lead::ActiveModel = lead.into();
    active.score = Set(score);
    active.update(db).await.map_err(db_error)?;
    tracing::info!(lead_id, score, "lead scored");
    Ok(ScoreResult { score })
}
