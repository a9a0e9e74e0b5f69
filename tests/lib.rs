//! Shared fixtures for the CRM integration tests.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use platform_authn::AuthConfig;
use platform_db::{DatabaseSettings, DbPool, connect_url};
use products_crm::{
    AccessConfig, LeadFeatures, LeadScorer, Mailer, OutgoingMail, ScoredExample, ScoringError,
};

pub const BASE_URL: &str = "http://crm.test";

/// Fresh in-memory database with every migration applied.
pub async fn memory_db() -> Result<DbPool> {
    let pool = connect_url("sqlite::memory:", &DatabaseSettings::default()).await?;
    Migrator::up(&pool, None).await?;
    Ok(pool)
}

pub fn access_config() -> AccessConfig {
    AccessConfig {
        auth: AuthConfig {
            secret: "integration-secret-0123456789abcdef".into(),
            session_ttl_minutes: Some(60),
            reset_ttl_minutes: 30,
        },
        public_base_url: BASE_URL.into(),
        mail_from: "noreply@crm.test".into(),
    }
}

/// Returns a fixed score and remembers what it was asked to score.
#[derive(Clone, Default)]
pub struct StubScorer {
    pub score: f64,
    pub seen: Arc<Mutex<Vec<(LeadFeatures, usize)>>>,
}

impl StubScorer {
    pub fn returning(score: f64) -> Self {
        Self {
            score,
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<(LeadFeatures, usize)> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LeadScorer for StubScorer {
    async fn score(&self, lead: &LeadFeatures, examples: &[ScoredExample]) -> Result<f64, ScoringError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((lead.clone(), examples.len()));
        }
        Ok(self.score)
    }
}

/// Answers every request the way an unreachable scoring service would.
#[derive(Clone, Copy, Default)]
pub struct FailingScorer;

#[async_trait]
impl LeadScorer for FailingScorer {
    async fn score(&self, _lead: &LeadFeatures, _examples: &[ScoredExample]) -> Result<f64, ScoringError> {
        Err(ScoringError::Status(503))
    }
}

/// Keeps every message instead of sending it.
#[derive(Clone, Default)]
pub struct CapturingMailer {
    pub sent: Arc<Mutex<Vec<OutgoingMail>>>,
}

impl CapturingMailer {
    pub fn messages(&self) -> Vec<OutgoingMail> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("mailbox poisoned"))?
            .push(mail);
        Ok(())
    }
}

/// Pull `(uid, token)` out of a reset mail body.
pub fn reset_link_parts(body: &str) -> Option<(String, String)> {
    let marker = "/api/employee/reset-password-confirm/";
    let start = body.find(marker)? + marker.len();
    let mut parts = body[start..].split('/');
    let uid = parts.next()?.to_string();
    let token = parts.next()?.to_string();
    Some((uid, token))
}
