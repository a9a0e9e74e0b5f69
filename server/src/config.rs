use std::{str::FromStr, sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use platform_authn::AuthConfig;
use products_crm::{AccessConfig, HttpLeadScorer, LeadScorer, UnconfiguredScorer};
use url::Url;

const MIN_SECRET_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct ScoringConfig {
    pub url: Url,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub cors_allowed_origins: Vec<String>,
    pub auth_secret: String,
    /// `0` disables expiry.
    pub token_ttl_minutes: i64,
    pub reset_token_ttl_minutes: i64,
    pub public_base_url: String,
    pub mail_from: String,
    pub scoring: Option<ScoringConfig>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let auth_secret = std::env::var("AUTH_SECRET").context("AUTH_SECRET missing")?;
        if auth_secret.trim().len() < MIN_SECRET_LEN {
            return Err(anyhow!("AUTH_SECRET must be at least {MIN_SECRET_LEN} characters"));
        }

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .filter_map(|s| {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect::<Vec<_>>();

        let token_ttl_minutes = env_parse("TOKEN_TTL_MINUTES", 10_080)?;
        let reset_token_ttl_minutes = env_parse("RESET_TOKEN_TTL_MINUTES", 4_320)?;
        if reset_token_ttl_minutes <= 0 {
            return Err(anyhow!("RESET_TOKEN_TTL_MINUTES must be positive"));
        }

        let public_base_url = env_or("PUBLIC_BASE_URL", "http://127.0.0.1:8000");
        Url::parse(&public_base_url).context("invalid PUBLIC_BASE_URL")?;
        let mail_from = env_or("MAIL_FROM", "noreply@example.com");

        let scoring = match std::env::var("SCORING_API_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
        {
            Some(raw) => Some(ScoringConfig {
                url: Url::parse(raw.trim()).context("invalid SCORING_API_URL")?,
                api_key: std::env::var("SCORING_API_KEY")
                    .ok()
                    .filter(|value| !value.trim().is_empty()),
                timeout: Duration::from_secs(env_parse("SCORING_TIMEOUT_SECS", 30)?),
            }),
            None => None,
        };

        Ok(Self {
            cors_allowed_origins,
            auth_secret,
            token_ttl_minutes,
            reset_token_ttl_minutes,
            public_base_url,
            mail_from,
            scoring,
        })
    }

    pub fn access(&self) -> AccessConfig {
        AccessConfig {
            auth: AuthConfig {
                secret: self.auth_secret.clone(),
                session_ttl_minutes: Some(self.token_ttl_minutes),
                reset_ttl_minutes: self.reset_token_ttl_minutes,
            },
            public_base_url: self.public_base_url.clone(),
            mail_from: self.mail_from.clone(),
        }
    }

    pub fn scorer(&self) -> Result<Arc<dyn LeadScorer>> {
        match &self.scoring {
            Some(scoring) => {
                let scorer = HttpLeadScorer::new(
                    scoring.url.clone(),
                    scoring.api_key.clone(),
                    scoring.timeout,
                )?;
                Ok(Arc::new(scorer))
            }
            None => {
                tracing::warn!("SCORING_API_URL not set; lead scoring requests will fail");
                Ok(Arc::new(UnconfiguredScorer))
            }
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|err| anyhow!("invalid {key}: {err}")),
        _ => Ok(default),
    }
}
