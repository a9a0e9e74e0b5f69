//! `Authorization: Token <key>` extraction for protected handlers.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use entity::employee;
use platform_api::ApiError;
use platform_authn::session_key_from_header;
use products_crm::access;

use crate::http::AppState;

/// The authenticated employee together with the session key they presented.
#[derive(Clone, Debug)]
pub struct CurrentEmployee {
    pub employee: employee::Model,
    pub key: String,
}

impl FromRequestParts<AppState> for CurrentEmployee {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(current) = parts.extensions.get::<CurrentEmployee>() {
            return Ok(current.clone());
        }

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided."))?;
        let key = session_key_from_header(header)
            .ok_or_else(|| ApiError::unauthorized("Invalid token header."))?;

        let employee = access::authenticate(&state.pool, key).await.inspect_err(|err| {
            tracing::warn!(uri = %parts.uri, error = %err, "authentication failed");
        })?;
        let current = CurrentEmployee {
            employee,
            key: key.to_string(),
        };
        parts.extensions.insert(current.clone());
        Ok(current)
    }
}
