use axum::{Json, Router, extract::State, routing::get};
use platform_api::{ApiJson, ApiResult};
use products_crm::settings::{self, SettingsInput, SettingsView};

use crate::{auth::CurrentEmployee, http::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/settings/", get(retrieve).put(update))
}

/// Public: the login page needs the branding before anyone signs in.
async fn retrieve(State(state): State<AppState>) -> ApiResult<Json<SettingsView>> {
    settings::get_settings(&state.pool).await.map(Json)
}

async fn update(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiJson(input): ApiJson<SettingsInput>,
) -> ApiResult<Json<SettingsView>> {
    settings::update_settings(&state.pool, input).await.map(Json)
}
