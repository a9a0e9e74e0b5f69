use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use platform_api::{ApiJson, ApiPath, ApiQuery, ApiResult};
use products_crm::{
    WriteMode, conversion,
    conversion::ConvertRequest,
    customers::CustomerView,
    leads::{self, LeadInput, LeadQuery, LeadStatistics, LeadView},
    scoring::{self, ScoreResult},
};
use serde::Deserialize;

use crate::{auth::CurrentEmployee, http::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/leads/", get(list).post(create))
        .route("/leads/statistics/", get(statistics))
        .route("/leads/convert/", post(convert))
        .route(
            "/leads/{id}/",
            get(retrieve).put(replace).patch(patch).delete(destroy),
        )
        .route("/leads/{id}/score/", post(score))
        .route("/leads/{id}/assign/", post(assign))
}

async fn list(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiQuery(params): ApiQuery<LeadQuery>,
) -> ApiResult<Json<Vec<LeadView>>> {
    leads::list_leads(&state.pool, &params).await.map(Json)
}

async fn create(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiJson(input): ApiJson<LeadInput>,
) -> ApiResult<(StatusCode, Json<LeadView>)> {
    let lead = leads::create_lead(&state.pool, input).await?;
    Ok((StatusCode::CREATED, Json(lead)))
}

async fn retrieve(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<Json<LeadView>> {
    leads::get_lead(&state.pool, id).await.map(Json)
}

async fn replace(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
    ApiJson(input): ApiJson<LeadInput>,
) -> ApiResult<Json<LeadView>> {
    leads::update_lead(&state.pool, id, input, WriteMode::Replace)
        .await
        .map(Json)
}

async fn patch(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
    ApiJson(input): ApiJson<LeadInput>,
) -> ApiResult<Json<LeadView>> {
    leads::update_lead(&state.pool, id, input, WriteMode::Patch)
        .await
        .map(Json)
}

async fn destroy(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<StatusCode> {
    leads::delete_lead(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn statistics(
    State(state): State<AppState>,
    _: CurrentEmployee,
) -> ApiResult<Json<LeadStatistics>> {
    leads::lead_statistics(&state.pool).await.map(Json)
}

async fn score(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<Json<ScoreResult>> {
    scoring::score_lead(&state.pool, state.scorer.as_ref(), id)
        .await
        .map(Json)
}

#[derive(Debug, Deserialize)]
struct AssignRequest {
    employee_id: Option<i32>,
}

async fn assign(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
    ApiJson(body): ApiJson<AssignRequest>,
) -> ApiResult<Json<LeadView>> {
    leads::assign_lead(&state.pool, id, body.employee_id)
        .await
        .map(Json)
}

async fn convert(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiJson(body): ApiJson<ConvertRequest>,
) -> ApiResult<(StatusCode, Json<CustomerView>)> {
    let customer = conversion::convert_lead(&state.pool, body.lead_id()?).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}
