use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use platform_api::{ApiJson, ApiPath, ApiQuery, ApiResult};
use products_crm::{
    WriteMode,
    customers::{self, CustomerInput, CustomerQuery, CustomerView},
};

use crate::{auth::CurrentEmployee, http::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/customers/", get(list).post(create))
        .route(
            "/customers/{id}/",
            get(retrieve).put(replace).patch(patch).delete(destroy),
        )
}

async fn list(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiQuery(params): ApiQuery<CustomerQuery>,
) -> ApiResult<Json<Vec<CustomerView>>> {
    customers::list_customers(&state.pool, &params).await.map(Json)
}

async fn create(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiJson(input): ApiJson<CustomerInput>,
) -> ApiResult<(StatusCode, Json<CustomerView>)> {
    let customer = customers::create_customer(&state.pool, input).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

async fn retrieve(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<Json<CustomerView>> {
    customers::get_customer(&state.pool, id).await.map(Json)
}

async fn replace(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
    ApiJson(input): ApiJson<CustomerInput>,
) -> ApiResult<Json<CustomerView>> {
    customers::update_customer(&state.pool, id, input, WriteMode::Replace)
        .await
        .map(Json)
}

async fn patch(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
    ApiJson(input): ApiJson<CustomerInput>,
) -> ApiResult<Json<CustomerView>> {
    customers::update_customer(&state.pool, id, input, WriteMode::Patch)
        .await
        .map(Json)
}

async fn destroy(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<StatusCode> {
    customers::delete_customer(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
