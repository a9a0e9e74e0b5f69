use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use platform_api::{ApiJson, ApiPath, ApiQuery, ApiResult};
use products_crm::{
    WriteMode,
    invoices::{self, InvoiceInput, InvoiceQuery, InvoiceView},
};

use crate::{auth::CurrentEmployee, http::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/invoices/", get(list).post(create))
        .route(
            "/invoices/{id}/",
            get(retrieve).put(replace).patch(patch).delete(destroy),
        )
}

async fn list(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiQuery(params): ApiQuery<InvoiceQuery>,
) -> ApiResult<Json<Vec<InvoiceView>>> {
    invoices::list_invoices(&state.pool, &params).await.map(Json)
}

async fn create(
    State(state): State<AppState>,
    current: CurrentEmployee,
    ApiJson(input): ApiJson<InvoiceInput>,
) -> ApiResult<(StatusCode, Json<InvoiceView>)> {
    let invoice = invoices::create_invoice(&state.pool, input, Some(current.employee.id)).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

async fn retrieve(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<Json<InvoiceView>> {
    invoices::get_invoice(&state.pool, id).await.map(Json)
}

async fn replace(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
    ApiJson(input): ApiJson<InvoiceInput>,
) -> ApiResult<Json<InvoiceView>> {
    invoices::update_invoice(&state.pool, id, input, WriteMode::Replace)
        .await
        .map(Json)
}

async fn patch(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
    ApiJson(input): ApiJson<InvoiceInput>,
) -> ApiResult<Json<InvoiceView>> {
    invoices::update_invoice(&state.pool, id, input, WriteMode::Patch)
        .await
        .map(Json)
}

async fn destroy(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<StatusCode> {
    invoices::delete_invoice(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
