//! `/employee/*` account routes and the `/employees/` directory.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use platform_api::{ApiJson, ApiPath, ApiQuery, ApiResult};
use products_crm::{
    WriteMode,
    access::{
        self, ChangePasswordInput, LoginInput, LoginPayload, RegisterInput, ResetConfirm,
        ResetRequest, TokenPayload,
    },
    employees::{self, EmployeeInput, EmployeeQuery, EmployeeView},
};
use serde::Serialize;

use crate::{auth::CurrentEmployee, http::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/employee/register/", post(register))
        .route("/employee/login/", post(login))
        .route("/employee/logout/", post(logout))
        .route("/employee/reset-password/", post(reset_password))
        .route(
            "/employee/reset-password-confirm/{uid}/{token}/",
            post(reset_password_confirm),
        )
        .route("/employee/change-password/", post(change_password))
        .route("/employees/", get(list).post(create))
        .route(
            "/employees/{id}/",
            get(retrieve).put(replace).patch(patch).delete(destroy),
        )
}

#[derive(Serialize)]
struct Detail {
    detail: &'static str,
}

async fn register(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<RegisterInput>,
) -> ApiResult<(StatusCode, Json<TokenPayload>)> {
    let token = access::register(&state.pool, &state.access, input).await?;
    Ok((StatusCode::CREATED, Json(token)))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<LoginInput>,
) -> ApiResult<Json<LoginPayload>> {
    access::login(&state.pool, &state.access, input).await.map(Json)
}

async fn logout(State(state): State<AppState>, current: CurrentEmployee) -> ApiResult<Json<Detail>> {
    access::logout(&state.pool, &current.key).await?;
    Ok(Json(Detail {
        detail: "Successfully logged out.",
    }))
}

async fn reset_password(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<ResetRequest>,
) -> ApiResult<Json<Detail>> {
    access::request_password_reset(&state.pool, &state.access, state.mailer.as_ref(), input)
        .await?;
    Ok(Json(Detail {
        detail: "Password reset e-mail has been sent.",
    }))
}

async fn reset_password_confirm(
    State(state): State<AppState>,
    ApiPath((uid, token)): ApiPath<(String, String)>,
    ApiJson(input): ApiJson<ResetConfirm>,
) -> ApiResult<Json<Detail>> {
    access::confirm_password_reset(&state.pool, &state.access, &uid, &token, input).await?;
    Ok(Json(Detail {
        detail: "Password has been reset with the new password.",
    }))
}

async fn change_password(
    State(state): State<AppState>,
    current: CurrentEmployee,
    ApiJson(input): ApiJson<ChangePasswordInput>,
) -> ApiResult<Json<Detail>> {
    access::change_password(&state.pool, &current.employee, input).await?;
    Ok(Json(Detail {
        detail: "Password updated successfully.",
    }))
}

async fn list(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiQuery(params): ApiQuery<EmployeeQuery>,
) -> ApiResult<Json<Vec<EmployeeView>>> {
    employees::list_employees(&state.pool, &params).await.map(Json)
}

async fn create(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiJson(input): ApiJson<EmployeeInput>,
) -> ApiResult<(StatusCode, Json<EmployeeView>)> {
    let employee = employees::create_employee(&state.pool, input).await?;
    Ok((StatusCode::CREATED, Json(employee)))
}

async fn retrieve(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<Json<EmployeeView>> {
    employees::get_employee(&state.pool, id).await.map(Json)
}

async fn replace(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
    ApiJson(input): ApiJson<EmployeeInput>,
) -> ApiResult<Json<EmployeeView>> {
    employees::update_employee(&state.pool, id, input, WriteMode::Replace)
        .await
        .map(Json)
}

async fn patch(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
    ApiJson(input): ApiJson<EmployeeInput>,
) -> ApiResult<Json<EmployeeView>> {
    employees::update_employee(&state.pool, id, input, WriteMode::Patch)
        .await
        .map(Json)
}

async fn destroy(
    State(state): State<AppState>,
    _: CurrentEmployee,
    ApiPath(id): ApiPath<i32>,
) -> ApiResult<StatusCode> {
    employees::delete_employee(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
