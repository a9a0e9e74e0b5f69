//! REST surface mounted under `/api`.

mod customers;
mod employees;
mod invoices;
mod leads;
mod settings;

use axum::Router;

use crate::http::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(leads::router())
        .merge(customers::router())
        .merge(employees::router())
        .merge(invoices::router())
        .merge(settings::router())
}
