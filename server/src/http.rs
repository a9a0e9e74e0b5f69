use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::{self, HeaderName, HeaderValue, Method},
    response::IntoResponse,
    routing::get,
};
use platform_db::DbPool;
use products_crm::{AccessConfig, LeadScorer, Mailer};
use sea_orm::{ConnectionTrait, Statement};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::rest;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub access: Arc<AccessConfig>,
    pub scorer: Arc<dyn LeadScorer>,
    pub mailer: Arc<dyn Mailer>,
    pub cors_allowed_origins: Arc<[String]>,
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(%config.addr, "sales crm listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let layer = CorsLayer::new()
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ]);
    // Credentials cannot be combined with a wildcard origin.
    if allowed.is_empty() {
        layer.allow_origin(AllowOrigin::any())
    } else {
        layer
            .allow_credentials(true)
            .allow_origin(AllowOrigin::list(allowed))
    }
}

pub fn build_router(state: AppState) -> Router {
    let request_id = MakeRequestUuid;
    let header_name = HeaderName::from_static("x-request-id");
    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", rest::router())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), request_id))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.cors_allowed_origins)),
        )
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let backend = state.pool.get_database_backend();
    let db_ok = state
        .pool
        .execute(Statement::from_string(backend, "SELECT 1".to_string()))
        .await
        .is_ok();
    Json(HealthResponse {
        ok: db_ok,
        db_ok,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    db_ok: bool,
    version: &'static str,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for CTRL+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use migration::{Migrator, MigratorTrait};
    use platform_authn::AuthConfig;
    use platform_db::{DatabaseSettings, connect_url};
    use products_crm::{
        AccessConfig, LeadFeatures, LeadScorer, LogMailer, ScoredExample, ScoringError,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    struct FixedScorer(f64);

    #[async_trait]
    impl LeadScorer for FixedScorer {
        async fn score(
            &self,
            _lead: &LeadFeatures,
            _examples: &[ScoredExample],
        ) -> Result<f64, ScoringError> {
            Ok(self.0)
        }
    }

    async fn app() -> Router {
        let pool = connect_url("sqlite::memory:", &DatabaseSettings::default())
            .await
            .expect("sqlite");
        Migrator::up(&pool, None).await.expect("migrations");
        build_router(AppState {
            pool,
            access: Arc::new(AccessConfig {
                auth: AuthConfig {
                    secret: "test-secret-with-at-least-32-characters".into(),
                    session_ttl_minutes: None,
                    reset_ttl_minutes: 60,
                },
                public_base_url: "http://crm.test".into(),
                mail_from: "noreply@crm.test".into(),
            }),
            scorer: Arc::new(FixedScorer(73.5)),
            mailer: Arc::new(LogMailer),
            cors_allowed_origins: Arc::from(Vec::<String>::new()),
        })
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("authorization", format!("Token {token}"));
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    async fn register(app: &Router) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/employee/register/",
            None,
            Some(json!({
                "username": "dana",
                "email": "dana@crm.test",
                "password": "correct-horse-42",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["token"].as_str().expect("token").to_string()
    }

    #[tokio::test]
    async fn health_reports_database() {
        let app = app().await;
        let (status, body) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["db_ok"], json!(true));
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let app = app().await;
        let (status, body) = send(&app, "GET", "/api/leads/", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], json!("UNAUTHORIZED"));

        let (status, _) = send(&app, "GET", "/api/leads/", Some("bogus"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn lead_lifecycle_over_http() {
        let app = app().await;
        let token = register(&app).await;
        let lead = json!({"company_name": "Acme", "email": "Sales@Acme.test", "industry": "Retail"});

        let (status, created) = send(&app, "POST", "/api/leads/", Some(&token), Some(lead.clone())).await;
        assert_eq!(status, StatusCode::CREATED, "{created}");
        assert_eq!(created["email"], json!("sales@acme.test"));
        assert_eq!(created["status"], json!("New"));
        let id = created["id"].as_i64().expect("id");

        let (status, body) = send(&app, "POST", "/api/leads/", Some(&token), Some(lead)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!("CONFLICT"));

        let (status, scored) =
            send(&app, "POST", &format!("/api/leads/{id}/score/"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK, "{scored}");
        assert_eq!(scored["score"], json!(73.5));

        let (status, customer) = send(
            &app,
            "POST",
            "/api/leads/convert/",
            Some(&token),
            Some(json!({"lead_id": id})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{customer}");
        assert_eq!(customer["company_name"], json!("Acme"));
        assert_eq!(customer["converted_from_lead"], json!(id));

        let (status, body) = send(
            &app,
            "POST",
            "/api/leads/convert/",
            Some(&token),
            Some(json!({"lead_id": id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!("CONFLICT"));

        let (status, stats) = send(&app, "GET", "/api/leads/statistics/", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["total_leads"], json!(1));
        assert_eq!(stats["total_customers"], json!(1));
    }

    #[tokio::test]
    async fn unknown_lead_is_not_found() {
        let app = app().await;
        let token = register(&app).await;
        let (status, body) = send(&app, "GET", "/api/leads/999/", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], json!("NOT_FOUND"));

        let (status, _) = send(&app, "GET", "/api/leads/abc/", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invoice_totals_follow_items() {
        let app = app().await;
        let token = register(&app).await;
        let (_, customer) = send(
            &app,
            "POST",
            "/api/customers/",
            Some(&token),
            Some(json!({"company_name": "Northwind", "email": "billing@northwind.test"})),
        )
        .await;

        let (status, invoice) = send(
            &app,
            "POST",
            "/api/invoices/",
            Some(&token),
            Some(json!({
                "invoice_number": "INV-1",
                "customer": customer["id"],
                "items": [
                    {"description": "Widget", "quantity": 2, "unit_price": "10.00"},
                    {"description": "Setup", "quantity": 1, "unit_price": 5},
                ],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{invoice}");
        assert_eq!(invoice["total_amount"], json!("25.00"));
        assert_eq!(invoice["items"][0]["total"], json!("20.00"));
        assert_eq!(invoice["items"][1]["total"], json!("5.00"));
        assert_eq!(invoice["status"], json!("DRAFT"));

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/api/invoices/{}/", invoice["id"]),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn settings_are_public_to_read() {
        let app = app().await;
        let (status, body) = send(&app, "GET", "/api/settings/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["colors"]["primary"], json!("#4f46e5"));

        let (status, _) = send(
            &app,
            "PUT",
            "/api/settings/",
            None,
            Some(json!({"colors": {"primary": "#000000"}})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_invalidates_the_session() {
        let app = app().await;
        let token = register(&app).await;
        let (status, _) = send(&app, "POST", "/api/employee/logout/", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "GET", "/api/employees/", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(
            &app,
            "POST",
            "/api/employee/login/",
            None,
            Some(json!({"username": "dana", "password": "correct-horse-42"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["is_superuser"], json!(true));
    }
}
