//! sieve-api - HTTP API server for the invoice anomaly sieve.

mod auth;
mod handlers;

use std::sync::Arc;

use axum::http::Request;
use axum::routing::{get, post};
use axum::Router;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use sieve_core::Settings;
use sieve_db::Database;
use sieve_engine::{dup_model, ScoringPipeline};

use handlers::{get_decision, healthz, score_invoice};

/// Generates time-ordered UUIDv7 request correlation IDs, returned to the
/// caller as `trace_id` and propagated through the log context.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Application state shared across handlers. Everything here is read-only
/// after startup; reloading the model or settings means restarting.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db: Arc<Database>,
    pub pipeline: Arc<ScoringPipeline>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Arc::new(Settings::from_env());
    info!(
        subsystem = "api",
        component = "main",
        op = "startup",
        tenant_id = %settings.tenant_id,
        bind_addr = %settings.bind_addr,
        "Starting invoice sieve"
    );

    let db = Arc::new(Database::connect(&settings.database_url, &settings.tenant_id).await?);
    db.migrate().await?;

    let scorer = dup_model::load_scorer(&settings.dup_model_path);
    let text_index = Arc::new(db.text_index());
    let pipeline = Arc::new(ScoringPipeline::new(
        Arc::clone(&db),
        text_index,
        scorer,
        settings.feature_concurrency,
    ));

    let state = AppState {
        settings: Arc::clone(&settings),
        db,
        pipeline,
    };

    let app = Router::new()
        .route("/scoreInvoice", post(score_invoice))
        .route("/invoice/:invoice_id/decision", get(get_decision))
        .route("/healthz", get(healthz))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!(
        subsystem = "api",
        component = "main",
        op = "listening",
        addr = %settings.bind_addr,
        "API server listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}
