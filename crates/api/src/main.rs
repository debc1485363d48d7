use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use sentitrade_core::agent::{AgentRunSummary, RecommendationEngine};
use sentitrade_core::analysis::SentimentPassSummary;
use sentitrade_core::config::Settings;
use sentitrade_core::domain::order::{Order, OrderDecision, OrderStatus};
use sentitrade_core::domain::portfolio::{summarize, HoldingView, PortfolioSummary};
use sentitrade_core::domain::risk::RiskTier;
use sentitrade_core::llm::LlmClient;
use sentitrade_core::storage;
use sentitrade_core::storage::orders::DecisionOutcome;
use sentitrade_core::storage::sentiment_logs::SentimentLogEntry;
use sentitrade_core::storage::stocks::Stock;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let llm = match sentitrade_core::llm::client_from_settings(&settings) {
        Ok(client) => {
            tracing::info!(provider = client.provider().as_str(), "LLM client configured");
            Some(client)
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM client unavailable; LLM-backed routes disabled");
            None
        }
    };

    let state = AppState {
        pool,
        llm,
        settings: Arc::new(settings),
    };

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/stocks", get(list_stocks))
        .route("/sentiment", get(list_sentiment))
        .route("/sentiment/analyze", post(analyze_sentiment))
        .route("/advisor/chat", post(advisor_chat))
        .route(
            "/users/:user_id/portfolio",
            get(get_portfolio).post(upsert_holding),
        )
        .route(
            "/users/:user_id/portfolio/:holding_id",
            delete(remove_holding),
        )
        .route("/users/:user_id/dashboard", get(get_dashboard))
        .route("/users/:user_id/risk", get(get_risk).put(put_risk))
        .route("/users/:user_id/agent/run", post(run_agent))
        .route("/users/:user_id/orders", get(list_orders))
        .route(
            "/users/:user_id/orders/:order_id/approve",
            post(approve_order),
        )
        .route("/users/:user_id/orders/:order_id/reject", post(reject_order))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    pool: Option<PgPool>,
    llm: Option<Arc<dyn LlmClient>>,
    settings: Arc<Settings>,
}

impl AppState {
    fn pool(&self) -> Result<&PgPool, StatusCode> {
        self.pool.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)
    }

    fn llm(&self) -> Result<&dyn LlmClient, StatusCode> {
        self.llm.as_deref().ok_or(StatusCode::SERVICE_UNAVAILABLE)
    }
}

fn internal(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    tracing::error!(error = %e, "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

fn upstream(e: anyhow::Error) -> StatusCode {
    if sentitrade_core::llm::error::is_rate_limited(&e) {
        tracing::warn!(error = %e, "LLM provider rate limited");
        return StatusCode::TOO_MANY_REQUESTS;
    }
    internal(e)
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<i64>,
    status: Option<OrderStatus>,
}

impl ListParams {
    fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

async fn list_stocks(State(state): State<AppState>) -> Result<Json<Vec<Stock>>, StatusCode> {
    let pool = state.pool()?;
    let stocks = storage::stocks::list_stocks(pool).await.map_err(internal)?;
    Ok(Json(stocks))
}

async fn list_sentiment(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<SentimentLogEntry>>, StatusCode> {
    let pool = state.pool()?;
    let entries = storage::sentiment_logs::list_recent(pool, params.limit())
        .await
        .map_err(internal)?;
    Ok(Json(entries))
}

async fn analyze_sentiment(
    State(state): State<AppState>,
) -> Result<Json<SentimentPassSummary>, StatusCode> {
    let pool = state.pool()?;
    let llm = state.llm()?;
    let summary = sentitrade_core::analysis::run_sentiment_pass(
        pool,
        llm,
        state.settings.sentiment_sample_size,
        false,
    )
    .await
    .map_err(internal)?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    #[serde(default)]
    messages: Vec<sentitrade_core::advisor::IncomingMessage>,
}

#[derive(Debug, Serialize)]
struct ChatReply {
    content: String,
}

async fn advisor_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatReply>, StatusCode> {
    let llm = state.llm()?;
    let content = sentitrade_core::advisor::chat(llm, body.messages)
        .await
        .map_err(upstream)?;
    Ok(Json(ChatReply { content }))
}

async fn get_portfolio(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<HoldingView>>, StatusCode> {
    let pool = state.pool()?;
    let holdings = sentitrade_core::agent::load_holdings_with_sentiment(
        pool,
        user_id,
        state.settings.sentiment_window,
    )
    .await
    .map_err(internal)?;
    Ok(Json(holdings))
}

#[derive(Debug, Deserialize)]
struct UpsertHolding {
    stock_id: Uuid,
    quantity: i32,
}

#[derive(Debug, Serialize)]
struct HoldingCreated {
    holding_id: Uuid,
}

async fn upsert_holding(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(body): Json<UpsertHolding>,
) -> Result<Json<HoldingCreated>, StatusCode> {
    if body.quantity <= 0 {
        return Err(StatusCode::BAD_REQUEST);
    }
    let pool = state.pool()?;
    let holding_id = storage::portfolios::upsert_holding(pool, user_id, body.stock_id, body.quantity)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;
    tracing::info!(%user_id, stock_id = %body.stock_id, quantity = body.quantity, "holding upserted");
    Ok(Json(HoldingCreated { holding_id }))
}

async fn remove_holding(
    State(state): State<AppState>,
    Path((user_id, holding_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, StatusCode> {
    let pool = state.pool()?;
    let removed = storage::portfolios::remove_holding(pool, user_id, holding_id)
        .await
        .map_err(internal)?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn get_dashboard(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<PortfolioSummary>, StatusCode> {
    let pool = state.pool()?;
    let holdings = sentitrade_core::agent::load_holdings_with_sentiment(
        pool,
        user_id,
        state.settings.sentiment_window,
    )
    .await
    .map_err(internal)?;
    Ok(Json(summarize(&holdings)))
}

#[derive(Debug, Serialize, Deserialize)]
struct RiskBody {
    risk_level: RiskTier,
}

async fn get_risk(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<RiskBody>, StatusCode> {
    let pool = state.pool()?;
    let risk_level = storage::risk_settings::get_risk_tier(pool, user_id)
        .await
        .map_err(internal)?;
    Ok(Json(RiskBody { risk_level }))
}

async fn put_risk(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(body): Json<RiskBody>,
) -> Result<Json<RiskBody>, StatusCode> {
    let pool = state.pool()?;
    storage::risk_settings::set_risk_tier(pool, user_id, body.risk_level)
        .await
        .map_err(internal)?;
    tracing::info!(%user_id, risk_level = %body.risk_level, "risk tier updated");
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
struct AgentRunBody {
    #[serde(default)]
    engine: Option<String>,
}

async fn run_agent(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<AgentRunSummary>, StatusCode> {
    let engine = match requested_engine(&body)? {
        Some(engine) => engine,
        None => default_engine(&state.settings)?,
    };
    if engine == RecommendationEngine::Llm {
        state.llm()?;
    }
    let pool = state.pool()?;

    let summary = sentitrade_core::agent::run_trading_agent(
        pool,
        state.llm.as_deref(),
        user_id,
        engine,
        state.settings.sentiment_window,
        false,
    )
    .await
    .map_err(upstream)?;
    Ok(Json(summary))
}

/// An empty body means "use the configured default"; anything else must name a known engine.
fn requested_engine(body: &[u8]) -> Result<Option<RecommendationEngine>, StatusCode> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let body: AgentRunBody = serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "malformed agent run body");
        StatusCode::UNPROCESSABLE_ENTITY
    })?;
    body.engine
        .map(|name| name.parse::<RecommendationEngine>())
        .transpose()
        .map_err(|e| {
            tracing::warn!(error = %e, "unknown engine in agent run body");
            StatusCode::UNPROCESSABLE_ENTITY
        })
}

fn default_engine(settings: &Settings) -> Result<RecommendationEngine, StatusCode> {
    match settings.recommendation_engine.as_deref() {
        None => Ok(RecommendationEngine::default()),
        Some(s) => s.parse().map_err(|e| {
            tracing::error!(error = %e, "invalid RECOMMENDATION_ENGINE");
            StatusCode::INTERNAL_SERVER_ERROR
        }),
    }
}

async fn list_orders(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Order>>, StatusCode> {
    let pool = state.pool()?;
    let orders = storage::orders::list_orders(pool, user_id, params.status, params.limit())
        .await
        .map_err(internal)?;
    Ok(Json(orders))
}

#[derive(Debug, Serialize)]
struct OrderDecided {
    order_id: Uuid,
    status: OrderStatus,
}

async fn approve_order(
    state: State<AppState>,
    path: Path<(Uuid, Uuid)>,
) -> Result<Json<OrderDecided>, StatusCode> {
    decide_order(state, path, OrderDecision::Approve).await
}

async fn reject_order(
    state: State<AppState>,
    path: Path<(Uuid, Uuid)>,
) -> Result<Json<OrderDecided>, StatusCode> {
    decide_order(state, path, OrderDecision::Reject).await
}

async fn decide_order(
    State(state): State<AppState>,
    Path((user_id, order_id)): Path<(Uuid, Uuid)>,
    decision: OrderDecision,
) -> Result<Json<OrderDecided>, StatusCode> {
    let pool = state.pool()?;
    match storage::orders::decide(pool, user_id, order_id, decision)
        .await
        .map_err(internal)?
    {
        DecisionOutcome::Updated(status) => {
            tracing::info!(%user_id, %order_id, %status, "order decided");
            Ok(Json(OrderDecided { order_id, status }))
        }
        DecisionOutcome::NotFound => Err(StatusCode::NOT_FOUND),
        DecisionOutcome::AlreadyDecided(_) => Err(StatusCode::CONFLICT),
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
