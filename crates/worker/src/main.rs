use anyhow::Context;
use clap::{Parser, Subcommand};
use sentitrade_core::agent::RecommendationEngine;
use sentitrade_core::config::Settings;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "sentitrade_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record fresh LLM-generated sentiment readings for a random sample of stocks.
    AnalyzeSentiment {
        /// Stocks to sample. Defaults to SENTIMENT_SAMPLE_SIZE.
        #[arg(long)]
        sample: Option<usize>,

        /// Log the readings instead of writing them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Draft pending orders for one user's holdings.
    RunAgent {
        #[arg(long)]
        user_id: Uuid,

        /// `rules` or `llm`. Defaults to RECOMMENDATION_ENGINE, then `rules`.
        #[arg(long)]
        engine: Option<String>,

        /// Log the drafts instead of writing them.
        #[arg(long)]
        dry_run: bool,
    },
}

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

    let args = Args::parse();

    let result = run(&settings, args.command).await;
    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %err, "worker run failed");
    }
    result
}

async fn run(settings: &Settings, command: Command) -> anyhow::Result<()> {
    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    sentitrade_core::storage::migrate(&pool).await?;

    match command {
        Command::AnalyzeSentiment { sample, dry_run } => {
            let llm = sentitrade_core::llm::client_from_settings(settings)?;
            let sample = sample.unwrap_or(settings.sentiment_sample_size);
            anyhow::ensure!(sample >= 1, "--sample must be >= 1");

            let summary =
                sentitrade_core::analysis::run_sentiment_pass(&pool, llm.as_ref(), sample, dry_run)
                    .await?;
            tracing::info!(
                sampled = summary.sampled,
                analyzed = summary.analyzed,
                readings = summary.readings,
                dry_run,
                "sentiment pass complete"
            );
        }
        Command::RunAgent {
            user_id,
            engine,
            dry_run,
        } => {
            let engine = resolve_engine(engine.as_deref(), settings)?;
            let llm = match engine {
                RecommendationEngine::Llm => {
                    Some(sentitrade_core::llm::client_from_settings(settings)?)
                }
                RecommendationEngine::Rules => None,
            };

            let summary = sentitrade_core::agent::run_trading_agent(
                &pool,
                llm.as_deref(),
                user_id,
                engine,
                settings.sentiment_window,
                dry_run,
            )
            .await?;
            tracing::info!(
                %user_id,
                %engine,
                risk_tier = %summary.risk_tier,
                orders_created = summary.orders_created,
                message = summary.message.as_deref().unwrap_or(""),
                dry_run,
                "agent run complete"
            );
        }
    }

    Ok(())
}

fn resolve_engine(arg: Option<&str>, settings: &Settings) -> anyhow::Result<RecommendationEngine> {
    match arg.or(settings.recommendation_engine.as_deref()) {
        Some(s) => Ok(s.parse::<RecommendationEngine>()?),
        None => Ok(RecommendationEngine::default()),
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(engine: Option<&str>) -> Settings {
        Settings {
            database_url: None,
            llm_provider: None,
            llm_api_key: None,
            llm_base_url: "http://localhost:1".to_string(),
            llm_model: "test".to_string(),
            anthropic_api_key: None,
            sentry_dsn: None,
            recommendation_engine: engine.map(str::to_string),
            sentiment_sample_size: 5,
            sentiment_window: 10,
        }
    }

    #[test]
    fn parses_run_agent_flags() {
        let user = Uuid::new_v4().to_string();
        let args = Args::try_parse_from([
            "sentitrade_worker",
            "run-agent",
            "--user-id",
            user.as_str(),
            "--engine",
            "llm",
            "--dry-run",
        ])
        .unwrap();
        match args.command {
            Command::RunAgent {
                engine, dry_run, ..
            } => {
                assert_eq!(engine.as_deref(), Some("llm"));
                assert!(dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_user_id() {
        assert!(Args::try_parse_from(["sentitrade_worker", "run-agent", "--user-id", "bob"]).is_err());
    }

    #[test]
    fn engine_flag_overrides_env_default() {
        let s = settings(Some("llm"));
        assert_eq!(resolve_engine(None, &s).unwrap(), RecommendationEngine::Llm);
        assert_eq!(
            resolve_engine(Some("rules"), &s).unwrap(),
            RecommendationEngine::Rules
        );
        assert_eq!(
            resolve_engine(None, &settings(None)).unwrap(),
            RecommendationEngine::Rules
        );
        assert!(resolve_engine(Some("magic"), &s).is_err());
    }
}
