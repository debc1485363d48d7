pub mod advisor;
pub mod agent;
pub mod analysis;
pub mod domain;
pub mod error;
pub mod llm;
pub mod storage;

pub mod config {
    use anyhow::Context;

    const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
    const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
    const DEFAULT_SENTIMENT_SAMPLE_SIZE: usize = 5;
    const DEFAULT_SENTIMENT_WINDOW: usize = 10;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub llm_provider: Option<String>,
        pub llm_api_key: Option<String>,
        pub llm_base_url: String,
        pub llm_model: String,
        pub anthropic_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub recommendation_engine: Option<String>,
        /// Stocks sampled per sentiment pass.
        pub sentiment_sample_size: usize,
        /// Most recent readings per stock fed to the aggregator.
        pub sentiment_window: usize,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                llm_provider: std::env::var("LLM_PROVIDER").ok(),
                llm_api_key: std::env::var("REAL_LLM_API_KEY").ok(),
                llm_base_url: std::env::var("REAL_LLM_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_LLM_BASE_URL.to_string()),
                llm_model: std::env::var("REAL_LLM_MODEL")
                    .unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string()),
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                recommendation_engine: std::env::var("RECOMMENDATION_ENGINE").ok(),
                sentiment_sample_size: parse_env_or(
                    "SENTIMENT_SAMPLE_SIZE",
                    DEFAULT_SENTIMENT_SAMPLE_SIZE,
                )?,
                sentiment_window: parse_env_or("SENTIMENT_WINDOW", DEFAULT_SENTIMENT_WINDOW)?,
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_llm_api_key(&self) -> anyhow::Result<&str> {
            self.llm_api_key
                .as_deref()
                .context("REAL_LLM_API_KEY is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }
    }

    fn parse_env_or(key: &str, default: usize) -> anyhow::Result<usize> {
        match std::env::var(key) {
            Ok(s) => {
                let n = s
                    .trim()
                    .parse::<usize>()
                    .with_context(|| format!("{key} must be a positive integer (got {s:?})"))?;
                anyhow::ensure!(n >= 1, "{key} must be >= 1");
                Ok(n)
            }
            Err(_) => Ok(default),
        }
    }
}
