use crate::domain::contract::LlmTradeDraft;
use crate::domain::order::NewOrder;
use crate::domain::policy;
use crate::domain::portfolio::HoldingView;
use crate::domain::risk::RiskTier;
use crate::domain::sentiment::{aggregate_by_stock, SentimentReading};
use crate::error::InvalidInput;
use crate::llm::{json, ChatRequest, LlmClient};
use crate::storage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const MAX_LLM_DRAFTS: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationEngine {
    #[default]
    Rules,
    Llm,
}

impl RecommendationEngine {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::Llm => "llm",
        }
    }
}

impl fmt::Display for RecommendationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecommendationEngine {
    type Err = InvalidInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rules" => Ok(Self::Rules),
            "llm" => Ok(Self::Llm),
            other => Err(InvalidInput::UnknownVariant {
                kind: "recommendation engine",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentRunSummary {
    pub orders_created: usize,
    pub order_ids: Vec<Uuid>,
    pub risk_tier: RiskTier,
    pub engine: RecommendationEngine,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Fills each holding's `sentiment` from a mixed list of readings.
pub fn attach_sentiment(holdings: &mut [HoldingView], readings: &[SentimentReading]) {
    let aggregated = aggregate_by_stock(readings);
    for view in holdings {
        view.sentiment = aggregated.get(&view.holding.stock_id).copied();
    }
}

fn order_price(view: &HoldingView) -> f64 {
    view.current_price.unwrap_or(view.holding.average_buy_price)
}

pub fn draft_with_rules(
    user_id: Uuid,
    holdings: &[HoldingView],
    tier: RiskTier,
) -> Result<Vec<NewOrder>, InvalidInput> {
    let mut out = Vec::new();
    for view in holdings {
        if let Some(recommendation) = policy::evaluate(&view.holding, view.sentiment.as_ref(), tier)? {
            out.push(NewOrder {
                user_id,
                recommendation,
                price: order_price(view),
                ai_drafted: true,
            });
        }
    }
    Ok(out)
}

pub fn trading_prompt(holdings: &[HoldingView], tier: RiskTier) -> String {
    let portfolio = holdings
        .iter()
        .map(|h| {
            let sentiment = h
                .sentiment
                .map(|s| format!("{:.2}", s.score))
                .unwrap_or_else(|| "unknown".to_string());
            let price = h
                .current_price
                .map(|p| format!("{p:.2}"))
                .unwrap_or_else(|| "n/a".to_string());
            format!(
                "{}: {} shares @ ${price}, avg sentiment: {sentiment}",
                h.ticker, h.holding.quantity
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let rules = RiskTier::ALL
        .iter()
        .map(|t| {
            let band = t.quantity_band();
            format!(
                "- {t}: trade only when sentiment > {trig} or < -{trig}; {lo}-{hi} shares.",
                trig = t.trigger(),
                lo = band.start(),
                hi = band.end(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an agentic trading AI. Based on the current portfolio and sentiment data, generate trade recommendations.\n\n\
Risk Level: {tier}\n\
Portfolio:\n{portfolio}\n\n\
Rules by risk level:\n{rules}\n\n\
For each recommendation, return a JSON array of objects with:\n\
- ticker: stock ticker\n\
- action: \"buy\" or \"sell\"\n\
- quantity: number of shares\n\
- reasoning: 1-2 sentence explanation\n\n\
Generate 0-{MAX_LLM_DRAFTS} recommendations. If no clear signal, return an empty array.\n\
Return ONLY a valid JSON array, no markdown."
    )
}

/// LLM-drafted orders. A failed call is an error; output that cannot be read as drafts is
/// treated as "no recommendation".
pub async fn draft_with_llm(
    llm: &dyn LlmClient,
    user_id: Uuid,
    holdings: &[HoldingView],
    tier: RiskTier,
) -> anyhow::Result<Vec<NewOrder>> {
    let text = llm
        .complete(ChatRequest::prompt(trading_prompt(holdings, tier)))
        .await?;

    let drafts: Vec<LlmTradeDraft> = match json::parse_trade_drafts(&text) {
        Ok(drafts) => drafts,
        Err(err) => {
            tracing::warn!(%user_id, error = %err, "unparseable trade drafts; drafting nothing");
            return Ok(Vec::new());
        }
    };

    let mut out = Vec::new();
    for draft in drafts.into_iter().take(MAX_LLM_DRAFTS) {
        match draft.resolve(holdings) {
            Ok((recommendation, view)) => out.push(NewOrder {
                user_id,
                recommendation,
                price: order_price(view),
                ai_drafted: true,
            }),
            Err(err) => tracing::warn!(%user_id, error = %err, "dropping trade draft"),
        }
    }
    Ok(out)
}

pub async fn load_holdings_with_sentiment(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    window: usize,
) -> anyhow::Result<Vec<HoldingView>> {
    let mut holdings = storage::portfolios::list_holdings(pool, user_id).await?;
    let stock_ids: Vec<Uuid> = holdings.iter().map(|h| h.holding.stock_id).collect();
    let readings =
        storage::sentiment_logs::recent_readings_for_stocks(pool, &stock_ids, window).await?;
    attach_sentiment(&mut holdings, &readings);
    Ok(holdings)
}

pub async fn run_trading_agent(
    pool: &sqlx::PgPool,
    llm: Option<&dyn LlmClient>,
    user_id: Uuid,
    engine: RecommendationEngine,
    window: usize,
    dry_run: bool,
) -> anyhow::Result<AgentRunSummary> {
    let Some(lock) = storage::lock::try_acquire_user_lock(pool, user_id).await? else {
        tracing::warn!(%user_id, "agent lock not acquired; another run in progress");
        return Ok(AgentRunSummary {
            orders_created: 0,
            order_ids: Vec::new(),
            risk_tier: RiskTier::default(),
            engine,
            message: Some("Another agent run is in progress".to_string()),
        });
    };

    let result = run_locked(pool, llm, user_id, engine, window, dry_run).await;
    if let Err(err) = lock.release().await {
        tracing::warn!(%user_id, error = %err, "failed to release agent lock");
    }
    result
}

async fn run_locked(
    pool: &sqlx::PgPool,
    llm: Option<&dyn LlmClient>,
    user_id: Uuid,
    engine: RecommendationEngine,
    window: usize,
    dry_run: bool,
) -> anyhow::Result<AgentRunSummary> {
    let risk_tier = storage::risk_settings::get_risk_tier(pool, user_id).await?;
    let holdings = load_holdings_with_sentiment(pool, user_id, window).await?;

    let mut summary = AgentRunSummary {
        orders_created: 0,
        order_ids: Vec::new(),
        risk_tier,
        engine,
        message: None,
    };

    if holdings.is_empty() {
        summary.message = Some("No holdings in portfolio".to_string());
        return Ok(summary);
    }

    let drafts = match engine {
        RecommendationEngine::Rules => draft_with_rules(user_id, &holdings, risk_tier)?,
        RecommendationEngine::Llm => {
            let llm = llm.ok_or_else(|| {
                anyhow::anyhow!("LLM engine requested but no LLM client is configured")
            })?;
            draft_with_llm(llm, user_id, &holdings, risk_tier).await?
        }
    };

    if drafts.is_empty() {
        summary.message = Some("No clear signal; nothing drafted".to_string());
    }

    if dry_run {
        for draft in &drafts {
            tracing::info!(%user_id, ?draft, "dry-run: drafted order");
        }
        summary.orders_created = drafts.len();
        return Ok(summary);
    }

    summary.order_ids = storage::orders::insert_pending(pool, &drafts).await?;
    summary.orders_created = summary.order_ids.len();

    tracing::info!(
        %user_id,
        %risk_tier,
        %engine,
        orders_created = summary.orders_created,
        "agent run finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::TradeAction;
    use crate::domain::portfolio::Holding;
    use crate::domain::sentiment::SentimentSource;
    use crate::llm::error::LlmDiagnosticsError;
    use crate::llm::fake::ScriptedLlm;
    use crate::llm::Provider;
    use chrono::{TimeZone, Utc};

    fn view(ticker: &str, quantity: i32, price: Option<f64>) -> HoldingView {
        HoldingView {
            holding_id: Uuid::new_v4(),
            ticker: ticker.to_string(),
            company_name: format!("{ticker} Corp."),
            current_price: price,
            price_change_pct: None,
            holding: Holding::new(Uuid::new_v4(), quantity, 100.0).unwrap(),
            sentiment: None,
        }
    }

    fn reading(stock_id: Uuid, source: SentimentSource, score: f64) -> SentimentReading {
        SentimentReading {
            stock_id,
            source,
            score,
            observed_at: Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap(),
            headline: None,
            summary: None,
        }
    }

    fn portfolio() -> Vec<HoldingView> {
        let mut holdings = vec![
            view("AAPL", 10, Some(190.0)),
            view("TSLA", 20, Some(175.0)),
            view("XOM", 5, None),
        ];
        let readings = vec![
            reading(holdings[0].holding.stock_id, SentimentSource::News, 0.7),
            reading(holdings[0].holding.stock_id, SentimentSource::Social, 0.5),
            reading(holdings[1].holding.stock_id, SentimentSource::News, -0.25),
            reading(holdings[1].holding.stock_id, SentimentSource::Social, -0.15),
        ];
        attach_sentiment(&mut holdings, &readings);
        holdings
    }

    #[test]
    fn attaches_aggregates_per_holding() {
        let holdings = portfolio();
        assert!((holdings[0].sentiment.unwrap().score - 0.6).abs() < 1e-12);
        assert!((holdings[1].sentiment.unwrap().score + 0.2).abs() < 1e-12);
        assert!(holdings[2].sentiment.is_none());
    }

    #[test]
    fn rules_engine_follows_risk_tier() {
        let user_id = Uuid::new_v4();
        let holdings = portfolio();

        let conservative = draft_with_rules(user_id, &holdings, RiskTier::Conservative).unwrap();
        assert_eq!(conservative.len(), 1);
        assert_eq!(conservative[0].recommendation.action, TradeAction::Buy);
        assert_eq!(conservative[0].price, 190.0);
        assert!(conservative[0].ai_drafted);

        let aggressive = draft_with_rules(user_id, &holdings, RiskTier::Aggressive).unwrap();
        let actions: Vec<_> = aggressive.iter().map(|o| o.recommendation.action).collect();
        assert_eq!(actions, vec![TradeAction::Buy, TradeAction::Sell]);
        assert!(aggressive.iter().all(|o| o.user_id == user_id));
    }

    #[test]
    fn rules_engine_without_sentiment_drafts_nothing() {
        let holdings = vec![view("MSFT", 3, Some(400.0))];
        for tier in RiskTier::ALL {
            assert!(draft_with_rules(Uuid::new_v4(), &holdings, tier).unwrap().is_empty());
        }
    }

    #[test]
    fn prompt_lists_holdings_and_tier() {
        let prompt = trading_prompt(&portfolio(), RiskTier::Aggressive);
        assert!(prompt.contains("Risk Level: aggressive"));
        assert!(prompt.contains("AAPL: 10 shares @ $190.00, avg sentiment: 0.60"));
        assert!(prompt.contains("XOM: 5 shares @ $n/a, avg sentiment: unknown"));
        assert!(prompt.contains("conservative: trade only when sentiment > 0.5"));
    }

    #[tokio::test]
    async fn llm_engine_keeps_only_resolvable_drafts() {
        let llm = ScriptedLlm::replying(
            r#"[
                {"ticker": "TSLA", "action": "sell", "quantity": 4.4, "reasoning": "Bearish chatter."},
                {"ticker": "GME", "action": "buy", "quantity": 10, "reasoning": "Not held."},
                {"ticker": "AAPL", "action": "hold", "quantity": 1},
                {"ticker": "XOM", "action": "buy", "quantity": "lots"}
            ]"#,
        );
        let holdings = portfolio();
        let drafts = draft_with_llm(&llm, Uuid::new_v4(), &holdings, RiskTier::Moderate)
            .await
            .unwrap();

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].recommendation.stock_id, holdings[1].holding.stock_id);
        assert_eq!(drafts[0].recommendation.quantity, 4);
        assert_eq!(drafts[0].price, 175.0);
    }

    #[tokio::test]
    async fn llm_engine_caps_draft_count() {
        let llm = ScriptedLlm::replying(
            r#"[
                {"ticker": "AAPL", "action": "buy", "quantity": 1},
                {"ticker": "AAPL", "action": "buy", "quantity": 2},
                {"ticker": "TSLA", "action": "sell", "quantity": 3},
                {"ticker": "XOM", "action": "buy", "quantity": 4}
            ]"#,
        );
        let drafts = draft_with_llm(&llm, Uuid::new_v4(), &portfolio(), RiskTier::Aggressive)
            .await
            .unwrap();
        assert_eq!(drafts.len(), MAX_LLM_DRAFTS);
        // The XOM draft came fourth; its price would have fallen back to the 100.0 cost basis.
        assert!(drafts.iter().all(|d| d.price > 100.0));
    }

    #[tokio::test]
    async fn llm_engine_treats_garbage_as_no_recommendation() {
        let llm = ScriptedLlm::replying("The market is unpredictable today.");
        let drafts = draft_with_llm(&llm, Uuid::new_v4(), &portfolio(), RiskTier::Moderate)
            .await
            .unwrap();
        assert!(drafts.is_empty());
    }

    #[tokio::test]
    async fn llm_engine_surfaces_provider_errors() {
        let limited = LlmDiagnosticsError {
            provider: Provider::OpenAI,
            stage: "http",
            detail: "status=429".to_string(),
            status: Some(429),
            raw_output: None,
            raw_response_json: None,
        };
        let llm = ScriptedLlm::new(vec![Err(anyhow::Error::new(limited))]);
        let err = draft_with_llm(&llm, Uuid::new_v4(), &portfolio(), RiskTier::Moderate)
            .await
            .unwrap_err();
        assert!(crate::llm::error::is_rate_limited(&err));
    }

    #[test]
    fn parses_engine_names() {
        assert_eq!("LLM".parse::<RecommendationEngine>().unwrap(), RecommendationEngine::Llm);
        assert_eq!(RecommendationEngine::default(), RecommendationEngine::Rules);
        assert!("oracle".parse::<RecommendationEngine>().is_err());
    }
}
