use crate::domain::order::{TradeAction, TradeRecommendation};
use crate::domain::portfolio::HoldingView;
use crate::domain::sentiment::{clamp_score, SentimentReading, SentimentSource};
use anyhow::{ensure, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmSentimentAnalysis {
    #[serde(default)]
    pub news_headline: Option<String>,
    #[serde(default)]
    pub news_sentiment: Option<f64>,
    #[serde(default)]
    pub news_summary: Option<String>,
    #[serde(default)]
    pub social_headline: Option<String>,
    #[serde(default)]
    pub social_sentiment: Option<f64>,
    #[serde(default)]
    pub social_summary: Option<String>,
}

impl LlmSentimentAnalysis {
    /// One news and one social reading. Missing scores become 0.0, every score is clamped,
    /// missing headlines fall back to a ticker-based placeholder.
    pub fn into_readings(
        self,
        stock_id: Uuid,
        ticker: &str,
        observed_at: DateTime<Utc>,
    ) -> [SentimentReading; 2] {
        let news = SentimentReading {
            stock_id,
            source: SentimentSource::News,
            score: clamp_score(self.news_sentiment.unwrap_or(0.0)),
            observed_at,
            headline: Some(
                non_empty(self.news_headline).unwrap_or_else(|| format!("{ticker} market update")),
            ),
            summary: Some(non_empty(self.news_summary).unwrap_or_default()),
        };
        let social = SentimentReading {
            stock_id,
            source: SentimentSource::Social,
            score: clamp_score(self.social_sentiment.unwrap_or(0.0)),
            observed_at,
            headline: Some(
                non_empty(self.social_headline).unwrap_or_else(|| format!("{ticker} trending")),
            ),
            summary: Some(non_empty(self.social_summary).unwrap_or_default()),
        };
        [news, social]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmTradeDraft {
    pub ticker: String,
    pub action: String,
    pub quantity: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl LlmTradeDraft {
    /// Resolves the draft against the user's holdings. Drafts for tickers the user does not
    /// hold are refused; quantities are rounded and floored at one share.
    pub fn resolve<'a>(
        self,
        holdings: &'a [HoldingView],
    ) -> anyhow::Result<(TradeRecommendation, &'a HoldingView)> {
        let ticker = self.ticker.trim();
        let view = holdings
            .iter()
            .find(|h| h.ticker.eq_ignore_ascii_case(ticker))
            .with_context(|| format!("ticker {ticker} is not held"))?;

        let action = self.action.parse::<TradeAction>()?;

        ensure!(
            self.quantity.is_finite(),
            "quantity must be finite (got {})",
            self.quantity
        );
        let quantity = self.quantity.round().clamp(1.0, f64::from(i32::MAX)) as i32;

        let reasoning = non_empty(self.reasoning)
            .unwrap_or_else(|| format!("LLM drafted a {action} for {}", view.ticker));

        Ok((
            TradeRecommendation {
                stock_id: view.holding.stock_id,
                action,
                quantity,
                reasoning,
            },
            view,
        ))
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::portfolio::Holding;
    use chrono::TimeZone;

    fn holdings() -> Vec<HoldingView> {
        vec![HoldingView {
            holding_id: Uuid::new_v4(),
            ticker: "AAPL".to_string(),
            company_name: "Apple Inc.".to_string(),
            current_price: Some(189.5),
            price_change_pct: Some(0.8),
            holding: Holding::new(Uuid::new_v4(), 10, 170.0).unwrap(),
            sentiment: None,
        }]
    }

    #[test]
    fn sentiment_analysis_fills_defaults_and_clamps() {
        let at = Utc.with_ymd_and_hms(2026, 2, 10, 15, 0, 0).unwrap();
        let id = Uuid::new_v4();
        let analysis = LlmSentimentAnalysis {
            news_sentiment: Some(1.7),
            social_headline: Some("  ".to_string()),
            social_sentiment: None,
            ..Default::default()
        };
        let [news, social] = analysis.into_readings(id, "TSLA", at);
        assert_eq!(news.score, 1.0);
        assert_eq!(news.headline.as_deref(), Some("TSLA market update"));
        assert_eq!(news.source, SentimentSource::News);
        assert_eq!(social.score, 0.0);
        assert_eq!(social.headline.as_deref(), Some("TSLA trending"));
        assert_eq!(social.observed_at, at);
    }

    #[test]
    fn trade_draft_resolves_against_holdings() {
        let holdings = holdings();
        let draft = LlmTradeDraft {
            ticker: "aapl".to_string(),
            action: "Sell".to_string(),
            quantity: 2.6,
            reasoning: Some("Negative chatter after earnings.".to_string()),
        };
        let (rec, view) = draft.resolve(&holdings).unwrap();
        assert_eq!(rec.action, TradeAction::Sell);
        assert_eq!(rec.quantity, 3);
        assert_eq!(rec.stock_id, holdings[0].holding.stock_id);
        assert_eq!(view.ticker, "AAPL");
    }

    #[test]
    fn trade_draft_floors_quantity_at_one() {
        let holdings = holdings();
        let draft = LlmTradeDraft {
            ticker: "AAPL".to_string(),
            action: "buy".to_string(),
            quantity: 0.0,
            reasoning: None,
        };
        let (rec, _) = draft.resolve(&holdings).unwrap();
        assert_eq!(rec.quantity, 1);
        assert!(rec.reasoning.contains("AAPL"));
    }

    #[test]
    fn trade_draft_rejects_unknown_ticker_and_action() {
        let holdings = holdings();
        let unknown = LlmTradeDraft {
            ticker: "MSFT".to_string(),
            action: "buy".to_string(),
            quantity: 5.0,
            reasoning: None,
        };
        assert!(unknown.resolve(&holdings).is_err());

        let hold = LlmTradeDraft {
            ticker: "AAPL".to_string(),
            action: "hold".to_string(),
            quantity: 5.0,
            reasoning: None,
        };
        assert!(hold.resolve(&holdings).is_err());
    }
}
