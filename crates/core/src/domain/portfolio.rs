use crate::domain::sentiment::{AggregatedSentiment, SentimentLabel};
use crate::error::InvalidInput;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub stock_id: Uuid,
    pub quantity: i32,
    pub average_buy_price: f64,
}

impl Holding {
    pub fn new(stock_id: Uuid, quantity: i32, average_buy_price: f64) -> Result<Self, InvalidInput> {
        let holding = Self {
            stock_id,
            quantity,
            average_buy_price,
        };
        holding.validate()?;
        Ok(holding)
    }

    pub fn validate(&self) -> Result<(), InvalidInput> {
        if self.quantity < 0 {
            return Err(InvalidInput::NegativeQuantity(self.quantity));
        }
        if !self.average_buy_price.is_finite() || self.average_buy_price < 0.0 {
            return Err(InvalidInput::InvalidPrice(self.average_buy_price));
        }
        Ok(())
    }
}

/// A holding joined with its stock row and latest aggregated sentiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingView {
    pub holding_id: Uuid,
    pub ticker: String,
    pub company_name: String,
    pub current_price: Option<f64>,
    pub price_change_pct: Option<f64>,
    pub holding: Holding,
    pub sentiment: Option<AggregatedSentiment>,
}

impl HoldingView {
    pub fn market_value(&self) -> f64 {
        self.current_price.unwrap_or(0.0) * f64::from(self.holding.quantity)
    }

    pub fn cost_basis(&self) -> f64 {
        self.holding.average_buy_price * f64::from(self.holding.quantity)
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.market_value() - self.cost_basis()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub holdings: usize,
    pub total_value: f64,
    pub total_cost: f64,
    pub total_pnl: f64,
    pub pnl_pct: f64,
    /// Mean over holdings that have sentiment; `None` if none do.
    pub mean_sentiment: Option<f64>,
    pub sentiment_label: Option<SentimentLabel>,
}

pub fn summarize(holdings: &[HoldingView]) -> PortfolioSummary {
    let total_value: f64 = holdings.iter().map(HoldingView::market_value).sum();
    let total_cost: f64 = holdings.iter().map(HoldingView::cost_basis).sum();
    let total_pnl = total_value - total_cost;
    let pnl_pct = if total_cost > 0.0 {
        total_pnl / total_cost * 100.0
    } else {
        0.0
    };

    let scores: Vec<f64> = holdings
        .iter()
        .filter_map(|h| h.sentiment.map(|s| s.score))
        .collect();
    let mean_sentiment = if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    };

    PortfolioSummary {
        holdings: holdings.len(),
        total_value,
        total_cost,
        total_pnl,
        pnl_pct,
        mean_sentiment,
        sentiment_label: mean_sentiment.map(SentimentLabel::from_score),
    }
}
