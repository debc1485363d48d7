use crate::error::{InvalidInput, InvalidTransition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeAction {
    type Err = InvalidInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            other => Err(InvalidInput::UnknownVariant {
                kind: "trade action",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecommendation {
    pub stock_id: Uuid,
    pub action: TradeAction,
    pub quantity: i32,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDecision {
    Approve,
    Reject,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// `pending -> approved | rejected`; every other move is refused.
    pub fn apply(self, decision: OrderDecision) -> Result<OrderStatus, InvalidTransition> {
        let to = match decision {
            OrderDecision::Approve => Self::Approved,
            OrderDecision::Reject => Self::Rejected,
        };
        match self {
            Self::Pending => Ok(to),
            from => Err(InvalidTransition {
                from: from.as_str(),
                to: to.as_str(),
            }),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = InvalidInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(InvalidInput::UnknownVariant {
                kind: "order status",
                value: other.to_string(),
            }),
        }
    }
}

/// A recommendation ready to be written as a pending order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub recommendation: TradeRecommendation,
    pub price: f64,
    pub ai_drafted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stock_id: Uuid,
    pub ticker: String,
    pub company_name: String,
    pub action: TradeAction,
    pub quantity: i32,
    pub price: f64,
    pub status: OrderStatus,
    pub reasoning: Option<String>,
    pub ai_drafted: bool,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_moves_to_either_terminal_state() {
        assert_eq!(
            OrderStatus::Pending.apply(OrderDecision::Approve),
            Ok(OrderStatus::Approved)
        );
        assert_eq!(
            OrderStatus::Pending.apply(OrderDecision::Reject),
            Ok(OrderStatus::Rejected)
        );
    }

    #[test]
    fn terminal_states_do_not_move() {
        for from in [OrderStatus::Approved, OrderStatus::Rejected] {
            assert!(from.is_terminal());
            for decision in [OrderDecision::Approve, OrderDecision::Reject] {
                let err = from.apply(decision).unwrap_err();
                assert_eq!(err.from, from.as_str());
            }
        }
    }

    #[test]
    fn parses_actions_and_statuses() {
        assert_eq!("BUY".parse::<TradeAction>().unwrap(), TradeAction::Buy);
        assert!("hold".parse::<TradeAction>().is_err());
        assert_eq!("rejected".parse::<OrderStatus>().unwrap(), OrderStatus::Rejected);
        assert!("filled".parse::<OrderStatus>().is_err());
    }
}
