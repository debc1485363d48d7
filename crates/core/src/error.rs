use thiserror::Error;

/// A caller handed the decision core values that violate its contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidInput {
    #[error("holding quantity must be >= 0 (got {0})")]
    NegativeQuantity(i32),

    #[error("average buy price must be a finite value >= 0 (got {0})")]
    InvalidPrice(f64),

    #[error("sentiment belongs to stock {sentiment} but holding is for {holding}")]
    StockMismatch {
        holding: uuid::Uuid,
        sentiment: uuid::Uuid,
    },

    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("order cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: &'static str,
    pub to: &'static str,
}
