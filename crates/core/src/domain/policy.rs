use crate::domain::order::{TradeAction, TradeRecommendation};
use crate::domain::portfolio::Holding;
use crate::domain::risk::RiskTier;
use crate::domain::sentiment::AggregatedSentiment;
use crate::error::InvalidInput;

pub fn evaluate(
    holding: &Holding,
    sentiment: Option<&AggregatedSentiment>,
    tier: RiskTier,
) -> Result<Option<TradeRecommendation>, InvalidInput> {
    holding.validate()?;

    let Some(sentiment) = sentiment else {
        return Ok(None);
    };
    if sentiment.stock_id != holding.stock_id {
        return Err(InvalidInput::StockMismatch {
            holding: holding.stock_id,
            sentiment: sentiment.stock_id,
        });
    }

    let trigger = tier.trigger();
    let score = sentiment.score;
    let action = if score > trigger {
        TradeAction::Buy
    } else if score < -trigger {
        TradeAction::Sell
    } else {
        return Ok(None);
    };

    // Sized from the band alone; the held quantity never shrinks a sell.
    let quantity = sized_quantity(tier, score.abs());

    let reasoning = format!(
        "Aggregated sentiment {score:+.2} ({label}, {n} readings) is beyond the {tier} trigger of ±{trigger:.2}; \
         drafting a {action} of {quantity} shares for review.",
        label = sentiment.label,
        n = sentiment.readings,
    );

    Ok(Some(TradeRecommendation {
        stock_id: holding.stock_id,
        action,
        quantity,
        reasoning,
    }))
}

/// Linear position inside the tier's band, from the low end at the trigger to the high end
/// at a full-strength score of 1.0.
fn sized_quantity(tier: RiskTier, magnitude: f64) -> i32 {
    let band = tier.quantity_band();
    let (lo, hi) = (*band.start(), *band.end());
    let trigger = tier.trigger();
    let strength = ((magnitude - trigger) / (1.0 - trigger)).clamp(0.0, 1.0);
    lo + (strength * f64::from(hi - lo)).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn holding(quantity: i32) -> Holding {
        Holding::new(Uuid::new_v4(), quantity, 150.0).unwrap()
    }

    fn sentiment(h: &Holding, score: f64) -> AggregatedSentiment {
        AggregatedSentiment::from_score(h.stock_id, score, 4)
    }

    fn action(h: &Holding, score: f64, tier: RiskTier) -> Option<TradeAction> {
        let s = sentiment(h, score);
        evaluate(h, Some(&s), tier).unwrap().map(|r| r.action)
    }

    #[test]
    fn no_sentiment_means_no_recommendation() {
        let h = holding(10);
        for tier in RiskTier::ALL {
            assert_eq!(evaluate(&h, None, tier).unwrap(), None);
        }
    }

    #[test]
    fn conservative_needs_a_strong_signal() {
        let h = holding(10);
        assert_eq!(action(&h, 0.6, RiskTier::Conservative), Some(TradeAction::Buy));
        assert_eq!(action(&h, 0.4, RiskTier::Conservative), None);
        assert_eq!(action(&h, 0.5, RiskTier::Conservative), None);
    }

    #[test]
    fn moderate_acts_on_medium_signal() {
        let h = holding(10);
        assert_eq!(action(&h, 0.4, RiskTier::Moderate), Some(TradeAction::Buy));
        assert_eq!(action(&h, -0.35, RiskTier::Moderate), Some(TradeAction::Sell));
        assert_eq!(action(&h, 0.3, RiskTier::Moderate), None);
    }

    #[test]
    fn aggressive_sells_on_weak_negative_signal() {
        let h = holding(40);
        assert_eq!(action(&h, -0.2, RiskTier::Aggressive), Some(TradeAction::Sell));
        assert_eq!(action(&h, -0.2, RiskTier::Moderate), None);
        assert_eq!(action(&h, -0.2, RiskTier::Conservative), None);
    }

    #[test]
    fn quantities_stay_inside_tier_bands() {
        let h = holding(1_000);
        for tier in RiskTier::ALL {
            let band = tier.quantity_band();
            for score in [tier.trigger() + 0.001, 0.55, 0.8, 1.0] {
                if score <= tier.trigger() {
                    continue;
                }
                let rec = evaluate(&h, Some(&sentiment(&h, score)), tier)
                    .unwrap()
                    .unwrap();
                assert!(band.contains(&rec.quantity), "{tier} {score} -> {}", rec.quantity);
            }
        }
    }

    #[test]
    fn stronger_signals_draft_larger_orders() {
        let h = holding(100);
        let weak = evaluate(&h, Some(&sentiment(&h, 0.35)), RiskTier::Moderate)
            .unwrap()
            .unwrap();
        let strong = evaluate(&h, Some(&sentiment(&h, 1.0)), RiskTier::Moderate)
            .unwrap()
            .unwrap();
        assert!(strong.quantity > weak.quantity);
        assert_eq!(strong.quantity, 15);
    }

    #[test]
    fn sells_are_sized_from_the_band_not_the_holding() {
        for quantity in [0, 3] {
            let h = holding(quantity);
            let rec = evaluate(&h, Some(&sentiment(&h, -0.2)), RiskTier::Aggressive)
                .unwrap()
                .unwrap();
            assert_eq!(rec.action, TradeAction::Sell);
            assert!(
                RiskTier::Aggressive.quantity_band().contains(&rec.quantity),
                "held {quantity} -> {}",
                rec.quantity
            );
        }

        let small = holding(3);
        let strong = evaluate(&small, Some(&sentiment(&small, -0.9)), RiskTier::Aggressive)
            .unwrap()
            .unwrap();
        assert!(strong.quantity > 3);
    }

    #[test]
    fn buy_on_empty_holding_is_allowed() {
        let h = holding(0);
        let rec = evaluate(&h, Some(&sentiment(&h, 0.9)), RiskTier::Conservative)
            .unwrap()
            .unwrap();
        assert_eq!(rec.action, TradeAction::Buy);
        assert!(rec.quantity > 0);
        assert!(rec.reasoning.contains("conservative"));
    }

    #[test]
    fn contract_violations_fail_fast() {
        let bad = Holding {
            stock_id: Uuid::new_v4(),
            quantity: -5,
            average_buy_price: 10.0,
        };
        assert_eq!(
            evaluate(&bad, None, RiskTier::Moderate),
            Err(InvalidInput::NegativeQuantity(-5))
        );

        let h = holding(1);
        let other = AggregatedSentiment::from_score(Uuid::new_v4(), 0.9, 1);
        assert!(matches!(
            evaluate(&h, Some(&other), RiskTier::Moderate),
            Err(InvalidInput::StockMismatch { .. })
        ));
    }

    #[test]
    fn evaluation_does_not_touch_the_holding() {
        let h = holding(12);
        let before = h.clone();
        let _ = evaluate(&h, Some(&sentiment(&h, -0.95)), RiskTier::Aggressive).unwrap();
        assert_eq!(h, before);
    }
}
