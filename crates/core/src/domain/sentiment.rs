use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Scores strictly above this are bullish.
pub const BULLISH_ABOVE: f64 = 0.2;
/// Scores strictly below this are bearish.
pub const BEARISH_BELOW: f64 = -0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentSource {
    News,
    Social,
}

impl SentimentSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Social => "social",
        }
    }
}

impl FromStr for SentimentSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "news" => Ok(Self::News),
            "social" => Ok(Self::Social),
            other => anyhow::bail!("unknown sentiment source: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Bullish,
    Neutral,
    Bearish,
}

impl SentimentLabel {
    pub fn from_score(score: f64) -> Self {
        if score > BULLISH_ABOVE {
            Self::Bullish
        } else if score < BEARISH_BELOW {
            Self::Bearish
        } else {
            Self::Neutral
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Neutral => "neutral",
            Self::Bearish => "bearish",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    pub stock_id: Uuid,
    pub source: SentimentSource,
    pub score: f64,
    pub observed_at: DateTime<Utc>,
    pub headline: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSentiment {
    pub stock_id: Uuid,
    pub score: f64,
    pub label: SentimentLabel,
    pub readings: usize,
}

impl AggregatedSentiment {
    /// Builds an aggregate from an already-reduced score. The score is clamped.
    pub fn from_score(stock_id: Uuid, score: f64, readings: usize) -> Self {
        let score = clamp_score(score);
        Self {
            stock_id,
            score,
            label: SentimentLabel::from_score(score),
            readings,
        }
    }
}

/// Clamps a raw score into [-1.0, 1.0]. Non-finite input counts as 0.0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Reduces the readings of a single stock to one score and label.
///
/// Returns `None` for an empty slice: no data is not the same as a neutral 0.0.
/// The reported `stock_id` is the one of the first reading; callers holding a mixed
/// list should go through [`aggregate_by_stock`].
pub fn aggregate(readings: &[SentimentReading]) -> Option<AggregatedSentiment> {
    let first = readings.first()?;
    let sum: f64 = readings.iter().map(|r| clamp_score(r.score)).sum();
    let mean = sum / readings.len() as f64;
    Some(AggregatedSentiment::from_score(
        first.stock_id,
        mean,
        readings.len(),
    ))
}

pub fn aggregate_by_stock(readings: &[SentimentReading]) -> BTreeMap<Uuid, AggregatedSentiment> {
    let mut grouped = BTreeMap::<Uuid, Vec<SentimentReading>>::new();
    for reading in readings {
        grouped
            .entry(reading.stock_id)
            .or_default()
            .push(reading.clone());
    }

    grouped
        .into_iter()
        .filter_map(|(stock_id, group)| aggregate(&group).map(|agg| (stock_id, agg)))
        .collect()
}
