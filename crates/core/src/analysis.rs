// Simulated ingestion: the LLM fabricates one news and one social reading per stock.

use crate::domain::sentiment::SentimentReading;
use crate::llm::{json, ChatRequest, LlmClient};
use crate::storage;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SentimentPassSummary {
    pub sampled: usize,
    pub analyzed: usize,
    pub readings: u64,
}

pub fn sentiment_prompt(ticker: &str, company_name: &str) -> String {
    format!(
        "You are a financial sentiment analyst. Analyze the current market sentiment for {ticker} ({company_name}).\n\n\
Generate a realistic mock news headline and sentiment analysis. Return a JSON object with exactly these fields:\n\
- news_headline: a realistic news headline about this stock\n\
- news_sentiment: a score from -1.0 (very bearish) to 1.0 (very bullish)\n\
- social_headline: a realistic social media post about this stock\n\
- social_sentiment: a score from -1.0 to 1.0\n\
- news_summary: brief explanation of the news sentiment (1 sentence)\n\
- social_summary: brief explanation of the social sentiment (1 sentence)\n\n\
Return ONLY valid JSON, no markdown."
    )
}

/// Asks the LLM for one stock's readings. Any failure, including unparseable output, yields
/// `None` and the stock is skipped.
pub async fn analyze_stock(
    llm: &dyn LlmClient,
    stock: &storage::stocks::Stock,
    observed_at: DateTime<Utc>,
) -> Option<[SentimentReading; 2]> {
    let prompt = sentiment_prompt(&stock.ticker, &stock.company_name);
    let text = match llm.complete(ChatRequest::prompt(prompt)).await {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(ticker = %stock.ticker, error = %err, "sentiment LLM call failed; skipping");
            return None;
        }
    };

    match json::parse_sentiment_analysis(&text) {
        Ok(analysis) => Some(analysis.into_readings(stock.id, &stock.ticker, observed_at)),
        Err(err) => {
            tracing::warn!(ticker = %stock.ticker, error = %err, "unparseable sentiment output; skipping");
            None
        }
    }
}

/// A storage failure skips the stock; readings already stored for other stocks stay.
async fn store_readings(
    pool: &sqlx::PgPool,
    stock: &storage::stocks::Stock,
    readings: &[SentimentReading],
) -> Option<u64> {
    match storage::sentiment_logs::insert_readings(pool, readings).await {
        Ok(inserted) => Some(inserted),
        Err(err) => {
            tracing::warn!(ticker = %stock.ticker, error = %err, "failed to store sentiment readings; skipping");
            None
        }
    }
}

/// Samples `sample_size` stocks and records fresh readings for each one the LLM answered.
pub async fn run_sentiment_pass(
    pool: &sqlx::PgPool,
    llm: &dyn LlmClient,
    sample_size: usize,
    dry_run: bool,
) -> anyhow::Result<SentimentPassSummary> {
    let stocks = storage::stocks::sample_stocks(pool, sample_size).await?;
    let mut summary = SentimentPassSummary {
        sampled: stocks.len(),
        ..Default::default()
    };

    for stock in &stocks {
        let Some(readings) = analyze_stock(llm, stock, Utc::now()).await else {
            continue;
        };

        if dry_run {
            tracing::info!(ticker = %stock.ticker, ?readings, "dry-run: sentiment readings");
        } else {
            let Some(inserted) = store_readings(pool, stock, &readings).await else {
                continue;
            };
            summary.readings += inserted;
        }
        summary.analyzed += 1;
    }

    tracing::info!(
        sampled = summary.sampled,
        analyzed = summary.analyzed,
        provider = llm.provider().as_str(),
        "sentiment pass finished"
    );
    Ok(summary)
}
