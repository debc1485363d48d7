pub mod lock;
pub mod orders;
pub mod portfolios;
pub mod risk_settings;
pub mod sentiment_logs;
pub mod stocks;

use anyhow::Context;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}
