use crate::domain::risk::RiskTier;
use anyhow::Context;
use uuid::Uuid;

/// Users without a row get the default tier.
pub async fn get_risk_tier(pool: &sqlx::PgPool, user_id: Uuid) -> anyhow::Result<RiskTier> {
    let level: Option<String> =
        sqlx::query_scalar("SELECT risk_level FROM risk_settings WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .context("select risk_settings failed")?;

    match level {
        Some(level) => level
            .parse::<RiskTier>()
            .with_context(|| format!("invalid risk_level in DB for user_id={user_id}")),
        None => Ok(RiskTier::default()),
    }
}

pub async fn set_risk_tier(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    tier: RiskTier,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO risk_settings (user_id, risk_level) VALUES ($1, $2) \
         ON CONFLICT (user_id) DO UPDATE SET risk_level = EXCLUDED.risk_level, updated_at = now()",
    )
    .bind(user_id)
    .bind(tier.as_str())
    .execute(pool)
    .await
    .context("upsert risk_settings failed")?;
    Ok(())
}
