use crate::domain::order::{NewOrder, Order, OrderDecision, OrderStatus, TradeAction};
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

type OrderRow = (
    Uuid,
    Uuid,
    Uuid,
    String,
    String,
    String,
    i32,
    f64,
    String,
    Option<String>,
    bool,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    Updated(OrderStatus),
    NotFound,
    /// The order already reached a terminal state.
    AlreadyDecided(OrderStatus),
}

/// Writes every draft as a `pending` order in one transaction.
pub async fn insert_pending(pool: &sqlx::PgPool, orders: &[NewOrder]) -> anyhow::Result<Vec<Uuid>> {
    let mut tx = pool.begin().await.context("begin transaction failed")?;
    let mut ids = Vec::with_capacity(orders.len());

    for order in orders {
        let rec = &order.recommendation;
        anyhow::ensure!(rec.quantity > 0, "order quantity must be > 0");

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO orders (user_id, stock_id, order_type, quantity, price, status, reasoning, ai_drafted) \
             VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7) \
             RETURNING id",
        )
        .bind(order.user_id)
        .bind(rec.stock_id)
        .bind(rec.action.as_str())
        .bind(rec.quantity)
        .bind(order.price)
        .bind(&rec.reasoning)
        .bind(order.ai_drafted)
        .fetch_one(&mut *tx)
        .await
        .context("insert orders failed")?;
        ids.push(id);
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(ids)
}

pub async fn list_orders(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    status: Option<OrderStatus>,
    limit: i64,
) -> anyhow::Result<Vec<Order>> {
    let rows = sqlx::query_as::<_, OrderRow>(
        "SELECT o.id, o.user_id, o.stock_id, s.ticker, s.company_name, o.order_type, o.quantity, \
                o.price, o.status, o.reasoning, o.ai_drafted, o.created_at, o.executed_at \
         FROM orders o \
         JOIN stocks s ON s.id = o.stock_id \
         WHERE o.user_id = $1 AND ($2::text IS NULL OR o.status = $2) \
         ORDER BY o.created_at DESC \
         LIMIT $3",
    )
    .bind(user_id)
    .bind(status.map(OrderStatus::as_str))
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("select orders failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for (
        id,
        user_id,
        stock_id,
        ticker,
        company_name,
        order_type,
        quantity,
        price,
        status,
        reasoning,
        ai_drafted,
        created_at,
        executed_at,
    ) in rows
    {
        out.push(Order {
            id,
            user_id,
            stock_id,
            ticker,
            company_name,
            action: order_type
                .parse::<TradeAction>()
                .with_context(|| format!("invalid order_type in DB for order_id={id}"))?,
            quantity,
            price,
            status: status
                .parse::<OrderStatus>()
                .with_context(|| format!("invalid status in DB for order_id={id}"))?,
            reasoning,
            ai_drafted,
            created_at,
            executed_at,
        });
    }
    Ok(out)
}

/// Applies an approval decision. Only pending orders move; the row is locked while the
/// transition is checked.
pub async fn decide(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    order_id: Uuid,
    decision: OrderDecision,
) -> anyhow::Result<DecisionOutcome> {
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let current: Option<String> = sqlx::query_scalar(
        "SELECT status FROM orders WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(order_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await
    .context("select order status failed")?;

    let Some(current) = current else {
        return Ok(DecisionOutcome::NotFound);
    };
    let current = current
        .parse::<OrderStatus>()
        .with_context(|| format!("invalid status in DB for order_id={order_id}"))?;

    let next = match current.apply(decision) {
        Ok(next) => next,
        Err(err) => {
            tracing::info!(%order_id, error = %err, "order decision refused");
            return Ok(DecisionOutcome::AlreadyDecided(current));
        }
    };

    sqlx::query("UPDATE orders SET status = $1 WHERE id = $2")
        .bind(next.as_str())
        .bind(order_id)
        .execute(&mut *tx)
        .await
        .context("update order status failed")?;

    tx.commit().await.context("commit transaction failed")?;
    Ok(DecisionOutcome::Updated(next))
}
