use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;
use uuid::Uuid;

// Advisory locks are scoped to the Postgres session, so the guard pins the connection that
// took the lock until it is released.
const LOCK_NAMESPACE: i64 = 0x5345_4E54_4954; // "SENTIT"

fn lock_key_for_user(user_id: Uuid) -> i64 {
    let (hi, lo) = user_id.as_u64_pair();
    LOCK_NAMESPACE ^ ((hi ^ lo) as i64)
}

pub struct UserLock {
    // `None` once the lock has been handed back.
    conn: Option<PoolConnection<Postgres>>,
    key: i64,
}

/// Guards against two agent runs drafting orders for the same user at once.
pub async fn try_acquire_user_lock(
    pool: &sqlx::PgPool,
    user_id: Uuid,
) -> anyhow::Result<Option<UserLock>> {
    let key = lock_key_for_user(user_id);
    let mut conn = pool
        .acquire()
        .await
        .context("failed to acquire connection for advisory lock")?;
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;

    Ok(acquired.0.then_some(UserLock {
        conn: Some(conn),
        key,
    }))
}

impl UserLock {
    pub async fn release(mut self) -> anyhow::Result<()> {
        let key = self.key;
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        let unlocked = sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(key)
            .execute(&mut *conn)
            .await;
        match unlocked {
            Ok(_) => Ok(()),
            Err(err) => {
                // The session may still hold the lock; end it instead of pooling it.
                drop(conn.detach());
                Err(err).with_context(|| format!("failed to release advisory lock (key={key})"))
            }
        }
    }
}

impl Drop for UserLock {
    /// Reached when `release` was never awaited, e.g. a cancelled run. Ends the session so
    /// Postgres drops the lock with it.
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(key = self.key, "advisory lock dropped without release; closing its session");
            drop(conn.detach());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_keys_are_stable_per_user() {
        let a = Uuid::from_u128(0x0123_4567_89ab_cdef_0011_2233_4455_6677);
        let b = Uuid::from_u128(0x0123_4567_89ab_cdef_0011_2233_4455_6678);
        assert_eq!(lock_key_for_user(a), lock_key_for_user(a));
        assert_ne!(lock_key_for_user(a), lock_key_for_user(b));
    }

    #[tokio::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn dropped_guard_frees_the_lock() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let holder = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .unwrap();
        let other = sqlx::PgPool::connect(&url).await.unwrap();
        let user = Uuid::new_v4();

        let guard = try_acquire_user_lock(&holder, user).await.unwrap().unwrap();
        assert!(try_acquire_user_lock(&other, user).await.unwrap().is_none());

        // Simulates a cancelled run: the guard goes away without `release`.
        drop(guard);

        let mut reacquired = None;
        for _ in 0..50 {
            reacquired = try_acquire_user_lock(&other, user).await.unwrap();
            if reacquired.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let reacquired = reacquired.expect("lock still held after guard was dropped");
        reacquired.release().await.unwrap();

        // The holder pool still works after losing its connection.
        let guard = try_acquire_user_lock(&holder, user).await.unwrap().unwrap();
        guard.release().await.unwrap();
    }
}
