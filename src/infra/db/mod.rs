//! Postgres-backed repository implementations.

mod orders;
mod util;

pub use util::map_sqlx_error;

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};
use tracing::{info, warn};

use crate::config::DatabaseSettings;

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    /// Connect to `url`, retrying failed attempts after the configured delay.
    pub async fn connect_with_retry(
        url: &str,
        settings: &DatabaseSettings,
    ) -> Result<PgPool, sqlx::Error> {
        retry_connect(
            settings.connect_attempts,
            settings.connect_retry_delay,
            || Self::connect(url, settings.max_connections.get()),
        )
        .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}

async fn retry_connect<F, Fut, T, E>(
    attempts: NonZeroU32,
    delay: Duration,
    mut connect: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match connect().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, "Connected to database");
                }
                return Ok(value);
            }
            Err(err) if attempt < attempts.get() => {
                warn!(
                    attempt,
                    max_attempts = attempts.get(),
                    retry_in_ms = delay.as_millis() as u64,
                    error = %err,
                    "Database connection failed; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn attempts(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).expect("non-zero attempts")
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_connect(attempts(5), Duration::from_millis(1), || {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if call < 3 {
                    Err("refused")
                } else {
                    Ok(call)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_last_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_connect(attempts(2), Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("refused") }
        })
        .await;

        assert_eq!(result, Err("refused"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
