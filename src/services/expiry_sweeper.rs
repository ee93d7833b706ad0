// Daily expiry sweep
// Runs once at startup and then every day at the configured wall-clock
// hour. One transaction flips overdue active subscriptions (titulares and
// dependents) to expired and prunes dead refresh token rows.

use chrono::{Duration as ChronoDuration, Timelike, Utc};
use diesel_async::AsyncConnection;
use std::time::Duration;

use crate::app_config::config;
use crate::db::DieselPool;
use crate::models::dependent::Dependent;
use crate::models::refresh_token::RefreshToken;
use crate::models::user::User;

#[derive(thiserror::Error, Debug)]
pub enum SweepError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

/// Counters from one sweep pass
#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub users_expired: usize,
    pub dependents_expired: usize,
    pub tokens_pruned: usize,
}

/// Run one sweep pass
pub async fn run_sweep(pool: &DieselPool) -> Result<SweepOutcome, SweepError> {
    let mut conn = pool.get().await.map_err(|e| SweepError::Pool(e.to_string()))?;
    let today = Utc::now().date_naive();

    let outcome = conn
        .transaction::<_, SweepError, _>(|tx| {
            Box::pin(async move {
                let users_expired = User::expire_overdue(tx, today)
                    .await
                    .map_err(|e| match e {
                        crate::models::user::UserError::Database(db) => SweepError::Database(db),
                        _ => SweepError::Pool("unexpected user error".to_string()),
                    })?;
                let dependents_expired = Dependent::expire_overdue(tx, today)
                    .await
                    .map_err(|e| match e {
                        crate::models::dependent::DependentError::Database(db) => {
                            SweepError::Database(db)
                        },
                        _ => SweepError::Pool("unexpected dependent error".to_string()),
                    })?;
                let tokens_pruned =
                    RefreshToken::cleanup_expired(tx).await.map_err(|e| match e {
                        crate::models::refresh_token::RefreshTokenError::Database(db) => {
                            SweepError::Database(db)
                        },
                        _ => SweepError::Pool("unexpected token error".to_string()),
                    })?;

                Ok(SweepOutcome {
                    users_expired,
                    dependents_expired,
                    tokens_pruned,
                })
            })
        })
        .await?;

    tracing::info!(
        "Expiry sweep: {} users expired, {} dependents expired, {} tokens pruned",
        outcome.users_expired,
        outcome.dependents_expired,
        outcome.tokens_pruned
    );

    Ok(outcome)
}

/// Seconds until the next occurrence of `hour:00:00`
fn seconds_until_hour(hour: u32) -> u64 {
    let now = Utc::now();
    let today_at = now
        .date_naive()
        .and_hms_opt(hour.min(23), 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now);

    let next = if today_at > now {
        today_at
    } else {
        today_at + ChronoDuration::days(1)
    };

    (next - now).num_seconds().max(1) as u64
}

/// Spawn the background sweeper. Sweeps immediately, then daily at the
/// configured hour. Errors are logged and the loop keeps running.
pub fn spawn(pool: DieselPool) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_sweep(&pool).await {
            tracing::error!("Startup expiry sweep failed: {}", e);
        }

        let hour = config().expiry_sweep_hour;
        loop {
            let wait = seconds_until_hour(hour);
            tracing::debug!("Next expiry sweep in {}s", wait);
            tokio::time::sleep(Duration::from_secs(wait)).await;

            if let Err(e) = run_sweep(&pool).await {
                tracing::error!("Expiry sweep failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_until_hour_bounds() {
        let wait = seconds_until_hour(Utc::now().hour());
        // the current hour has already started, so we wait until tomorrow
        assert!(wait >= 1);
        assert!(wait <= 86_400);

        let any = seconds_until_hour(3);
        assert!(any >= 1);
        assert!(any <= 86_400);
    }
}
