//! Simulated day clock.
//!
//! The current day lives in an `AtomicI32` so request handlers read it
//! without I/O. When Redis is configured the value is loaded from the
//! `current-day` key at start-up and written back on every advance, so
//! restarts keep the simulation date.

use std::sync::atomic::{AtomicI32, Ordering};

use anyhow::Context;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use crate::Clock;

const CURRENT_DAY_KEY: &str = "current-day";

#[derive(Debug, thiserror::Error)]
pub enum AdvanceError {
    #[error("new day {requested} must be greater than current day {current}")]
    NotForward { current: i32, requested: i32 },
    #[error("failed to persist current day")]
    Storage(#[source] anyhow::Error),
}

pub struct DayClock {
    day: AtomicI32,
    redis: Option<ConnectionManager>,
}

impl DayClock {
    /// In-process clock starting at `day`, never persisted.
    pub fn new(day: i32) -> Self {
        DayClock {
            day: AtomicI32::new(day),
            redis: None,
        }
    }

    /// Redis-backed clock. A missing key starts the simulation at day 0.
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url).context("invalid REDIS_URL")?;
        let mut conn = ConnectionManager::new(client)
            .await
            .context("failed to connect to Redis")?;
        let stored: Option<i32> = conn
            .get(CURRENT_DAY_KEY)
            .await
            .context("failed to read current day")?;
        let day = stored.unwrap_or(0);
        info!(day, "loaded simulated clock from Redis");
        Ok(DayClock {
            day: AtomicI32::new(day),
            redis: Some(conn),
        })
    }

    /// Move the clock to `day`, which must be strictly later than today.
    ///
    /// The in-process value moves first; a Redis failure is reported after
    /// the fact and the next successful advance overwrites the stored key.
    pub async fn advance(&self, day: i32) -> Result<i32, AdvanceError> {
        self.day
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (day > current).then_some(day)
            })
            .map_err(|current| AdvanceError::NotForward {
                current,
                requested: day,
            })?;

        if let Some(conn) = &self.redis {
            let mut conn = conn.clone();
            let _: () = conn
                .set(CURRENT_DAY_KEY, day)
                .await
                .map_err(|e| AdvanceError::Storage(e.into()))?;
        }
        info!(day, "advanced simulated clock");
        Ok(day)
    }
}

impl Clock for DayClock {
    fn today(&self) -> i32 {
        self.day.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn advance_moves_forward() {
        let clock = DayClock::new(0);
        assert_eq!(clock.today(), 0);
        assert_eq!(clock.advance(5).await.unwrap(), 5);
        assert_eq!(clock.today(), 5);
    }

    #[tokio::test]
    async fn advance_rejects_same_or_earlier_day() {
        let clock = DayClock::new(5);
        for day in [5, 4, -1] {
            match clock.advance(day).await {
                Err(AdvanceError::NotForward { current, requested }) => {
                    assert_eq!(current, 5);
                    assert_eq!(requested, day);
                }
                other => panic!("expected NotForward, got {:?}", other),
            }
        }
        assert_eq!(clock.today(), 5);
    }
}
