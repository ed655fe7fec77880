//! Player-count gate.

use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// How often the gate reads the player count.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Poll `player_count` every `poll_interval` until it reaches `expected`.
///
/// The first poll happens immediately. There is no timeout: callers that need
/// to abandon the wait race this future against a shutdown signal. Returns the
/// number of polls taken.
pub async fn wait_for_players<F>(player_count: F, expected: usize, poll_interval: Duration) -> u64
where
    F: Fn() -> usize,
{
    let mut ticker = interval(poll_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polls = 0;

    loop {
        ticker.tick().await;
        polls += 1;

        let joined = player_count();
        if joined >= expected {
            return polls;
        }
        info!("Waiting for {} more players to join...", expected - joined);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{build_dispatch, capture::CapturedLogs, SeverityLevel};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_satisfied_on_first_poll() {
        let start = Instant::now();
        assert_eq!(wait_for_players(|| 3, 2, POLL_INTERVAL).await, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_passes_on_the_poll_that_reaches_expected() {
        let script = [0, 1, 2, 2];
        let polls = AtomicUsize::new(0);
        let start = Instant::now();

        let taken = wait_for_players(
            || script[polls.fetch_add(1, Ordering::SeqCst)],
            2,
            POLL_INTERVAL,
        )
        .await;

        assert_eq!(taken, 3);
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_passes_below_expected() {
        let polls = AtomicUsize::new(0);
        let gate = wait_for_players(
            || {
                polls.fetch_add(1, Ordering::SeqCst);
                1
            },
            2,
            POLL_INTERVAL,
        );

        let result = tokio::time::timeout(Duration::from_secs(60), gate).await;
        assert!(result.is_err());
        assert!(polls.load(Ordering::SeqCst) >= 59);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_missing_players() {
        let logs = CapturedLogs::default();
        let _guard = tracing::dispatcher::set_default(&build_dispatch(
            SeverityLevel::Information,
            logs.clone(),
        ));

        let script = [0, 3];
        let polls = AtomicUsize::new(0);
        wait_for_players(|| script[polls.fetch_add(1, Ordering::SeqCst)], 3, POLL_INTERVAL).await;

        let out = logs.contents();
        assert_eq!(out.matches("Waiting for 3 more players to join...").count(), 1);
    }
}
