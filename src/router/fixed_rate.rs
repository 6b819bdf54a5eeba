use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const MIN_PERIOD: Duration = Duration::from_millis(1);
const MAX_PERIOD: Duration = Duration::from_secs(86_400);

/// Runs `action` at `rate_hz` until `cancel` fires.
///
/// The first tick fires immediately. Ticks missed while `action` ran long are
/// skipped rather than replayed in a burst. The period is clamped to
/// 1 ms..=1 day; use [`crate::config::refresh_period`] to reject such rates.
pub fn spawn_fixed_rate<F>(
    name: &'static str,
    rate_hz: f64,
    cancel: CancellationToken,
    mut action: F,
) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    let period = Duration::try_from_secs_f64(1.0 / rate_hz)
        .unwrap_or(MAX_PERIOD)
        .clamp(MIN_PERIOD, MAX_PERIOD);
    info!("Starting {} loop at {:.1} Hz ({:?} period)", name, rate_hz, period);

    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(period);
        interval_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval_timer.tick() => action(),
            }
        }
        debug!("{} loop stopped", name);
    })
}
