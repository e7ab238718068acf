pub mod assertions;
pub mod dispatch;
pub mod locator;
pub mod params;
pub mod retry;
pub mod scenario;
pub mod state;
pub mod waits;

pub use scenario::Scenario;
pub use state::{RunState, StepOutcome};

use std::future::Future;
use std::time::{Duration, Instant};

use crate::driver::traits::SurfaceError;
use crate::error::StepError;

/// Interval for locator and wait-predicate polling.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Bound for the interact-readiness check before clicking or typing.
pub(crate) const INTERACT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound for the confirm-after-mutate check on value-mutating
/// operations; surface interactions are not guaranteed synchronous.
pub(crate) const CONFIRM_TIMEOUT: Duration = Duration::from_secs(2);
pub(crate) const CONFIRM_INTERVAL: Duration = Duration::from_millis(100);

/// Interval for broker consume polling.
pub(crate) const CONSUME_POLL: Duration = Duration::from_millis(100);

/// Bounded polling: probe until it reports true (Ok(true)), the
/// timeout elapses (Ok(false)), or the probe errors out.
pub(crate) async fn poll_until<F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<bool, StepError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, StepError>>,
{
    let started = Instant::now();
    loop {
        if probe().await? {
            return Ok(true);
        }
        if started.elapsed() >= timeout {
            return Ok(false);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Error mapping for polling probes: session loss aborts the poll so
/// the retry wrapper can reinitialize; any other surface failure reads
/// as "condition not met yet".
pub(crate) fn not_yet(err: SurfaceError) -> Result<bool, StepError> {
    match err {
        SurfaceError::Unreachable(message) => Err(StepError::SessionUnreachable(message)),
        SurfaceError::Failure(message) => {
            log::debug!("probe failed, treating as pending: {message}");
            Ok(false)
        }
    }
}
