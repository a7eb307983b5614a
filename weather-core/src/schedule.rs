//! In-process hourly scheduler for hosts without one of their own.
//!
//! The job registration (its next run time) lives in the option store, so it
//! survives restarts the same way a hosting scheduler's registration would.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    error::WidgetError,
    refresh::{REFRESH_JOB, RefreshController, Scheduler},
    store::OptionStore,
};

fn interval() -> ChronoDuration {
    ChronoDuration::hours(1)
}

pub struct OptionScheduler {
    options: Arc<dyn OptionStore>,
}

impl OptionScheduler {
    pub fn new(options: Arc<dyn OptionStore>) -> Self {
        Self { options }
    }

    pub fn next_run(&self, job: &str) -> Result<Option<DateTime<Utc>>, WidgetError> {
        let Some(raw) = self.options.get(job)? else {
            return Ok(None);
        };
        DateTime::parse_from_rfc3339(raw.trim())
            .map(|at| Some(at.with_timezone(&Utc)))
            .map_err(|e| WidgetError::Store(format!("invalid schedule for {job}: {e}")))
    }

    pub fn is_due(&self, job: &str, now: DateTime<Utc>) -> Result<bool, WidgetError> {
        Ok(self.next_run(job)?.is_some_and(|at| at <= now))
    }

    /// Move the registration to the first slot of its hourly grid after `now`.
    /// Slots missed while nothing was running are skipped, not replayed.
    pub fn advance(&self, job: &str, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, WidgetError> {
        let Some(scheduled) = self.next_run(job)? else {
            return Ok(None);
        };
        let next = next_slot(scheduled, now);
        self.options.set(job, &next.to_rfc3339())?;
        Ok(Some(next))
    }
}

fn next_slot(scheduled: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let step = interval();
    let mut next = scheduled + step;
    if next <= now {
        let behind = (now - next).num_seconds() / step.num_seconds() + 1;
        next += step * behind as i32;
    }
    next
}

impl Scheduler for OptionScheduler {
    fn is_scheduled(&self, job: &str) -> Result<bool, WidgetError> {
        Ok(self.next_run(job)?.is_some())
    }

    fn schedule_hourly(&self, job: &str, first_run: DateTime<Utc>) -> Result<(), WidgetError> {
        self.options.set(job, &first_run.to_rfc3339())
    }

    fn unschedule(&self, job: &str) -> Result<(), WidgetError> {
        self.options.delete(job)
    }
}

/// Run the refresh job whenever it falls due until `shutdown` flips to true,
/// its sender is dropped, or the job is unregistered.
///
/// Option-store failures are logged and retried one interval later; they
/// never end the loop.
pub async fn run_hourly(
    controller: &RefreshController,
    scheduler: &OptionScheduler,
    shutdown: watch::Receiver<bool>,
) -> Result<(), WidgetError> {
    let retry = interval().to_std().unwrap_or(Duration::from_secs(3600));
    run_loop(controller, scheduler, shutdown, retry).await
}

async fn run_loop(
    controller: &RefreshController,
    scheduler: &OptionScheduler,
    mut shutdown: watch::Receiver<bool>,
    retry: Duration,
) -> Result<(), WidgetError> {
    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let next = match scheduler.next_run(REFRESH_JOB) {
            Ok(Some(next)) => next,
            Ok(None) => {
                info!("weather refresh is not scheduled; stopping");
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "failed to read refresh schedule; retrying later");
                if sleep_or_shutdown(retry, &mut shutdown).await {
                    return Ok(());
                }
                continue;
            }
        };

        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        debug!(next = %next, "waiting for next weather refresh");
        if sleep_or_shutdown(wait, &mut shutdown).await {
            return Ok(());
        }

        // The job may have been cancelled or moved while we slept.
        match scheduler.is_due(REFRESH_JOB, Utc::now()) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                warn!(error = %e, "failed to read refresh schedule; retrying later");
                if sleep_or_shutdown(retry, &mut shutdown).await {
                    return Ok(());
                }
                continue;
            }
        }

        let outcome = controller.on_tick().await;
        debug!(?outcome, "weather refresh tick finished");

        if let Err(e) = scheduler.advance(REFRESH_JOB, Utc::now()) {
            warn!(error = %e, "failed to record next weather refresh; retrying later");
            if sleep_or_shutdown(retry, &mut shutdown).await {
                return Ok(());
            }
        }
    }
}

/// Sleep for `wait`, returning true if shutdown was requested meanwhile.
async fn sleep_or_shutdown(wait: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(wait) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
