//! Background scheduler: one task per open document.
//!
//! The task runs a cycle right away (initial load), then on every timer
//! tick, and after a debounced burst of local edits. Wakes go through a
//! capacity-1 channel so any number of edits collapse into one pending
//! wake. A burst never delays its cycle by more than one sync interval.

use crate::error::{SyncError, SyncResult};
use crate::state::SyncEngine;
use crate::transport::SyncTransport;
use std::sync::Arc;
use stepsync_protocol::{Step, StepTransform};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, info_span, warn, Instrument};

/// Drives a [`SyncEngine`] from a background task.
pub struct SyncScheduler<T: StepTransform, X: SyncTransport> {
    engine: Arc<SyncEngine<T, X>>,
    wake_rx: mpsc::Receiver<()>,
    shutdown_rx: watch::Receiver<bool>,
    failures: u32,
    backoff_until: Option<Instant>,
}

/// Handle to a running scheduler.
///
/// Dropping the handle stops the scheduler after its current cycle.
pub struct SyncHandle<T: StepTransform, X: SyncTransport> {
    engine: Arc<SyncEngine<T, X>>,
    wake_tx: mpsc::Sender<()>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<T, X> SyncScheduler<T, X>
where
    T: StepTransform + 'static,
    X: SyncTransport + 'static,
{
    /// Starts the background task on the current tokio runtime.
    pub fn spawn(engine: Arc<SyncEngine<T, X>>) -> SyncHandle<T, X> {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = Self {
            engine: Arc::clone(&engine),
            wake_rx,
            shutdown_rx,
            failures: 0,
            backoff_until: None,
        };
        let task = tokio::spawn(scheduler.run());

        SyncHandle {
            engine,
            wake_tx,
            shutdown_tx,
            task,
        }
    }

    async fn run(mut self) {
        let span = info_span!(
            "sync_scheduler",
            doc = %self.engine.doc_id(),
            session = %self.engine.session_id()
        );
        async move {
            info!("starting sync scheduler");
            let mut ticker = interval(self.engine.config().sync_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                // The first tick completes immediately and performs the initial load.
                let keep_going = tokio::select! {
                    biased;

                    _ = self.shutdown_rx.changed() => false,

                    _ = ticker.tick() => self.cycle().await,

                    Some(()) = self.wake_rx.recv() => {
                        self.debounce().await && self.cycle().await
                    }
                };
                if !keep_going {
                    break;
                }
            }
            info!("sync scheduler stopped");
        }
        .instrument(span)
        .await
    }

    /// Waits until no edit has arrived for the debounce window, or until a
    /// full sync interval has passed since the first wake, whichever comes
    /// first. A steady stream of edits still syncs once per interval.
    ///
    /// Returns false on shutdown.
    async fn debounce(&mut self) -> bool {
        let quiet = self.engine.config().debounce;
        let deadline = sleep(self.engine.config().sync_interval);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => return false,

                _ = &mut deadline => {
                    debug!("edits kept arriving, syncing without a quiet window");
                    return true;
                }

                Some(()) = self.wake_rx.recv() => continue,

                _ = sleep(quiet) => return true,
            }
        }
    }

    /// Runs one cycle. Returns false once the engine is closed.
    async fn cycle(&mut self) -> bool {
        if let Some(until) = self.backoff_until {
            if Instant::now() < until {
                debug!("backing off, skipping cycle");
                return true;
            }
        }

        match self.engine.sync_cycle().await {
            Ok(_) => {
                self.failures = 0;
                self.backoff_until = None;
                true
            }
            Err(SyncError::Closed) => false,
            Err(SyncError::CycleInProgress) => {
                debug!("cycle already in flight");
                true
            }
            Err(e) => {
                self.failures = self.failures.saturating_add(1);
                let delay = self.engine.config().backoff.delay_for_failures(self.failures);
                self.backoff_until = Some(Instant::now() + delay);
                warn!(error = %e, failures = self.failures, ?delay, "sync cycle failed");
                true
            }
        }
    }
}

impl<T: StepTransform, X: SyncTransport> SyncHandle<T, X> {
    /// The engine being driven.
    pub fn engine(&self) -> &Arc<SyncEngine<T, X>> {
        &self.engine
    }

    /// Requests a debounced cycle. Wakes coalesce.
    pub fn notify(&self) {
        // A full channel already holds a pending wake.
        let _ = self.wake_tx.try_send(());
    }

    /// Applies a local edit and schedules a debounced cycle.
    pub fn edit(&self, step: Step) -> SyncResult<()> {
        self.engine.local_edit(step)?;
        self.notify();
        Ok(())
    }

    /// Closes the session and waits for the background task to stop.
    ///
    /// A network call already in flight runs to completion (bounded by the
    /// request timeout) and its result is discarded.
    pub async fn shutdown(self) {
        self.engine.close();
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "sync scheduler task failed");
        }
    }
}
