//! Platform event driver.
//!
//! Turns connectivity transitions and "sync now" requests from the host
//! platform into drain passes, and schedules follow-up passes with
//! exponential backoff when a pass leaves retryable failures behind.

use crate::config::RetryConfig;
use crate::engine::SyncEngine;
use crate::processor::SyncReport;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Signals delivered by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    /// The network became reachable or unreachable.
    ConnectivityChanged {
        /// New state.
        online: bool,
    },
    /// An operator or scheduler asked for an immediate drain.
    SyncRequested,
}

/// Backoff state between passes.
#[derive(Debug, Default)]
struct Backoff {
    attempt: u32,
    retry_at: Option<Instant>,
}

impl Backoff {
    fn reset(&mut self) {
        self.attempt = 0;
        self.retry_at = None;
    }

    /// Schedules the next follow-up pass. Returns false once attempts are exhausted.
    fn schedule(&mut self, retry: &RetryConfig) -> bool {
        if self.attempt >= retry.max_attempts {
            self.retry_at = None;
            return false;
        }
        self.attempt += 1;
        let delay = retry.delay_for_attempt(self.attempt);
        tracing::debug!(attempt = self.attempt, ?delay, "scheduling follow-up sync pass");
        self.retry_at = Some(Instant::now() + delay);
        true
    }
}

/// Consumes platform events until the sender side is dropped.
pub(crate) async fn run(
    engine: SyncEngine,
    mut events: mpsc::Receiver<PlatformEvent>,
    retry: RetryConfig,
) {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Option<SyncReport>>();
    let mut backoff = Backoff::default();

    tracing::debug!("platform driver started");
    loop {
        let retry_at = backoff.retry_at;
        let timer = async move {
            match retry_at {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                backoff.reset();
                match event {
                    PlatformEvent::ConnectivityChanged { online } => {
                        if engine.apply_connectivity(online) && online {
                            spawn_pass(&engine, &done_tx);
                        }
                    }
                    PlatformEvent::SyncRequested => spawn_pass(&engine, &done_tx),
                }
            }
            Some(report) = done_rx.recv() => {
                match report {
                    Some(report) if report.needs_retry() && engine.is_online() => {
                        if !backoff.schedule(&retry) {
                            tracing::warn!(
                                attempts = retry.max_attempts,
                                remaining = report.remaining,
                                "follow-up passes exhausted"
                            );
                        }
                    }
                    Some(_) => backoff.reset(),
                    None => {}
                }
            }
            () = timer => {
                backoff.retry_at = None;
                spawn_pass(&engine, &done_tx);
            }
        }
    }
    tracing::debug!("platform driver stopped");
}

fn spawn_pass(engine: &SyncEngine, done: &mpsc::UnboundedSender<Option<SyncReport>>) {
    let engine = engine.clone();
    let done = done.clone();
    tokio::spawn(async move {
        let report = engine.process_queue().await;
        let _ = done.send(report);
    });
}
