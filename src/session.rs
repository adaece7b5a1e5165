//! One capture run
//!
//! The session owns the readiness tracker, the snapshot writer and the
//! receiving end of the page host's event channel. Its loop selects over page
//! events, the pending fire timer and the max-wait deadline, and performs the
//! capture exactly once.

use crate::{
    CaptureConfig, CaptureError, Directive, Metrics, PageEvent, PageEvents, PageHost,
    ReadinessTracker, SnapshotSummary, SnapshotWriter, Trigger,
};
use chrono::{DateTime, Utc};
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant, Sleep};
use tracing::{debug, info, info_span, warn, Instrument};

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub session_id: String,
    pub trigger: Trigger,
    /// Outcome of the page load, if the host reported one before capture
    pub load_ok: Option<bool>,
    /// Time from load start to the trigger
    pub elapsed: Duration,
    /// Wall-clock time the trigger fired
    pub captured_at: DateTime<Utc>,
    pub snapshot: SnapshotSummary,
}

/// A fire timer armed from a [`Directive::Schedule`].
struct PendingFire {
    timer: Pin<Box<Sleep>>,
    trigger: Trigger,
}

pub struct CaptureSession<H: PageHost> {
    id: String,
    config: CaptureConfig,
    host: H,
    events: PageEvents,
    tracker: ReadinessTracker,
    writer: SnapshotWriter,
    metrics: Metrics,
    shutdown: Option<broadcast::Receiver<()>>,
}

impl<H: PageHost> CaptureSession<H> {
    /// `events` must be the receiver paired with the sink `host` was built with.
    pub fn new(config: CaptureConfig, host: H, events: PageEvents) -> Self {
        let tracker = ReadinessTracker::new(config.settings.delay, config.expected_alert.clone());
        let writer = SnapshotWriter::from_config(&config);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            config,
            host,
            events,
            tracker,
            writer,
            metrics: Metrics::new(),
            shutdown: None,
        }
    }

    /// Abandon the wait with [`CaptureError::Interrupted`] when `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Load the page, wait for the trigger, write the snapshot once.
    ///
    /// The host is shut down before returning, whatever the result.
    pub async fn run(mut self) -> Result<CaptureOutcome, CaptureError> {
        let span = info_span!("capture", session = %self.id);
        async move {
            let result = self.capture().await;
            self.host.shutdown().await;
            self.metrics
                .record_capture(result.as_ref().map(|o| o.snapshot.bytes));
            result
        }
        .instrument(span)
        .await
    }

    async fn capture(&mut self) -> Result<CaptureOutcome, CaptureError> {
        let started = Instant::now();
        info!("Loading {}", self.config.request.url);

        self.host
            .set_viewport_size(self.config.settings.min_viewport)
            .await?;
        self.host.load(&self.config.request).await?;

        let max_wait = self.config.settings.max_wait;
        let mut deadline: Option<Pin<Box<Sleep>>> =
            (!max_wait.is_zero()).then(|| Box::pin(sleep(max_wait)));
        let mut pending: Option<PendingFire> = None;
        let mut events_open = true;
        let mut shutdown = self.shutdown.take();

        let trigger = loop {
            let directive = tokio::select! {
                maybe_event = self.events.recv(), if events_open => match maybe_event {
                    Some(event) => self.handle_event(event),
                    None => {
                        // Timers already armed may still trigger the capture.
                        events_open = false;
                        if pending.is_none() && deadline.is_none() {
                            return Err(CaptureError::EventStreamClosed);
                        }
                        Directive::Wait
                    }
                },
                _ = async {
                    if let Some(fire) = pending.as_mut() {
                        fire.timer.as_mut().await;
                    }
                }, if pending.is_some() => {
                    match pending.take() {
                        Some(fire) => Directive::Fire(fire.trigger),
                        None => Directive::Wait,
                    }
                }
                _ = async {
                    if let Some(timer) = deadline.as_mut() {
                        timer.as_mut().await;
                    }
                }, if deadline.is_some() => {
                    deadline = None;
                    info!("Max wait of {:?} elapsed", max_wait);
                    self.tracker.on_max_wait_timeout()
                }
                _ = shutdown_requested(&mut shutdown),
                    if shutdown.is_some() && (events_open || pending.is_some() || deadline.is_some()) =>
                {
                    warn!("Shutdown requested while waiting for the page");
                    return Err(CaptureError::Interrupted);
                }
                else => return Err(CaptureError::EventStreamClosed),
            };

            match directive {
                Directive::Wait => {}
                Directive::Schedule { after, trigger } => {
                    arm(&mut pending, after, trigger);
                }
                Directive::Fire(trigger) => {
                    if self.tracker.fire() {
                        break trigger;
                    }
                }
            }
        };

        let elapsed = started.elapsed();
        let captured_at = Utc::now();
        info!("Capture triggered by {} after {:?}", trigger, elapsed);
        self.metrics.record_trigger(trigger, elapsed);

        let snapshot = self.writer.write(&mut self.host).await?;

        Ok(CaptureOutcome {
            session_id: self.id.clone(),
            trigger,
            load_ok: self.tracker.load_ok(),
            elapsed,
            captured_at,
            snapshot,
        })
    }

    fn handle_event(&mut self, event: PageEvent) -> Directive {
        match event {
            PageEvent::InitialLayoutCompleted => {
                debug!("Initial layout completed");
                self.tracker.on_initial_layout()
            }
            PageEvent::LoadFinished { ok } => {
                if ok {
                    debug!("Document load finished");
                } else {
                    warn!(
                        "Loading {} reported failure; capturing anyway",
                        self.config.request.url
                    );
                    self.metrics.record_failed_load();
                }
                self.tracker.on_document_complete(ok)
            }
            PageEvent::ScriptAlert(text) => {
                if self.config.settings.print_alerts {
                    info!("[alert] {}", text);
                } else {
                    debug!("[alert] {}", text);
                }
                self.tracker.on_alert(&text)
            }
        }
    }
}

/// Resolves on a shutdown broadcast. A dropped sender means no signal will come.
async fn shutdown_requested(shutdown: &mut Option<broadcast::Receiver<()>>) {
    if let Some(rx) = shutdown.as_mut() {
        if let Err(broadcast::error::RecvError::Closed) = rx.recv().await {
            std::future::pending::<()>().await;
        }
    }
}

/// Keep whichever fire timer elapses first.
fn arm(pending: &mut Option<PendingFire>, after: Duration, trigger: Trigger) {
    let deadline = Instant::now() + after;
    if let Some(existing) = pending {
        if existing.timer.deadline() <= deadline {
            return;
        }
    }
    *pending = Some(PendingFire {
        timer: Box::pin(sleep(after)),
        trigger,
    });
}
