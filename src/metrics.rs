use crate::{CaptureError, Trigger};
use metrics::{register_counter, register_histogram, Counter, Histogram};
use std::time::Duration;

/// Capture counters and histograms
///
/// Handles are registered against the global recorder; without one installed
/// every update is a no-op.
pub struct Metrics {
    pub captures_written: Counter,
    pub capture_failures: Counter,
    pub trigger_ready: Counter,
    pub trigger_alert: Counter,
    pub trigger_max_wait: Counter,
    pub failed_loads: Counter,
    pub time_to_trigger: Histogram,
    pub snapshot_bytes: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            captures_written: register_counter!("page_capture_written_total"),
            capture_failures: register_counter!("page_capture_failed_total"),
            trigger_ready: register_counter!("page_capture_trigger_total", "trigger" => "ready"),
            trigger_alert: register_counter!("page_capture_trigger_total", "trigger" => "alert"),
            trigger_max_wait: register_counter!(
                "page_capture_trigger_total",
                "trigger" => "max-wait"
            ),
            failed_loads: register_counter!("page_capture_failed_loads_total"),
            time_to_trigger: register_histogram!("page_capture_time_to_trigger_seconds"),
            snapshot_bytes: register_histogram!("page_capture_snapshot_bytes"),
        }
    }

    pub fn record_trigger(&self, trigger: Trigger, elapsed: Duration) {
        match trigger {
            Trigger::Ready => self.trigger_ready.increment(1),
            Trigger::AlertMatched => self.trigger_alert.increment(1),
            Trigger::MaxWait => self.trigger_max_wait.increment(1),
        }
        self.time_to_trigger.record(elapsed.as_secs_f64());
    }

    pub fn record_failed_load(&self) {
        self.failed_loads.increment(1);
    }

    pub fn record_capture(&self, result: Result<usize, &CaptureError>) {
        match result {
            Ok(bytes) => {
                self.captures_written.increment(1);
                self.snapshot_bytes.record(bytes as f64);
            }
            Err(_) => self.capture_failures.increment(1),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
