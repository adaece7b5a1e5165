//! Capture readiness state machine
//!
//! The tracker merges the independent page signals into a single decision.
//! It owns no timers: every handler returns a [`Directive`] and the caller
//! arms whatever timer the directive asks for. When a timer elapses the caller
//! invokes [`ReadinessTracker::fire`], which succeeds exactly once.

use std::fmt;
use std::time::Duration;

/// Grace period between a matching alert and the capture, so that script
/// work queued by the alerting code can finish painting.
pub const ALERT_GRACE: Duration = Duration::from_millis(10);

/// Explicit session phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for both initial layout and document completion.
    AwaitingLoad,
    /// Loaded; waiting for the delay, the alert gate or max-wait.
    AwaitingGate,
    /// Terminal. Entered exactly once.
    Captured,
}

/// Coarse readiness as seen from outside the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    ReadyPendingDelay,
    Captured,
}

/// Which path asked for the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Layout and document both complete, gate open.
    Ready,
    /// The expected script alert fired.
    AlertMatched,
    /// The max-wait deadline elapsed.
    MaxWait,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Ready => "ready",
            Trigger::AlertMatched => "alert",
            Trigger::MaxWait => "max-wait",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller must do after feeding a signal to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Nothing to do yet.
    Wait,
    /// Arm a one-shot timer; call [`ReadinessTracker::fire`] when it elapses.
    Schedule { after: Duration, trigger: Trigger },
    /// Call [`ReadinessTracker::fire`] now.
    Fire(Trigger),
}

#[derive(Debug, Clone)]
pub struct ReadinessTracker {
    delay: Duration,
    expected_alert: Option<String>,
    saw_initial_layout: bool,
    saw_document_complete: bool,
    load_ok: Option<bool>,
    alert_matched: bool,
    fire_scheduled: bool,
    phase: Phase,
}

impl ReadinessTracker {
    /// An empty `expected_alert` leaves the ready path ungated.
    pub fn new(delay: Duration, expected_alert: Option<String>) -> Self {
        Self {
            delay,
            expected_alert: expected_alert.filter(|text| !text.is_empty()),
            saw_initial_layout: false,
            saw_document_complete: false,
            load_ok: None,
            alert_matched: false,
            fire_scheduled: false,
            phase: Phase::AwaitingLoad,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn readiness(&self) -> Readiness {
        match self.phase {
            Phase::Captured => Readiness::Captured,
            _ if self.fire_scheduled => Readiness::ReadyPendingDelay,
            _ => Readiness::Pending,
        }
    }

    pub fn is_captured(&self) -> bool {
        self.phase == Phase::Captured
    }

    /// Result of the last document load, if one was reported.
    pub fn load_ok(&self) -> Option<bool> {
        self.load_ok
    }

    pub fn saw_initial_layout(&self) -> bool {
        self.saw_initial_layout
    }

    pub fn saw_document_complete(&self) -> bool {
        self.saw_document_complete
    }

    /// Open when no alert is expected, or once the expected alert matched.
    pub fn gate_open(&self) -> bool {
        self.expected_alert.is_none() || self.alert_matched
    }

    pub fn on_initial_layout(&mut self) -> Directive {
        if self.is_captured() {
            return Directive::Wait;
        }
        self.saw_initial_layout = true;
        self.advance()
    }

    /// A failed load still counts as complete so that error pages are captured.
    pub fn on_document_complete(&mut self, ok: bool) -> Directive {
        if self.is_captured() {
            return Directive::Wait;
        }
        self.saw_document_complete = true;
        self.load_ok = Some(ok);
        self.advance()
    }

    fn advance(&mut self) -> Directive {
        if self.phase == Phase::AwaitingLoad && self.saw_initial_layout && self.saw_document_complete
        {
            self.phase = Phase::AwaitingGate;
            return self.evaluate_ready();
        }
        Directive::Wait
    }

    /// Decide whether the loaded page may be captured through the normal path.
    pub fn evaluate_ready(&mut self) -> Directive {
        if self.phase != Phase::AwaitingGate || self.fire_scheduled {
            return Directive::Wait;
        }
        if self.expected_alert.is_some() {
            // The alert path schedules its own fire.
            return Directive::Wait;
        }
        self.fire_scheduled = true;
        if self.delay.is_zero() {
            Directive::Fire(Trigger::Ready)
        } else {
            Directive::Schedule {
                after: self.delay,
                trigger: Trigger::Ready,
            }
        }
    }

    pub fn on_alert(&mut self, text: &str) -> Directive {
        if self.is_captured() || self.alert_matched {
            return Directive::Wait;
        }
        match &self.expected_alert {
            Some(expected) if expected == text => {
                self.alert_matched = true;
                self.fire_scheduled = true;
                Directive::Schedule {
                    after: ALERT_GRACE,
                    trigger: Trigger::AlertMatched,
                }
            }
            _ => Directive::Wait,
        }
    }

    pub fn on_max_wait_timeout(&mut self) -> Directive {
        if self.is_captured() {
            return Directive::Wait;
        }
        Directive::Fire(Trigger::MaxWait)
    }

    /// Enter `Captured`. Returns `true` only for the first call.
    pub fn fire(&mut self) -> bool {
        if self.is_captured() {
            return false;
        }
        self.phase = Phase::Captured;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENTS: [Event; 4] = [
        Event::Layout,
        Event::Document,
        Event::Alert,
        Event::MaxWait,
    ];

    #[derive(Debug, Clone, Copy)]
    enum Event {
        Layout,
        Document,
        Alert,
        MaxWait,
    }

    /// Feed events and honour every directive immediately; count fires.
    fn drive(tracker: &mut ReadinessTracker, events: &[Event]) -> usize {
        let mut fires = 0;
        for event in events {
            let directive = match event {
                Event::Layout => tracker.on_initial_layout(),
                Event::Document => tracker.on_document_complete(true),
                Event::Alert => tracker.on_alert("done"),
                Event::MaxWait => tracker.on_max_wait_timeout(),
            };
            if directive != Directive::Wait && tracker.fire() {
                fires += 1;
            }
        }
        fires
    }

    fn permutations(items: &[Event]) -> Vec<Vec<Event>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head);
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn layout_then_document_fires_immediately_without_delay() {
        let mut tracker = ReadinessTracker::new(Duration::ZERO, None);
        assert_eq!(tracker.on_initial_layout(), Directive::Wait);
        assert_eq!(tracker.phase(), Phase::AwaitingLoad);
        assert_eq!(
            tracker.on_document_complete(true),
            Directive::Fire(Trigger::Ready)
        );
        assert_eq!(tracker.phase(), Phase::AwaitingGate);
        assert!(tracker.fire());
        assert_eq!(tracker.readiness(), Readiness::Captured);
    }

    #[test]
    fn empty_expected_alert_does_not_gate() {
        let mut tracker = ReadinessTracker::new(Duration::ZERO, Some(String::new()));
        tracker.on_initial_layout();
        assert_eq!(
            tracker.on_document_complete(true),
            Directive::Fire(Trigger::Ready)
        );
    }

    #[test]
    fn document_before_layout_is_also_ready() {
        let mut tracker = ReadinessTracker::new(Duration::ZERO, None);
        assert_eq!(tracker.on_document_complete(true), Directive::Wait);
        assert_eq!(tracker.on_initial_layout(), Directive::Fire(Trigger::Ready));
    }

    #[test]
    fn delay_schedules_a_timer_once() {
        let mut tracker = ReadinessTracker::new(Duration::from_millis(300), None);
        tracker.on_initial_layout();
        assert_eq!(
            tracker.on_document_complete(true),
            Directive::Schedule {
                after: Duration::from_millis(300),
                trigger: Trigger::Ready,
            }
        );
        assert_eq!(tracker.readiness(), Readiness::ReadyPendingDelay);
        // Repeated load signals do not stack timers.
        assert_eq!(tracker.on_document_complete(true), Directive::Wait);
        assert_eq!(tracker.evaluate_ready(), Directive::Wait);
    }

    #[test]
    fn failed_load_still_counts_as_complete() {
        let mut tracker = ReadinessTracker::new(Duration::ZERO, None);
        tracker.on_initial_layout();
        assert_eq!(
            tracker.on_document_complete(false),
            Directive::Fire(Trigger::Ready)
        );
        assert_eq!(tracker.load_ok(), Some(false));
    }

    #[test]
    fn closed_gate_blocks_normal_path() {
        let mut tracker = ReadinessTracker::new(Duration::ZERO, Some("done".to_string()));
        tracker.on_initial_layout();
        assert_eq!(tracker.on_document_complete(true), Directive::Wait);
        assert_eq!(tracker.phase(), Phase::AwaitingGate);
        assert_eq!(tracker.readiness(), Readiness::Pending);
        assert!(!tracker.gate_open());

        assert_eq!(tracker.on_alert("not yet"), Directive::Wait);
        assert_eq!(
            tracker.on_alert("done"),
            Directive::Schedule {
                after: ALERT_GRACE,
                trigger: Trigger::AlertMatched,
            }
        );
        assert!(tracker.gate_open());
    }

    #[test]
    fn alert_must_match_exactly() {
        let mut tracker = ReadinessTracker::new(Duration::ZERO, Some("done".to_string()));
        assert_eq!(tracker.on_alert("Done"), Directive::Wait);
        assert_eq!(tracker.on_alert("done "), Directive::Wait);
    }

    #[test]
    fn alert_before_load_signals_still_schedules() {
        let mut tracker = ReadinessTracker::new(Duration::ZERO, Some("done".to_string()));
        assert!(matches!(
            tracker.on_alert("done"),
            Directive::Schedule {
                trigger: Trigger::AlertMatched,
                ..
            }
        ));
        // Loading afterwards does not schedule a second fire.
        tracker.on_initial_layout();
        assert_eq!(tracker.on_document_complete(true), Directive::Wait);
    }

    #[test]
    fn alerts_are_ignored_without_expected_alert() {
        let mut tracker = ReadinessTracker::new(Duration::ZERO, None);
        assert_eq!(tracker.on_alert("done"), Directive::Wait);
        assert!(tracker.gate_open());
    }

    #[test]
    fn max_wait_fires_from_any_phase() {
        let mut tracker = ReadinessTracker::new(Duration::ZERO, Some("done".to_string()));
        assert_eq!(
            tracker.on_max_wait_timeout(),
            Directive::Fire(Trigger::MaxWait)
        );
        assert!(tracker.fire());
        assert_eq!(tracker.on_max_wait_timeout(), Directive::Wait);
        assert_eq!(tracker.on_alert("done"), Directive::Wait);
        assert_eq!(tracker.on_initial_layout(), Directive::Wait);
    }

    #[test]
    fn fire_is_idempotent() {
        let mut tracker = ReadinessTracker::new(Duration::ZERO, None);
        assert!(tracker.fire());
        assert!(!tracker.fire());
        assert!(!tracker.fire());
    }

    #[test]
    fn every_interleaving_fires_exactly_once() {
        for expected in [None, Some("done".to_string())] {
            for delay in [Duration::ZERO, Duration::from_millis(50)] {
                for order in permutations(&EVENTS) {
                    let mut tracker = ReadinessTracker::new(delay, expected.clone());
                    let fires = drive(&mut tracker, &order);
                    assert_eq!(fires, 1, "order {order:?}, alert {expected:?}");
                    assert!(tracker.is_captured());
                }
            }
        }
    }

    #[test]
    fn interleavings_without_trigger_never_fire() {
        // Gate closed and no alert or max-wait: nothing may fire.
        for order in permutations(&[Event::Layout, Event::Document]) {
            let mut tracker = ReadinessTracker::new(Duration::ZERO, Some("done".to_string()));
            assert_eq!(drive(&mut tracker, &order), 0);
            assert!(!tracker.is_captured());
        }
    }
}
