//! The rendering engine contract
//!
//! A [`PageHost`] is constructed with an [`EventSink`] and reports lifecycle
//! events through it; the capture session owns the matching [`PageEvents`]
//! receiver. Rendering primitives are called by the snapshot writer only.

use crate::{CaptureError, PageRequest, PrintSurface, RenderSurface, Viewport};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Asynchronous notifications from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// Layout produced a non-trivial content size.
    InitialLayoutCompleted,
    /// Navigation settled, successfully or not.
    LoadFinished { ok: bool },
    /// Page script called `alert(text)`.
    ScriptAlert(String),
}

/// Sending half handed to a page host at construction.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<PageEvent>,
}

impl EventSink {
    /// Returns `false` once the session has stopped listening.
    pub fn send(&self, event: PageEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn initial_layout_completed(&self) -> bool {
        self.send(PageEvent::InitialLayoutCompleted)
    }

    pub fn load_finished(&self, ok: bool) -> bool {
        self.send(PageEvent::LoadFinished { ok })
    }

    pub fn script_alert(&self, text: impl Into<String>) -> bool {
        self.send(PageEvent::ScriptAlert(text.into()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half owned by the capture session.
#[derive(Debug)]
pub struct PageEvents {
    rx: mpsc::UnboundedReceiver<PageEvent>,
}

impl PageEvents {
    pub async fn recv(&mut self) -> Option<PageEvent> {
        self.rx.recv().await
    }
}

/// Create a connected sink/receiver pair.
pub fn page_events() -> (EventSink, PageEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, PageEvents { rx })
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageHost: Send {
    /// Begin navigation. Completion is reported through the event sink.
    async fn load(&mut self, request: &PageRequest) -> Result<(), CaptureError>;

    async fn set_viewport_size(&mut self, size: Viewport) -> Result<(), CaptureError>;

    /// Natural size of the rendered content.
    async fn content_size(&mut self) -> Result<Viewport, CaptureError>;

    /// Paint the current page state into a vector or raster surface.
    async fn render_into(&mut self, surface: &mut RenderSurface) -> Result<(), CaptureError>;

    /// Paginate the current page state onto fixed-size pages.
    async fn paginate_into(&mut self, surface: &mut PrintSurface) -> Result<(), CaptureError>;

    async fn extract_text(&mut self) -> Result<String, CaptureError>;

    async fn extract_html(&mut self) -> Result<String, CaptureError>;

    async fn extract_layout_dump(&mut self) -> Result<String, CaptureError>;

    /// Release engine resources. Called once, after capture.
    async fn shutdown(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sink_delivers_in_order() {
        let (sink, mut events) = page_events();
        assert!(sink.initial_layout_completed());
        assert!(sink.script_alert("hello"));
        assert!(sink.load_finished(false));

        assert_eq!(events.recv().await, Some(PageEvent::InitialLayoutCompleted));
        assert_eq!(
            events.recv().await,
            Some(PageEvent::ScriptAlert("hello".to_string()))
        );
        assert_eq!(events.recv().await, Some(PageEvent::LoadFinished { ok: false }));
    }

    #[tokio::test]
    async fn sink_reports_dropped_session() {
        let (sink, events) = page_events();
        drop(events);
        assert!(sink.is_closed());
        assert!(!sink.load_finished(true));
    }

    #[tokio::test]
    async fn receiver_ends_when_all_sinks_drop() {
        let (sink, mut events) = page_events();
        let clone = sink.clone();
        drop(sink);
        clone.load_finished(true);
        drop(clone);
        assert_eq!(events.recv().await, Some(PageEvent::LoadFinished { ok: true }));
        assert_eq!(events.recv().await, None);
    }
}
