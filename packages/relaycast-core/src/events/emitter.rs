//! Event emitter abstraction for decoupling services from observers.
//!
//! Services depend on the [`EventEmitter`] trait rather than a concrete sink,
//! enabling testing and alternative front ends.

use super::{SessionEvent, StreamEvent};

/// Trait for emitting domain events without knowledge of who consumes them.
///
/// # Example
///
/// ```ignore
/// struct MyService {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl MyService {
///     fn do_something(&self) {
///         self.emitter.emit_stream(StreamEvent::ServerDestroyed { timestamp: now_millis() });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a streaming server event.
    fn emit_stream(&self, event: StreamEvent);

    /// Emits a playback session event.
    fn emit_session(&self, event: SessionEvent);
}

/// No-op emitter for tests and embedders that only care about results.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_stream(&self, _event: StreamEvent) {}

    fn emit_session(&self, _event: SessionEvent) {}
}

/// Logging emitter used by the command-line caster.
///
/// Emits every event as a structured `tracing` event at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_stream(&self, event: StreamEvent) {
        tracing::debug!(?event, "stream_event");
    }

    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, "session_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Test emitter that counts events.
    struct CountingEventEmitter {
        stream_count: AtomicUsize,
        session_count: AtomicUsize,
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit_stream(&self, _event: StreamEvent) {
            self.stream_count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_session(&self, _event: SessionEvent) {
            self.session_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn counting_emitter_tracks_events() {
        let emitter = Arc::new(CountingEventEmitter {
            stream_count: AtomicUsize::new(0),
            session_count: AtomicUsize::new(0),
        });
        let dyn_emitter: Arc<dyn EventEmitter> = emitter.clone();

        dyn_emitter.emit_stream(StreamEvent::ServerDestroyed { timestamp: 0 });
        dyn_emitter.emit_session(SessionEvent::SpeedChanged {
            speed: "2".to_string(),
            timestamp: 0,
        });
        dyn_emitter.emit_session(SessionEvent::Ended {
            items_played: 1,
            items_skipped: 0,
            timestamp: 0,
        });

        assert_eq!(emitter.stream_count.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.session_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn logging_emitter_accepts_events() {
        LoggingEventEmitter.emit_stream(StreamEvent::ServerDestroyed { timestamp: 0 });
    }
}
