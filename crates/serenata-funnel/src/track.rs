//! Best-effort funnel analytics.
//!
//! Tracking never fails the caller: [`Tracker::track`] has no error type and
//! [`emit`] runs it on a detached task.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use serenata_core::model::{SongId, SongVersion};

use crate::config::FunnelMode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FunnelEvent {
    GenerationStarted {
        mode: FunnelMode,
    },
    SongReady {
        song_id: SongId,
        version: SongVersion,
    },
    GenerationFailed {
        reason: String,
    },
    ComparisonViewed {
        song_count: usize,
        source: String,
    },
    CheckoutStarted {
        song_ids: Vec<SongId>,
        bundle: bool,
        coupon_code: Option<String>,
    },
}

impl FunnelEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GenerationStarted { .. } => "generation_started",
            Self::SongReady { .. } => "song_ready",
            Self::GenerationFailed { .. } => "generation_failed",
            Self::ComparisonViewed { .. } => "comparison_viewed",
            Self::CheckoutStarted { .. } => "checkout_started",
        }
    }
}

#[async_trait]
pub trait Tracker: Send + Sync + fmt::Debug {
    /// Record an event. Implementations swallow their own failures.
    async fn track(&self, event: FunnelEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracker;

#[async_trait]
impl Tracker for NoopTracker {
    async fn track(&self, _event: FunnelEvent) {}
}

/// Send `event` without waiting for it.
pub fn emit(tracker: &Arc<dyn Tracker>, event: FunnelEvent) {
    log::debug!("Tracking {}", event.name());
    let tracker = Arc::clone(tracker);
    tokio::spawn(async move {
        tracker.track(event).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl Tracker for Recorder {
        async fn track(&self, event: FunnelEvent) {
            self.0.lock().unwrap().push(event.name().to_string());
        }
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = FunnelEvent::SongReady {
            song_id: SongId::new("s1"),
            version: SongVersion::Second,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "song_ready");
        assert_eq!(json["song_id"], "s1");
        assert_eq!(json["version"], 2);
    }

    #[tokio::test]
    async fn test_emit_delivers_in_background() {
        let recorder = Arc::new(Recorder::default());
        let tracker: Arc<dyn Tracker> = recorder.clone();
        emit(
            &tracker,
            FunnelEvent::GenerationStarted {
                mode: FunnelMode::Fast,
            },
        );
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(*recorder.0.lock().unwrap(), vec!["generation_started"]);
    }
}
