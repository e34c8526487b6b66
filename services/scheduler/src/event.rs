//! The scheduler's event bus.
//!
//! Each significant handler publishes exactly one event when it completes
//! (plus per-job events for placements and adoptions). Events fan out over a
//! broadcast channel: every subscriber gets its own bounded buffer, and a
//! subscriber that falls behind loses its oldest events — surfaced to it as
//! [`EventStreamError::Lagged`] — without back-pressuring the loop.
//! Subscribers that keep up all observe the same sequence in loop order.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::error::SchedulerError;
use crate::job::Job;

/// Tag identifying which handler produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Default,
    ClusterSync,
    FormationSync,
    FormationChange,
    RectifyJobs,
    #[serde(rename = "start-job")]
    JobStart,
    #[serde(rename = "stop-job")]
    JobStop,
}

impl EventKind {
    /// The wire name of this event kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Default => "default",
            EventKind::ClusterSync => "cluster-sync",
            EventKind::FormationSync => "formation-sync",
            EventKind::FormationChange => "formation-change",
            EventKind::RectifyJobs => "rectify-jobs",
            EventKind::JobStart => "start-job",
            EventKind::JobStop => "stop-job",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event published on the scheduler bus.
///
/// Every event carries its kind and an optional error; job-start events
/// additionally carry the started (or adopted) job, absent when the start
/// failed.
#[derive(Debug, Clone)]
pub enum Event {
    Default {
        kind: EventKind,
        error: Option<SchedulerError>,
    },
    JobStart {
        job: Option<Job>,
        error: Option<SchedulerError>,
    },
}

impl Event {
    pub fn new(kind: EventKind, error: Option<SchedulerError>) -> Self {
        match kind {
            EventKind::JobStart => Event::JobStart { job: None, error },
            kind => Event::Default { kind, error },
        }
    }

    pub fn job_start(job: Option<Job>, error: Option<SchedulerError>) -> Self {
        Event::JobStart { job, error }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Default { kind, .. } => *kind,
            Event::JobStart { .. } => EventKind::JobStart,
        }
    }

    pub fn error(&self) -> Option<&SchedulerError> {
        match self {
            Event::Default { error, .. } | Event::JobStart { error, .. } => error.as_ref(),
        }
    }

    /// The job attached to a job-start event, if any.
    pub fn job(&self) -> Option<&Job> {
        match self {
            Event::JobStart { job, .. } => job.as_ref(),
            Event::Default { .. } => None,
        }
    }
}

/// Errors observed on a subscription.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EventStreamError {
    /// The scheduler was dropped; no further events will arrive.
    #[error("event stream closed")]
    Closed,

    /// This subscriber fell behind and `missed` events were dropped for it.
    /// The stream continues from the oldest retained event.
    #[error("subscriber lagged, {missed} events dropped")]
    Lagged { missed: u64 },
}

/// Handle to a live event subscription.
///
/// Dropping the stream unsubscribes. Streams are not closed when the
/// scheduler stops — owners observe [`EventStreamError::Closed`] once the
/// scheduler itself is dropped and the bus drains.
pub struct EventStream {
    rx: broadcast::Receiver<Event>,
}

impl EventStream {
    pub(crate) fn new(rx: broadcast::Receiver<Event>) -> Self {
        Self { rx }
    }

    /// Receives the next event, in the loop's publication order.
    pub async fn recv(&mut self) -> Result<Event, EventStreamError> {
        match self.rx.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Closed) => Err(EventStreamError::Closed),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                Err(EventStreamError::Lagged { missed })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_wire_names() {
        assert_eq!(EventKind::Default.as_str(), "default");
        assert_eq!(EventKind::ClusterSync.as_str(), "cluster-sync");
        assert_eq!(EventKind::FormationSync.as_str(), "formation-sync");
        assert_eq!(EventKind::FormationChange.as_str(), "formation-change");
        assert_eq!(EventKind::RectifyJobs.as_str(), "rectify-jobs");
        assert_eq!(EventKind::JobStart.as_str(), "start-job");
        assert_eq!(EventKind::JobStop.as_str(), "stop-job");
    }

    #[test]
    fn test_event_kind_serde_matches_as_str() {
        for kind in [
            EventKind::Default,
            EventKind::ClusterSync,
            EventKind::FormationSync,
            EventKind::FormationChange,
            EventKind::RectifyJobs,
            EventKind::JobStart,
            EventKind::JobStop,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            let parsed: EventKind = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_new_routes_job_start_kind_to_job_variant() {
        let event = Event::new(EventKind::JobStart, None);
        assert_eq!(event.kind(), EventKind::JobStart);
        assert!(event.job().is_none());

        let event = Event::new(EventKind::ClusterSync, Some(SchedulerError::NoHosts));
        assert_eq!(event.kind(), EventKind::ClusterSync);
        assert!(matches!(event.error(), Some(SchedulerError::NoHosts)));
        assert!(event.job().is_none());
    }
}
