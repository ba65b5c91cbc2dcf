//! Per-subscriber live view of a session: one snapshot, a short replay of
//! recent events, every newly committed event and periodic heartbeats.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::errors::InputError;
use crate::events::AgentEvent;
use crate::flows::{SessionStatus, WorkflowStage};
use crate::session::{Session, SessionStore};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StreamSnapshot {
    pub session_id: String,
    pub status: SessionStatus,
    pub stage: WorkflowStage,
    pub current_agent: String,
    pub event_count: usize,
    pub last_updated: DateTime<Utc>,
}

impl From<&Session> for StreamSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            status: session.status,
            stage: session.state.stage,
            current_agent: session.state.current_agent.clone(),
            event_count: session.events.len(),
            last_updated: session.last_updated,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StreamMessage {
    Snapshot(StreamSnapshot),
    Event(AgentEvent),
    Heartbeat { at: DateTime<Utc> },
}

impl StreamMessage {
    /// Name used for the SSE `event:` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::Event(_) => "agent_event",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}

pub struct EventStreamGateway {
    store: Arc<SessionStore>,
    replay_events: usize,
    heartbeat: Duration,
}

impl EventStreamGateway {
    pub fn new(store: Arc<SessionStore>, config: &StreamConfig) -> Self {
        Self {
            store,
            replay_events: config.replay_events,
            heartbeat: Duration::from_secs(config.heartbeat_secs.max(1)),
        }
    }

    /// Attaches to `session_id`, creating the session when it does not exist.
    /// The stream ends when the session is deleted; dropping it releases the
    /// receiver and the heartbeat timer.
    pub async fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<BoxStream<'static, StreamMessage>, InputError> {
        let (session, receiver) = loop {
            let handle = self.store.get_or_create(session_id).await?;
            if !handle.is_closed() {
                break handle.subscribe();
            }
        };

        debug!(
            event_name = "stream.subscribed",
            session_id = %session_id,
            replayed = session.recent_events(self.replay_events).len(),
            "stream subscriber attached"
        );

        let mut backlog = vec![StreamMessage::Snapshot(StreamSnapshot::from(session.as_ref()))];
        backlog.extend(
            session.recent_events(self.replay_events).iter().cloned().map(StreamMessage::Event),
        );

        let mut heartbeat = interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let live = stream::unfold(
            (receiver, heartbeat, session_id.to_string()),
            |(mut receiver, mut heartbeat, session_id)| async move {
                loop {
                    tokio::select! {
                        received = receiver.recv() => match received {
                            Ok(event) => {
                                return Some((
                                    StreamMessage::Event(event),
                                    (receiver, heartbeat, session_id),
                                ));
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(
                                    event_name = "stream.subscriber.lagged",
                                    session_id = %session_id,
                                    skipped,
                                    "slow subscriber skipped events"
                                );
                            }
                            Err(RecvError::Closed) => {
                                debug!(
                                    event_name = "stream.closed",
                                    session_id = %session_id,
                                    "session removed; ending stream"
                                );
                                return None;
                            }
                        },
                        _ = heartbeat.tick() => {
                            let message = StreamMessage::Heartbeat { at: Utc::now() };
                            return Some((message, (receiver, heartbeat, session_id)));
                        }
                    }
                }
            },
        );

        Ok(stream::iter(backlog).chain(live).boxed())
    }
}
