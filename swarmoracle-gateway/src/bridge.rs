//! Routing from the `swarm:events` bus into subscriber rooms.
//!
//! Consensus outcomes and failures bypass batching and go straight to the
//! question room and `global`; everything else coalesces through the
//! batcher. The gateway sees both bus traffic and direct in-process engine
//! emissions through the same subscription, so the routing below is the
//! single delivery policy.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use swarmoracle_events::{EventBus, SwarmEvent};

use crate::batcher::UpdateBatcher;
use crate::connection::ConnectionManager;
use crate::protocol::{Room, ServerMessage, UpdateType};

/// Run the bus-to-rooms bridge until shutdown.
pub async fn run_bridge(
    bus: EventBus,
    manager: Arc<ConnectionManager>,
    batcher: Arc<UpdateBatcher>,
    shutdown: CancellationToken,
) {
    let mut events = bus.subscribe();
    debug!("fan-out bridge subscribed to {}", swarmoracle_events::SWARM_EVENTS_TOPIC);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            received = events.recv() => match received {
                Ok(envelope) => route_event(&manager, &batcher, envelope.event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "fan-out bridge lagged behind the event bus");
                }
                Err(RecvError::Closed) => return,
            },
        }
    }
}

/// Deliver one event to its rooms, batched or immediate per its criticality.
pub fn route_event(
    manager: &Arc<ConnectionManager>,
    batcher: &Arc<UpdateBatcher>,
    event: SwarmEvent,
) {
    match event {
        SwarmEvent::AnswerSubmitted {
            question_id,
            answer_id,
            agent_id,
            confidence,
        } => {
            let message = ServerMessage::AnswerSubmitted {
                question_id,
                answer_id,
                agent_id,
                confidence,
            };
            let payload = match serde_json::to_value(&message) {
                Ok(payload) => payload,
                Err(_) => return,
            };
            batcher.submit(
                Room::Question(question_id),
                UpdateType::AnswerSubmitted,
                answer_id.to_string(),
                payload.clone(),
            );
            batcher.submit(
                Room::Global,
                UpdateType::AnswerSubmitted,
                answer_id.to_string(),
                payload,
            );
        }

        SwarmEvent::QuestionCreated {
            question_id,
            category,
            min_answers,
        } => {
            let message = ServerMessage::QuestionNew {
                question_id,
                category,
                min_answers,
            };
            if let Ok(payload) = serde_json::to_value(&message) {
                batcher.submit(
                    Room::Global,
                    UpdateType::QuestionNew,
                    question_id.to_string(),
                    payload,
                );
            }
        }

        // Outcome notifications skip the batch window entirely.
        SwarmEvent::ConsensusCalculated {
            question_id,
            algorithm,
            winning_answer_id,
            consensus_strength,
            confidence_level,
            participant_count,
            consensus_reached,
        } => {
            let message = ServerMessage::ConsensusReached {
                question_id,
                winning_answer_id,
                algorithm,
                consensus_strength,
                confidence_level,
                participant_count,
                consensus_reached,
            };
            manager.send_to_room(&Room::Question(question_id), &message);
            manager.send_to_room(&Room::Global, &message);
        }

        SwarmEvent::ConsensusFailed {
            question_id,
            reason,
            permanent,
        } => {
            // Intermediate retry noise stays off the wire; terminal failures
            // are delivered immediately.
            if !permanent {
                return;
            }
            let message = ServerMessage::ConsensusFailed {
                question_id,
                reason,
            };
            manager.send_to_room(&Room::Question(question_id), &message);
            manager.send_to_room(&Room::Global, &message);
        }

        SwarmEvent::AgentReputationUpdated {
            agent_id,
            reputation_score,
            accuracy_rate,
        } => {
            let message = ServerMessage::ReputationUpdated {
                agent_id,
                reputation_score,
                accuracy_rate,
            };
            if let Ok(payload) = serde_json::to_value(&message) {
                batcher.submit(
                    Room::Agent(agent_id),
                    UpdateType::ReputationUpdated,
                    agent_id.to_string(),
                    payload,
                );
            }
        }

        SwarmEvent::LeaderboardUpdated { entries } => {
            let message = ServerMessage::LeaderboardUpdated { entries };
            if let Ok(payload) = serde_json::to_value(&message) {
                batcher.submit(
                    Room::Leaderboard,
                    UpdateType::LeaderboardUpdated,
                    "global".to_string(),
                    payload,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use crate::connection::SubjectTokenAuthenticator;

    fn setup() -> (Arc<ConnectionManager>, Arc<UpdateBatcher>) {
        let manager = Arc::new(ConnectionManager::new(Box::new(SubjectTokenAuthenticator)));
        let batcher = UpdateBatcher::new(Arc::clone(&manager), Duration::from_millis(20));
        (manager, batcher)
    }

    fn join(
        manager: &Arc<ConnectionManager>,
        room: Room,
    ) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = manager.register(tx);
        manager.join_room(id, room).unwrap();
        rx
    }

    #[tokio::test]
    async fn consensus_outcomes_bypass_batching() {
        let (manager, batcher) = setup();
        let question_id = Uuid::new_v4();
        let mut question_rx = join(&manager, Room::Question(question_id));
        let mut global_rx = join(&manager, Room::Global);

        route_event(
            &manager,
            &batcher,
            SwarmEvent::ConsensusCalculated {
                question_id,
                algorithm: "hybrid".into(),
                winning_answer_id: Some(Uuid::new_v4()),
                consensus_strength: 0.8,
                confidence_level: 0.6,
                participant_count: 3,
                consensus_reached: true,
            },
        );

        // No window to wait out: both rooms already have the message.
        assert!(matches!(
            question_rx.try_recv().unwrap(),
            ServerMessage::ConsensusReached { .. }
        ));
        assert!(matches!(
            global_rx.try_recv().unwrap(),
            ServerMessage::ConsensusReached { .. }
        ));
    }

    #[tokio::test]
    async fn permanent_failures_are_delivered_immediately() {
        let (manager, batcher) = setup();
        let question_id = Uuid::new_v4();
        let mut rx = join(&manager, Room::Question(question_id));

        route_event(
            &manager,
            &batcher,
            SwarmEvent::ConsensusFailed {
                question_id,
                reason: "no_valid_answers".into(),
                permanent: true,
            },
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::ConsensusFailed { .. }
        ));

        // Retry-in-progress failures stay internal.
        route_event(
            &manager,
            &batcher,
            SwarmEvent::ConsensusFailed {
                question_id,
                reason: "store_unavailable".into(),
                permanent: false,
            },
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn answer_submissions_batch_into_the_question_room() {
        let (manager, batcher) = setup();
        let question_id = Uuid::new_v4();
        let mut rx = join(&manager, Room::Question(question_id));

        route_event(
            &manager,
            &batcher,
            SwarmEvent::AnswerSubmitted {
                question_id,
                answer_id: Uuid::new_v4(),
                agent_id: Uuid::new_v4(),
                confidence: 0.7,
            },
        );

        // Nothing before the window closes.
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(60)).await;
        match rx.try_recv().unwrap() {
            ServerMessage::BatchUpdate {
                update_type, items, ..
            } => {
                assert_eq!(update_type, UpdateType::AnswerSubmitted);
                assert_eq!(items.len(), 1);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
