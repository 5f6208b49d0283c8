//! WebSocket server for the fan-out gateway.
//!
//! One axum endpoint upgrades subscriber connections; each connection gets
//! an unbounded outbound channel drained by a writer task, while the read
//! loop feeds the protocol handler. Health and stats endpoints ride on the
//! same router.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use swarmoracle_core::{AnswerDraft, SwarmOracle};

use crate::batcher::UpdateBatcher;
use crate::bridge::run_bridge;
use crate::config::GatewayConfig;
use crate::connection::{AgentAuthenticator, ConnectionId, ConnectionManager, SubjectTokenAuthenticator};
use crate::protocol::{ClientMessage, Room, ServerMessage};

/// The assembled fan-out gateway.
pub struct FanoutGateway {
    config: GatewayConfig,
    oracle: Arc<SwarmOracle>,
    manager: Arc<ConnectionManager>,
    batcher: Arc<UpdateBatcher>,
    shutdown: CancellationToken,
}

#[derive(Clone)]
struct GatewayState {
    oracle: Arc<SwarmOracle>,
    manager: Arc<ConnectionManager>,
}

impl FanoutGateway {
    /// Build a gateway with the development credential verifier.
    pub fn new(config: GatewayConfig, oracle: Arc<SwarmOracle>) -> Self {
        Self::with_authenticator(config, oracle, Box::new(SubjectTokenAuthenticator))
    }

    pub fn with_authenticator(
        config: GatewayConfig,
        oracle: Arc<SwarmOracle>,
        authenticator: Box<dyn AgentAuthenticator>,
    ) -> Self {
        let manager = Arc::new(ConnectionManager::new(authenticator));
        let batcher = UpdateBatcher::new(Arc::clone(&manager), config.batch_window);
        Self {
            config,
            oracle,
            manager,
            batcher,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn manager(&self) -> Arc<ConnectionManager> {
        Arc::clone(&self.manager)
    }

    /// Start the bridge, heartbeat loop, and WebSocket server.
    pub async fn start(&self) -> Result<()> {
        info!(
            "starting fan-out gateway on {}:{}",
            self.config.bind_address, self.config.port
        );

        // Bus-to-rooms bridge; direct engine emissions arrive the same way.
        tokio::spawn(run_bridge(
            self.oracle.bus(),
            Arc::clone(&self.manager),
            Arc::clone(&self.batcher),
            self.shutdown.clone(),
        ));

        // Heartbeat and stale-connection eviction.
        let manager = Arc::clone(&self.manager);
        let heartbeat = self.config.heartbeat_interval;
        let stale_ttl = self.config.stale_ttl;
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => {
                        manager.broadcast(&ServerMessage::Ping);
                        manager.evict_stale(stale_ttl);
                    }
                }
            }
        });

        let state = GatewayState {
            oracle: Arc::clone(&self.oracle),
            manager: Arc::clone(&self.manager),
        };
        let mut router = Router::new()
            .route("/ws", get(ws_upgrade))
            .route("/health", get(health))
            .route("/stats", get(stats))
            .with_state(state);
        if self.config.cors_enabled {
            router = router.layer(CorsLayer::permissive());
        }

        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = serve.await {
                warn!("fan-out gateway server error: {e}");
            }
        });

        info!("fan-out gateway started");
        Ok(())
    }

    /// Announce shutdown to every subscriber and stop all gateway tasks.
    pub async fn stop(&self) -> Result<()> {
        self.manager.broadcast(&ServerMessage::ServerShutdown);
        self.shutdown.cancel();
        info!("fan-out gateway stopped");
        Ok(())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
    }))
}

async fn stats(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let gateway = state.manager.stats();
    let queue = state.oracle.scheduler().stats();
    Json(serde_json::json!({
        "gateway": gateway,
        "queue": queue,
    }))
}

async fn ws_upgrade(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: GatewayState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let connection_id = state.manager.register(tx);

    // Writer task drains the outbound channel into the socket.
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(_) => continue,
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => handle_client_message(&state, connection_id, &text).await,
            Message::Pong(_) => state.manager.touch(connection_id),
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.manager.unregister(connection_id);
    writer.abort();
}

async fn handle_client_message(state: &GatewayState, connection_id: ConnectionId, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            state.manager.send_to(
                connection_id,
                ServerMessage::Error {
                    reason: format!("malformed message: {e}"),
                },
            );
            return;
        }
    };

    state.manager.touch(connection_id);

    match message {
        ClientMessage::AuthAgent { token } => {
            match state.manager.authenticate(connection_id, &token) {
                Ok(agent_id) => {
                    state
                        .manager
                        .send_to(connection_id, ServerMessage::AuthSuccess { agent_id });
                }
                Err(reason) => {
                    state
                        .manager
                        .send_to(connection_id, ServerMessage::AuthFailed { reason });
                }
            }
        }

        ClientMessage::SubscribeQuestion { question_id } => {
            join_room(state, connection_id, Room::Question(question_id));
        }
        ClientMessage::SubscribeAgent { agent_id } => {
            join_room(state, connection_id, Room::Agent(agent_id));
        }
        ClientMessage::SubscribeLeaderboard => {
            join_room(state, connection_id, Room::Leaderboard);
        }
        ClientMessage::SubscribeGlobal => {
            join_room(state, connection_id, Room::Global);
        }

        ClientMessage::AnswerSubmit {
            question_id,
            content,
            reasoning,
            confidence,
        } => {
            let agent_id = match state.manager.agent_of(connection_id) {
                Some(agent_id) => agent_id,
                None => {
                    state.manager.send_to(
                        connection_id,
                        ServerMessage::Error {
                            reason: "answer submission requires authentication".into(),
                        },
                    );
                    return;
                }
            };
            // The resulting answer:submitted event fans back out via the
            // bridge; only failures need a direct reply.
            if let Err(e) = state
                .oracle
                .submit_answer(AnswerDraft {
                    question_id,
                    agent_id,
                    content,
                    reasoning,
                    confidence,
                })
                .await
            {
                state.manager.send_to(
                    connection_id,
                    ServerMessage::Error {
                        reason: e.to_string(),
                    },
                );
            }
        }

        ClientMessage::Pong => {
            debug!(connection_id = %connection_id, "pong");
        }
    }
}

fn join_room(state: &GatewayState, connection_id: ConnectionId, room: Room) {
    if let Err(reason) = state.manager.join_room(connection_id, room) {
        state
            .manager
            .send_to(connection_id, ServerMessage::Error { reason });
    }
}
