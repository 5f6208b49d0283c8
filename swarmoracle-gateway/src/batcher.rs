//! Latest-wins update batching.
//!
//! Non-critical updates are coalesced per `(room, update type)` over a fixed
//! window. The first update for an idle pair opens a slot and arms its single
//! flush timer; later updates within the window upsert by entity key, so a
//! flushed `batch_update` never carries two items for the same entity.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use crate::connection::ConnectionManager;
use crate::protocol::{Room, ServerMessage, UpdateType};

/// Key identifying one batching window.
type SlotKey = (Room, UpdateType);

/// Coalesces updates and flushes them into rooms.
pub struct UpdateBatcher {
    window: Duration,
    manager: Arc<ConnectionManager>,
    slots: DashMap<SlotKey, HashMap<String, serde_json::Value>>,
}

impl UpdateBatcher {
    pub fn new(manager: Arc<ConnectionManager>, window: Duration) -> Arc<Self> {
        Arc::new(Self {
            window,
            manager,
            slots: DashMap::new(),
        })
    }

    /// Queue an update for batched delivery. `entity_key` scopes the
    /// latest-wins dedup (`id | answer_id | agent_id | "global"`).
    pub fn submit(
        self: &Arc<Self>,
        room: Room,
        update_type: UpdateType,
        entity_key: String,
        payload: serde_json::Value,
    ) {
        let key = (room, update_type);
        let mut armed = false;

        match self.slots.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                slot.get_mut().insert(entity_key, payload);
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let mut pending = HashMap::new();
                pending.insert(entity_key, payload);
                slot.insert(pending);
                armed = true;
            }
        }

        // Exactly one timer per open slot; the flush removes the slot so the
        // next update re-arms.
        if armed {
            let batcher = Arc::clone(self);
            let window = self.window;
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                batcher.flush(key);
            });
        }
    }

    fn flush(&self, key: SlotKey) {
        let (room, update_type) = key;
        if let Some((_, pending)) = self.slots.remove(&key) {
            let items: Vec<serde_json::Value> = pending.into_values().collect();
            let count = items.len();
            let delivered = self.manager.send_to_room(
                &room,
                &ServerMessage::BatchUpdate {
                    room,
                    update_type,
                    items,
                },
            );
            debug!(room = %room, ?update_type, count, delivered, "flushed update batch");
        }
    }
}
