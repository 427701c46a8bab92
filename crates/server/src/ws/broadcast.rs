// Fan-out of board events to every live connection of the board's members.

use corkboard_common::protocol::ws::{encode_server_message, ServerMessage};

use crate::store::{Store, StoreError};

use super::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct BroadcastPlanner {
    registry: ConnectionRegistry,
    store: Store,
}

impl BroadcastPlanner {
    pub fn new(registry: ConnectionRegistry, store: Store) -> Self {
        Self { registry, store }
    }

    /// Membership is resolved at call time, never cached: owner first, then
    /// collaborators.
    pub async fn recipients_for_board(&self, board_id: i64) -> Result<Vec<i64>, StoreError> {
        Ok(self.store.board_members(board_id).await?.user_ids())
    }

    /// Serializes the message once and pushes it to every live connection of
    /// the given users. Connections whose socket task has already gone away
    /// are skipped silently; nothing is queued or retried here. Returns how
    /// many connections accepted the frame.
    pub async fn broadcast_to_users(&self, user_ids: &[i64], message: &ServerMessage) -> usize {
        let encoded = match encode_server_message(message) {
            Ok(encoded) => encoded,
            Err(error) => {
                tracing::error!(error = %error, "failed to serialize broadcast message");
                return 0;
            }
        };

        let recipients = self.registry.connections_for_users(user_ids).await;
        let mut sent_count = 0;
        for (_connection_id, recipient) in recipients {
            if recipient.send(encoded.clone()).is_ok() {
                sent_count += 1;
            }
        }

        sent_count
    }

    pub async fn broadcast_to_board(
        &self,
        board_id: i64,
        message: &ServerMessage,
    ) -> Result<usize, StoreError> {
        let user_ids = self.recipients_for_board(board_id).await?;
        Ok(self.broadcast_to_users(&user_ids, message).await)
    }
}
