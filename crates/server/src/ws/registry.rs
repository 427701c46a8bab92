// Live WebSocket connection registry.
//
// One entry per open socket, keyed by a fresh connection id. A user with
// several tabs open holds several entries. The outbound sender is owned by
// the socket task; a send on a closed channel just fails and the entry is
// reaped when that task runs its disconnect path.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionRecord {
    pub user_id: i64,
    pub display_name: String,
    pub outbound: mpsc::UnboundedSender<String>,
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<Uuid, SessionRecord>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection under a freshly generated id and returns it.
    pub async fn insert(
        &self,
        user_id: i64,
        display_name: &str,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Uuid {
        let connection_id = Uuid::new_v4();
        self.connections.write().await.insert(
            connection_id,
            SessionRecord { user_id, display_name: display_name.to_owned(), outbound },
        );
        connection_id
    }

    /// Removing an id that is already gone is a no-op, so racing disconnect
    /// paths can both call this safely.
    pub async fn remove(&self, connection_id: Uuid) {
        self.connections.write().await.remove(&connection_id);
    }

    pub async fn record(&self, connection_id: Uuid) -> Option<SessionRecord> {
        self.connections.read().await.get(&connection_id).cloned()
    }

    /// All live connections belonging to any of the given users. The sender
    /// clones are collected under the read guard and used outside it.
    pub async fn connections_for_users(
        &self,
        user_ids: &[i64],
    ) -> Vec<(Uuid, mpsc::UnboundedSender<String>)> {
        let guard = self.connections.read().await;
        guard
            .iter()
            .filter(|(_, record)| user_ids.contains(&record.user_id))
            .map(|(connection_id, record)| (*connection_id, record.outbound.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
