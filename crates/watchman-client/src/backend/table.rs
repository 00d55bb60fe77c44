use std::sync::Arc;

use async_trait::async_trait;

use watchman_core::{PresenceRecord, Result};
use watchman_gateway::presence::PresenceTable;

use super::{ChangeFeed, PresenceBackend};

/// Backend over an in-process presence table (embedding and tests).
#[derive(Clone)]
pub struct TableBackend {
    table: Arc<PresenceTable>,
}

impl TableBackend {
    pub fn new(table: Arc<PresenceTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &Arc<PresenceTable> {
        &self.table
    }
}

#[async_trait]
impl PresenceBackend for TableBackend {
    async fn upsert_one(&self, user_id: &str, seq: u64) -> Result<()> {
        self.table
            .upsert(user_id, seq, watchman_gateway::presence::now())
            .map(|_| ())
    }

    async fn delete_one(&self, user_id: &str, seq: u64) -> Result<()> {
        self.table.delete_seq(user_id, seq).map(|_| ())
    }

    async fn query_all(&self) -> Result<Vec<PresenceRecord>> {
        Ok(self.table.query_all())
    }

    async fn subscribe(&self) -> Result<ChangeFeed> {
        Ok(ChangeFeed::from_broadcast(self.table.subscribe()))
    }
}
