// Client-side handle on one live query against the record store: open,
// receive full snapshots, append, close. Decoding between wire records and
// chat messages lives here too, so the synchronizer only sees typed values.
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use crate::common::models::Message;
use crate::remote::{Direction, Query, Record, RecordStore, Snapshot, SubscriptionId};

pub struct LiveQuery {
    store: Arc<dyn RecordStore>,
    collection: String,
    sub_id: Option<SubscriptionId>,
    snapshots: Option<UnboundedReceiver<Snapshot>>,
}

impl LiveQuery {
    /// Opens the subscription. The first snapshot arrives promptly; later
    /// ones follow every remote mutation, in commit order.
    pub async fn open(
        store: Arc<dyn RecordStore>,
        collection: &str,
        order_by: &str,
        direction: Direction,
    ) -> anyhow::Result<Self> {
        let (tx, rx) = unbounded_channel();
        let sub_id = store
            .subscribe(
                Query {
                    collection: collection.to_string(),
                    order_by: order_by.to_string(),
                    direction,
                },
                tx,
            )
            .await?;
        debug!("[LIVE] opened query on '{}'", collection);
        Ok(Self {
            store,
            collection: collection.to_string(),
            sub_id: Some(sub_id),
            snapshots: Some(rx),
        })
    }

    /// Takes the snapshot receiver; can be called once.
    pub fn take_snapshots(&mut self) -> Option<UnboundedReceiver<Snapshot>> {
        self.snapshots.take()
    }

    pub async fn append(&self, record: Record) -> anyhow::Result<()> {
        self.store.append(&self.collection, record).await
    }

    /// Cancels the remote registration. Idempotent; once this returns, no
    /// further snapshots are delivered.
    pub async fn close(&mut self) {
        if let Some(sub_id) = self.sub_id.take() {
            self.store.unsubscribe(sub_id).await;
            self.snapshots = None;
            debug!("[LIVE] closed query on '{}'", self.collection);
        }
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        // last-resort release for teardown paths that skipped close()
        if let Some(sub_id) = self.sub_id.take() {
            warn!("[LIVE] query on '{}' dropped without close", self.collection);
            let store = self.store.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move { store.unsubscribe(sub_id).await });
            }
        }
    }
}

/// Decodes one snapshot into messages. Records that do not parse as chat
/// messages are skipped, not fatal; the rest of the snapshot stands.
pub fn decode_snapshot(snapshot: Snapshot) -> Vec<Message> {
    snapshot
        .into_iter()
        .filter_map(|record| match serde_json::from_value::<Message>(record) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("[LIVE] skipping malformed record: {}", e);
                None
            }
        })
        .collect()
}

pub fn encode_record(message: &Message) -> anyhow::Result<Record> {
    Ok(serde_json::to_value(message)?)
}
