// Merges the remote message log with locally-pending optimistic sends into
// one ordered, de-duplicated view list. The remote log is authoritative: a
// pending message is owned here only until its id shows up in a snapshot.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::client::config::ClientConfig;
use crate::client::services::live_query::{decode_snapshot, encode_record, LiveQuery};
use crate::common::models::{Message, Sender, Session};
use crate::remote::{Direction, RecordStore};

struct SyncState {
    remote: Vec<Message>,
    pending: Vec<Message>,
    // first-seen insertion sequence per id; breaks createdAt ties,
    // newest insertion first
    first_seen: HashMap<String, u64>,
    next_seq: u64,
    view: Vec<Message>,
    subscribers: Vec<(u64, UnboundedSender<Vec<Message>>)>,
    next_sub: u64,
}

impl SyncState {
    fn new() -> Self {
        Self {
            remote: Vec::new(),
            pending: Vec::new(),
            first_seen: HashMap::new(),
            next_seq: 0,
            view: Vec::new(),
            subscribers: Vec::new(),
            next_sub: 0,
        }
    }

    fn note_seen(&mut self, id: &str) {
        if !self.first_seen.contains_key(id) {
            self.first_seen.insert(id.to_string(), self.next_seq);
            self.next_seq += 1;
        }
    }

    fn insert_pending(&mut self, message: Message) {
        self.note_seen(&message.id);
        self.pending.push(message);
        self.recompute_and_publish();
    }

    /// Replaces the remote-known set with a full snapshot. Pending messages
    /// whose id now appears remotely are superseded, not duplicated.
    fn apply_snapshot(&mut self, messages: Vec<Message>) {
        let mut ids = HashSet::new();
        let mut remote = Vec::with_capacity(messages.len());
        for message in messages {
            if ids.insert(message.id.clone()) {
                self.note_seen(&message.id);
                remote.push(message);
            }
        }
        self.pending.retain(|p| !ids.contains(&p.id));
        self.remote = remote;
        self.recompute_and_publish();
    }

    // view = remote ∪ (pending \ remote), newest first
    fn recompute_and_publish(&mut self) {
        let remote_ids: HashSet<&str> = self.remote.iter().map(|m| m.id.as_str()).collect();
        let mut view = self.remote.clone();
        view.extend(
            self.pending
                .iter()
                .filter(|m| !remote_ids.contains(m.id.as_str()))
                .cloned(),
        );
        let first_seen = &self.first_seen;
        view.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| first_seen.get(&b.id).cmp(&first_seen.get(&a.id)))
        });
        self.view = view;
        let view = self.view.clone();
        self.subscribers.retain(|(_, tx)| tx.send(view.clone()).is_ok());
    }
}

struct Live {
    query: LiveQuery,
    pump: JoinHandle<()>,
}

pub struct MessageSynchronizer {
    store: Arc<dyn RecordStore>,
    collection: String,
    max_message_length: usize,
    state: Arc<Mutex<SyncState>>,
    live: tokio::sync::Mutex<Option<Live>>,
}

impl MessageSynchronizer {
    pub fn new(store: Arc<dyn RecordStore>, config: &ClientConfig) -> Self {
        Self {
            store,
            collection: config.conversation_collection.clone(),
            max_message_length: config.max_message_length,
            state: Arc::new(Mutex::new(SyncState::new())),
            live: tokio::sync::Mutex::new(None),
        }
    }

    /// Opens the live subscription, newest first. A second call while
    /// running is a no-op.
    pub async fn start(&self) -> anyhow::Result<()> {
        let mut live = self.live.lock().await;
        if live.is_some() {
            return Ok(());
        }
        let mut query = LiveQuery::open(
            self.store.clone(),
            &self.collection,
            "createdAt",
            Direction::Descending,
        )
        .await?;
        let mut snapshots = match query.take_snapshots() {
            Some(rx) => rx,
            None => anyhow::bail!("snapshot stream already taken"),
        };
        let state = self.state.clone();
        let pump = tokio::spawn(async move {
            while let Some(snapshot) = snapshots.recv().await {
                let messages = decode_snapshot(snapshot);
                state.lock().unwrap().apply_snapshot(messages);
            }
            debug!("[SYNC] snapshot stream ended");
        });
        *live = Some(Live { query, pump });
        info!("[SYNC] live subscription opened on '{}'", self.collection);
        Ok(())
    }

    /// Closes the subscription; no view updates are published after this
    /// returns. Pending sends stay visible in the last view.
    pub async fn stop(&self) {
        let mut live = self.live.lock().await;
        if let Some(mut live) = live.take() {
            live.query.close().await;
            live.pump.abort();
            info!("[SYNC] live subscription closed");
        }
    }

    /// Optimistic send: the message is inserted into the view list before
    /// any network round trip, then appended to the remote log
    /// fire-and-forget — its presence in a later snapshot is the
    /// confirmation. A failed append is logged and not retried; the local
    /// copy stays visible.
    pub fn send(&self, text: &str, session: &Session) {
        let profile = match session.profile() {
            Some(profile) => profile,
            None => {
                warn!("[SYNC] send without a signed-in session ignored");
                return;
            }
        };
        if text.trim().is_empty() {
            debug!("[SYNC] empty message ignored");
            return;
        }
        if text.len() > self.max_message_length {
            warn!(
                "[SYNC] message over {} chars ignored",
                self.max_message_length
            );
            return;
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            text: text.to_string(),
            sender: Sender::from(profile),
        };
        self.state.lock().unwrap().insert_pending(message.clone());

        let record = match encode_record(&message) {
            Ok(record) => record,
            Err(e) => {
                warn!("[SYNC] failed to encode message {}: {}", message.id, e);
                return;
            }
        };
        let store = self.store.clone();
        let collection = self.collection.clone();
        tokio::spawn(async move {
            if let Err(e) = store.append(&collection, record).await {
                warn!("[SYNC] remote append failed for {}: {:#}", message.id, e);
            }
        });
    }

    /// Current merged view list, newest first.
    pub fn view_list(&self) -> Vec<Message> {
        self.state.lock().unwrap().view.clone()
    }

    /// Subscribes to view-list changes. The current list is delivered
    /// immediately, then on every snapshot or local send; dropping the
    /// handle unsubscribes.
    pub fn subscribe(&self) -> ViewSubscription {
        let (tx, rx) = unbounded_channel();
        let mut guard = self.state.lock().unwrap();
        let id = guard.next_sub;
        guard.next_sub += 1;
        let _ = tx.send(guard.view.clone());
        guard.subscribers.push((id, tx));
        ViewSubscription {
            id,
            state: self.state.clone(),
            rx,
        }
    }
}

pub struct ViewSubscription {
    id: u64,
    state: Arc<Mutex<SyncState>>,
    rx: UnboundedReceiver<Vec<Message>>,
}

impl ViewSubscription {
    pub async fn recv(&mut self) -> Option<Vec<Message>> {
        self.rx.recv().await
    }
}

impl Drop for ViewSubscription {
    fn drop(&mut self) {
        let mut guard = self.state.lock().unwrap();
        guard.subscribers.retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::models::UserProfile;
    use crate::remote::memory::MemoryStore;
    use chrono::TimeZone;

    fn session(user_id: &str) -> Session {
        Session::SignedIn(UserProfile {
            user_id: user_id.into(),
            display_name: Some("Luigi".into()),
            avatar_url: None,
        })
    }

    fn remote_message(id: &str, text: &str, secs: i64) -> Message {
        Message {
            id: id.into(),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            text: text.into(),
            sender: Sender {
                id: "peer".into(),
                display_name: None,
                avatar_url: None,
            },
        }
    }

    fn synchronizer() -> MessageSynchronizer {
        MessageSynchronizer::new(Arc::new(MemoryStore::new()), &ClientConfig::default())
    }

    async fn recv_until<F>(sub: &mut ViewSubscription, pred: F) -> Vec<Message>
    where
        F: Fn(&[Message]) -> bool,
    {
        loop {
            let view = tokio::time::timeout(std::time::Duration::from_secs(5), sub.recv())
                .await
                .expect("timed out waiting for a view update")
                .expect("view stream ended");
            if pred(&view) {
                return view;
            }
        }
    }

    #[tokio::test]
    async fn send_is_visible_before_any_confirmation() {
        let sync = synchronizer();
        sync.send("hi", &session("u1"));
        let view = sync.view_list();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].text, "hi");
        assert_eq!(view[0].sender.id, "u1");
    }

    #[tokio::test]
    async fn empty_oversized_and_signed_out_sends_are_ignored() {
        let sync = synchronizer();
        sync.send("", &session("u1"));
        sync.send("   \n", &session("u1"));
        sync.send(&"x".repeat(3000), &session("u1"));
        sync.send("hello", &Session::SignedOut);
        sync.send("hello", &Session::Unknown);
        assert!(sync.view_list().is_empty());
    }

    #[tokio::test]
    async fn rapid_sends_get_distinct_ids_newest_first() {
        let sync = synchronizer();
        sync.send("first", &session("u1"));
        sync.send("second", &session("u1"));
        let view = sync.view_list();
        assert_eq!(view.len(), 2);
        assert_ne!(view[0].id, view[1].id);
        assert_eq!(view[0].text, "second");
        assert_eq!(view[1].text, "first");
    }

    #[tokio::test]
    async fn snapshot_supersedes_pending_without_duplication() {
        let store = Arc::new(MemoryStore::new());
        let sync = MessageSynchronizer::new(store.clone(), &ClientConfig::default());
        sync.start().await.unwrap();
        let mut sub = sync.subscribe();

        sync.send("hi", &session("u1"));
        let optimistic = recv_until(&mut sub, |v| v.len() == 1).await;
        let local_id = optimistic[0].id.clone();

        // the echo of our own append comes back as a snapshot and
        // supersedes the pending copy; the rendered list never changes
        let confirmed = recv_until(&mut sub, |v| {
            v.len() == 1 && sync.state.lock().unwrap().pending.is_empty()
        })
        .await;
        assert_eq!(confirmed[0].id, local_id);
        assert_eq!(confirmed[0].text, "hi");
        assert_eq!(confirmed, optimistic);
        sync.stop().await;
    }

    #[tokio::test]
    async fn identical_snapshots_are_idempotent() {
        let sync = synchronizer();
        let snapshot = vec![
            remote_message("a", "uno", 100),
            remote_message("b", "due", 200),
        ];
        sync.state.lock().unwrap().apply_snapshot(snapshot.clone());
        let first = sync.view_list();
        sync.state.lock().unwrap().apply_snapshot(snapshot);
        assert_eq!(sync.view_list(), first);
        assert_eq!(first[0].id, "b"); // newest first
    }

    #[tokio::test]
    async fn snapshot_duplicates_collapse_to_one() {
        let sync = synchronizer();
        sync.state.lock().unwrap().apply_snapshot(vec![
            remote_message("a", "uno", 100),
            remote_message("a", "uno", 100),
        ]);
        assert_eq!(sync.view_list().len(), 1);
    }

    #[tokio::test]
    async fn created_at_ties_break_newest_insertion_first() {
        let sync = synchronizer();
        sync.state.lock().unwrap().apply_snapshot(vec![
            remote_message("a", "uno", 100),
            remote_message("b", "due", 100),
        ]);
        let view = sync.view_list();
        // same timestamp: "b" was inserted later, so it wins the position
        assert_eq!(view[0].id, "b");
        assert_eq!(view[1].id, "a");
    }

    #[tokio::test]
    async fn pending_survives_unrelated_snapshots() {
        let sync = synchronizer();
        sync.send("mine", &session("u1"));
        sync.state
            .lock()
            .unwrap()
            .apply_snapshot(vec![remote_message("r1", "theirs", 100)]);
        let view = sync.view_list();
        assert_eq!(view.len(), 2);
        // the optimistic send is newer than the historical record
        assert_eq!(view[0].text, "mine");
    }

    #[tokio::test]
    async fn stop_ends_view_updates() {
        let store = Arc::new(MemoryStore::new());
        let sync = MessageSynchronizer::new(store.clone(), &ClientConfig::default());
        sync.start().await.unwrap();
        sync.start().await.unwrap(); // no-op while running
        let mut sub = sync.subscribe();
        sync.stop().await;

        store
            .append(
                "chats",
                encode_record(&remote_message("r1", "late", 100)).unwrap(),
            )
            .await
            .unwrap();
        // give any stray task a chance to run before checking
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        while let Ok(view) = sub.rx.try_recv() {
            assert!(view.is_empty());
        }
        assert!(sync.view_list().is_empty());
    }
}
