// In-process implementations of the remote collaborators. They honor the
// same contracts the client core assumes from the hosted services: prompt
// initial delivery after registration, full re-delivery on every mutation in
// commit order, and no delivery after release.
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use log::{debug, info, warn};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::common::models::{ProfileUpdate, UserProfile};
use crate::remote::{
    BlobStore, Direction, IdentityEvent, IdentityService, ImagePicker, ObjectRef, PickedImage,
    Query, Record, RecordStore, Snapshot, SubscriptionId,
};

#[derive(Debug, Clone)]
struct Account {
    secret: String,
    profile: UserProfile,
}

#[derive(Default)]
struct IdentityState {
    accounts: HashMap<String, Account>,
    current: Option<(String, UserProfile)>, // (email, profile)
    watchers: Vec<(SubscriptionId, UnboundedSender<IdentityEvent>)>,
    next_watcher: u64,
}

/// In-memory identity service. Registration signs the new account in
/// directly, matching the hosted service this stands in for.
#[derive(Default)]
pub struct MemoryIdentity {
    state: Arc<Mutex<IdentityState>>,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityState {
    fn notify(&mut self) {
        let event: IdentityEvent = self.current.as_ref().map(|(_, profile)| profile.clone());
        self.watchers
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }
}

#[async_trait]
impl IdentityService for MemoryIdentity {
    async fn watch_identity(&self, tx: UnboundedSender<IdentityEvent>) -> SubscriptionId {
        let mut state = self.state.lock().await;
        let id = SubscriptionId(state.next_watcher);
        state.next_watcher += 1;
        // new listeners get the current state promptly
        let event: IdentityEvent = state.current.as_ref().map(|(_, profile)| profile.clone());
        let _ = tx.send(event);
        state.watchers.push((id, tx));
        id
    }

    async fn unwatch_identity(&self, id: SubscriptionId) {
        let mut state = self.state.lock().await;
        state.watchers.retain(|(watcher_id, _)| *watcher_id != id);
    }

    async fn sign_in(&self, email: &str, secret: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .get(email)
            .ok_or_else(|| anyhow!("unknown account: {}", email))?;
        if account.secret != secret {
            return Err(anyhow!("wrong secret for {}", email));
        }
        let profile = account.profile.clone();
        state.current = Some((email.to_string(), profile));
        info!("[IDENTITY] signed in: {}", email);
        state.notify();
        Ok(())
    }

    async fn register_account(&self, email: &str, secret: &str) -> anyhow::Result<()> {
        if email.trim().is_empty() || secret.is_empty() {
            return Err(anyhow!("email and secret are required"));
        }
        let mut state = self.state.lock().await;
        if state.accounts.contains_key(email) {
            return Err(anyhow!("account already exists: {}", email));
        }
        let profile = UserProfile {
            user_id: Uuid::new_v4().to_string(),
            display_name: None,
            avatar_url: None,
        };
        state.accounts.insert(
            email.to_string(),
            Account {
                secret: secret.to_string(),
                profile: profile.clone(),
            },
        );
        state.current = Some((email.to_string(), profile));
        info!("[IDENTITY] registered: {}", email);
        state.notify();
        Ok(())
    }

    async fn sign_out(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if let Some((email, _)) = state.current.take() {
            info!("[IDENTITY] signed out: {}", email);
        }
        state.notify();
        Ok(())
    }

    async fn update_profile_fields(&self, update: ProfileUpdate) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        let (email, mut profile) = state
            .current
            .clone()
            .ok_or_else(|| anyhow!("no signed-in user"))?;
        if let Some(name) = update.display_name {
            profile.display_name = Some(name);
        }
        if let Some(url) = update.avatar_url {
            profile.avatar_url = Some(url);
        }
        if let Some(account) = state.accounts.get_mut(&email) {
            account.profile = profile.clone();
        }
        state.current = Some((email, profile));
        state.notify();
        Ok(())
    }
}

struct LiveSub {
    id: SubscriptionId,
    query: Query,
    tx: UnboundedSender<Snapshot>,
}

#[derive(Default)]
struct StoreState {
    collections: HashMap<String, Vec<Record>>,
    subs: Vec<LiveSub>,
    next_sub: u64,
}

/// In-memory record store with live queries over full result sets.
#[derive(Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// Records are ordered by one JSON field. Strings (RFC 3339 timestamps
// included) compare lexicographically, numbers numerically; records missing
// the field keep their commit order.
fn compare_field(a: &Record, b: &Record, field: &str) -> Ordering {
    match (a.get(field), b.get(field)) {
        (Some(serde_json::Value::String(x)), Some(serde_json::Value::String(y))) => x.cmp(y),
        (Some(serde_json::Value::Number(x)), Some(serde_json::Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

fn result_set(records: &[Record], query: &Query) -> Snapshot {
    let mut set: Snapshot = records.to_vec();
    set.sort_by(|a, b| {
        let ord = compare_field(a, b, &query.order_by);
        match query.direction {
            Direction::Ascending => ord,
            Direction::Descending => ord.reverse(),
        }
    });
    set
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn subscribe(
        &self,
        query: Query,
        tx: UnboundedSender<Snapshot>,
    ) -> anyhow::Result<SubscriptionId> {
        let mut state = self.state.lock().await;
        let id = SubscriptionId(state.next_sub);
        state.next_sub += 1;
        let initial = result_set(
            state
                .collections
                .get(&query.collection)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            &query,
        );
        let _ = tx.send(initial);
        debug!("[STORE] live query opened on '{}'", query.collection);
        state.subs.push(LiveSub { id, query, tx });
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        let mut state = self.state.lock().await;
        state.subs.retain(|sub| sub.id != id);
    }

    async fn append(&self, collection: &str, record: Record) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(record);
        let records = state.collections[collection].clone();
        let mut dead = Vec::new();
        for sub in &state.subs {
            if sub.query.collection != collection {
                continue;
            }
            if sub.tx.send(result_set(&records, &sub.query)).is_err() {
                dead.push(sub.id);
            }
        }
        if !dead.is_empty() {
            state.subs.retain(|sub| !dead.contains(&sub.id));
        }
        Ok(())
    }
}

/// In-memory blob store. Public URLs are data URLs, so they stay valid for
/// as long as the store itself.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<ObjectRef> {
        let mut objects = self.objects.lock().await;
        let replaced = objects.insert(key.to_string(), bytes).is_some();
        if replaced {
            debug!("[BLOB] overwrote object '{}'", key);
        }
        Ok(ObjectRef {
            key: key.to_string(),
        })
    }

    async fn get_public_url(&self, object: &ObjectRef) -> anyhow::Result<String> {
        let objects = self.objects.lock().await;
        let bytes = objects
            .get(&object.key)
            .ok_or_else(|| anyhow!("no such object: {}", object.key))?;
        Ok(format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(bytes)
        ))
    }
}

/// Scripted picker for the demo binary and tests: each `pick_image` call
/// consumes the next queued outcome; an empty queue reads as a cancel.
#[derive(Default)]
pub struct ScriptedPicker {
    outcomes: Arc<Mutex<VecDeque<Option<PickedImage>>>>,
    images: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl ScriptedPicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn queue_pick(&self, uri: &str, bytes: Vec<u8>) {
        self.images.lock().await.insert(uri.to_string(), bytes);
        self.outcomes.lock().await.push_back(Some(PickedImage {
            uri: uri.to_string(),
        }));
    }

    pub async fn queue_cancel(&self) {
        self.outcomes.lock().await.push_back(None);
    }

    /// Queues a pick whose resource cannot be read back.
    pub async fn queue_unreadable(&self, uri: &str) {
        self.outcomes.lock().await.push_back(Some(PickedImage {
            uri: uri.to_string(),
        }));
    }
}

#[async_trait]
impl ImagePicker for ScriptedPicker {
    async fn pick_image(&self) -> anyhow::Result<Option<PickedImage>> {
        let mut outcomes = self.outcomes.lock().await;
        Ok(outcomes.pop_front().flatten())
    }

    async fn read_image(&self, image: &PickedImage) -> anyhow::Result<Vec<u8>> {
        let images = self.images.lock().await;
        images.get(&image.uri).cloned().ok_or_else(|| {
            warn!("[PICKER] unreadable image '{}'", image.uri);
            anyhow!("unreadable image: {}", image.uri)
        })
    }
}
