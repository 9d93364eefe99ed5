// Ports to the remote collaborators: identity service, record store, blob
// store and the platform image picker. The client core only ever talks to
// these traits; `memory` provides the in-process implementations used by the
// demo binary and the tests.
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::common::models::{ProfileUpdate, UserProfile};

pub mod memory;

/// Wire form of a stored record, as delivered by the record store.
pub type Record = serde_json::Value;

/// A complete result set for a live query. Every delivery replaces the
/// previous one; the store never sends diffs.
pub type Snapshot = Vec<Record>;

/// Handle for releasing a listener or live-query registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Live-query shape: one collection, ordered by a single field.
#[derive(Debug, Clone)]
pub struct Query {
    pub collection: String,
    pub order_by: String,
    pub direction: Direction,
}

/// Identity event: the full new identity, or `None` after sign-out. Each
/// event replaces the previous identity wholesale.
pub type IdentityEvent = Option<UserProfile>;

#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Registers a listener for identity changes. The current state is
    /// delivered promptly after registration, then on every change.
    async fn watch_identity(&self, tx: UnboundedSender<IdentityEvent>) -> SubscriptionId;

    /// Releases a listener. No events are delivered after this returns.
    async fn unwatch_identity(&self, id: SubscriptionId);

    async fn sign_in(&self, email: &str, secret: &str) -> anyhow::Result<()>;

    async fn register_account(&self, email: &str, secret: &str) -> anyhow::Result<()>;

    async fn sign_out(&self) -> anyhow::Result<()>;

    /// Persists the given profile fields for the signed-in user and
    /// re-delivers the updated identity to all listeners.
    async fn update_profile_fields(&self, update: ProfileUpdate) -> anyhow::Result<()>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Opens a live query. An initial snapshot is delivered promptly, then a
    /// new full snapshot on every matching mutation, in commit order.
    async fn subscribe(
        &self,
        query: Query,
        tx: UnboundedSender<Snapshot>,
    ) -> anyhow::Result<SubscriptionId>;

    /// Cancels a live query. No snapshots are delivered after this returns.
    async fn unsubscribe(&self, id: SubscriptionId);

    /// Appends one record to a collection. There is no transactional
    /// guarantee across multiple appends.
    async fn append(&self, collection: &str, record: Record) -> anyhow::Result<()>;
}

/// Reference to a stored binary object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub key: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `key`, overwriting any previous object.
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<ObjectRef>;

    /// Resolves a durable public URL for an uploaded object.
    async fn get_public_url(&self, object: &ObjectRef) -> anyhow::Result<String>;
}

/// A locally-picked image, identified by its platform URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickedImage {
    pub uri: String,
}

#[async_trait]
pub trait ImagePicker: Send + Sync {
    /// Invokes the platform picker. `Ok(None)` means the user cancelled.
    async fn pick_image(&self) -> anyhow::Result<Option<PickedImage>>;

    /// Reads the picked resource into a binary payload.
    async fn read_image(&self, image: &PickedImage) -> anyhow::Result<Vec<u8>>;
}
