// Wraps the identity service's change stream into one process-wide session
// value. The manager is the only writer; everyone else reads via
// `current_session` or a subscription.
use std::sync::{Arc, Mutex};

use log::{debug, info};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::common::models::Session;
use crate::remote::{IdentityService, SubscriptionId};

struct Inner {
    current: Session,
    // subscription order is delivery order
    subscribers: Vec<(u64, UnboundedSender<Session>)>,
    next_sub: u64,
}

pub struct SessionManager {
    identity: Arc<dyn IdentityService>,
    inner: Arc<Mutex<Inner>>,
    watch_id: SubscriptionId,
    // keeps the pump alive for the lifetime of the manager
    pump: JoinHandle<()>,
}

impl SessionManager {
    /// Registers the single identity listener and starts pumping its events.
    /// The session is `Unknown` until the first event arrives.
    pub async fn start(identity: Arc<dyn IdentityService>) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            current: Session::Unknown,
            subscribers: Vec::new(),
            next_sub: 0,
        }));
        let (tx, mut rx) = unbounded_channel();
        let watch_id = identity.watch_identity(tx).await;

        let pump_inner = inner.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let session = match event {
                    Some(profile) => Session::SignedIn(profile),
                    None => Session::SignedOut,
                };
                let mut guard = pump_inner.lock().unwrap();
                // full replacement, never a partial merge
                guard.current = session.clone();
                guard
                    .subscribers
                    .retain(|(_, tx)| tx.send(session.clone()).is_ok());
            }
            debug!("[SESSION] identity stream closed");
        });
        info!("[SESSION] manager started");

        Self {
            identity,
            inner,
            watch_id,
            pump,
        }
    }

    /// Latest known session value.
    pub fn current_session(&self) -> Session {
        self.inner.lock().unwrap().current.clone()
    }

    /// Subscribes to session changes. Every event is delivered, in
    /// subscription order across subscribers; dropping the handle
    /// unsubscribes.
    pub fn subscribe(&self) -> SessionSubscription {
        let (tx, rx) = unbounded_channel();
        let mut guard = self.inner.lock().unwrap();
        let id = guard.next_sub;
        guard.next_sub += 1;
        guard.subscribers.push((id, tx));
        SessionSubscription {
            id,
            inner: self.inner.clone(),
            rx,
        }
    }

    /// Releases the identity listener. Call on every teardown path; no
    /// session changes are observed afterwards.
    pub async fn shutdown(&self) {
        self.identity.unwatch_identity(self.watch_id).await;
        self.pump.abort();
        info!("[SESSION] manager shut down");
    }
}

pub struct SessionSubscription {
    id: u64,
    inner: Arc<Mutex<Inner>>,
    rx: UnboundedReceiver<Session>,
}

impl SessionSubscription {
    pub async fn recv(&mut self) -> Option<Session> {
        self.rx.recv().await
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        let mut guard = self.inner.lock().unwrap();
        guard.subscribers.retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::models::ProfileUpdate;
    use crate::remote::memory::MemoryIdentity;

    #[tokio::test]
    async fn starts_unknown_then_tracks_identity_events() {
        let identity = Arc::new(MemoryIdentity::new());
        let manager = SessionManager::start(identity.clone()).await;
        assert_eq!(manager.current_session(), Session::Unknown);

        let mut sub = manager.subscribe();
        // first delivery resolves the unknown state
        assert_eq!(sub.recv().await.unwrap(), Session::SignedOut);

        identity.register_account("anna@mail.it", "pw").await.unwrap();
        let session = sub.recv().await.unwrap();
        assert!(session.is_signed_in());
        assert_eq!(manager.current_session(), session);

        identity.sign_out().await.unwrap();
        assert_eq!(sub.recv().await.unwrap(), Session::SignedOut);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn profile_updates_replace_the_session_value() {
        let identity = Arc::new(MemoryIdentity::new());
        identity.register_account("anna@mail.it", "pw").await.unwrap();
        let manager = SessionManager::start(identity.clone()).await;
        let mut sub = manager.subscribe();
        let initial = sub.recv().await.unwrap();
        assert_eq!(initial.profile().unwrap().display_name, None);

        identity
            .update_profile_fields(ProfileUpdate {
                display_name: Some("Anna".into()),
                avatar_url: None,
            })
            .await
            .unwrap();
        let updated = sub.recv().await.unwrap();
        assert_eq!(
            updated.profile().unwrap().display_name.as_deref(),
            Some("Anna")
        );
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn dropped_subscription_stops_receiving() {
        let identity = Arc::new(MemoryIdentity::new());
        let manager = SessionManager::start(identity.clone()).await;
        let mut first = manager.subscribe();
        let second = manager.subscribe();
        assert_eq!(first.recv().await.unwrap(), Session::SignedOut);
        drop(second);

        identity.register_account("a@b.c", "pw").await.unwrap();
        assert!(first.recv().await.unwrap().is_signed_in());
        assert_eq!(manager.inner.lock().unwrap().subscribers.len(), 1);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_releases_the_identity_listener() {
        let identity = Arc::new(MemoryIdentity::new());
        let manager = SessionManager::start(identity.clone()).await;
        let mut sub = manager.subscribe();
        assert_eq!(sub.recv().await.unwrap(), Session::SignedOut);
        manager.shutdown().await;

        identity.register_account("a@b.c", "pw").await.unwrap();
        // the pump is gone; nothing more is delivered
        assert!(sub.rx.try_recv().is_err());
        assert_eq!(manager.current_session(), Session::SignedOut);
    }
}
