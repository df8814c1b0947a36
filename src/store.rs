use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::api::client::FirestoreClient;
use crate::api::models::{Conversation, NewConversation};
use crate::storage::{Cache, StorageError};

const POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Best-effort view of a membership query. May be empty or stale;
/// `loaded` turns true once the backend answered at least once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub conversations: Vec<Conversation>,
    pub loaded: bool,
}

impl Snapshot {
    pub fn contains_participant(&self, id: &str) -> bool {
        self.conversations.iter().any(|c| c.has_participant(id))
    }
}

pub trait ConversationStore {
    /// Current snapshot of the conversations `participant` belongs to.
    /// The first call for a participant starts keeping that query live.
    fn query_by_participant(&self, participant: &str) -> Snapshot;

    /// Fire-and-forget create. Failures are logged, not reported.
    fn insert(&self, conversation: NewConversation);
}

#[derive(Debug, Clone)]
pub struct SnapshotUpdate {
    pub participant: String,
    pub snapshot: Snapshot,
}

type Snapshots = Arc<RwLock<HashMap<String, Snapshot>>>;
type Pending = Arc<RwLock<HashMap<String, Vec<Conversation>>>>;

/// Fold a freshly created conversation into its owner's snapshot so the
/// duplicate check sees it before the next poll answers. It stays pending
/// until a poll result lists it.
fn record_created(snapshots: &Snapshots, pending: &Pending, owner: &str, created: &Conversation) {
    if let Ok(mut map) = pending.write() {
        let list = map.entry(owner.to_string()).or_default();
        if !list.iter().any(|c| c.id == created.id) {
            list.push(created.clone());
        }
    }
    let Ok(mut map) = snapshots.write() else { return };
    let snapshot = map.entry(owner.to_string()).or_default();
    match snapshot.conversations.iter_mut().find(|c| c.id == created.id) {
        Some(existing) => *existing = created.clone(),
        None => snapshot.conversations.insert(0, created.clone()),
    }
}

/// Snapshot for a poll result. Created conversations the result does not
/// list yet (the query may have started before the create) are kept.
fn apply_poll(snapshots: &Snapshots, pending: &Pending, owner: &str, mut list: Vec<Conversation>) -> Snapshot {
    if let Ok(mut map) = pending.write() {
        if let Some(created) = map.get_mut(owner) {
            created.retain(|c| !list.iter().any(|l| l.id == c.id));
            for conv in created.iter().rev() {
                list.insert(0, conv.clone());
            }
            if created.is_empty() {
                map.remove(owner);
            }
        }
    }
    let snapshot = Snapshot { conversations: list, loaded: true };
    if let Ok(mut map) = snapshots.write() {
        map.insert(owner.to_string(), snapshot.clone());
    }
    snapshot
}

/// Run a cache write off the async workers; rusqlite blocks.
async fn write_cache<F>(cache: Option<Cache>, owner: String, write: F)
where
    F: FnOnce(&Cache, &str) -> Result<(), StorageError> + Send + 'static,
{
    let Some(cache) = cache else { return };
    match tokio::task::spawn_blocking(move || write(&cache, &owner)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("Failed to update the conversation cache: {}", e),
        Err(e) => log::warn!("Cache writer did not finish: {}", e),
    }
}

/// Store backed by the hosted document database. Each queried participant
/// gets a poller on the shared runtime that refreshes its snapshot, mirrors
/// it into the local cache and publishes it on the update channel.
///
/// `stop` (or dropping the store) aborts every poller and closes the
/// update channel.
pub struct LiveConversations {
    db: FirestoreClient,
    token: Option<String>,
    cache: Option<Cache>,
    snapshots: Snapshots,
    pending: Pending,
    updates: RefCell<Option<mpsc::UnboundedSender<SnapshotUpdate>>>,
    refresh: Arc<Notify>,
    pollers: RefCell<HashMap<String, JoinHandle<()>>>,
    stopped: Cell<bool>,
}

impl LiveConversations {
    pub fn new(db: FirestoreClient, token: Option<String>) -> (Self, mpsc::UnboundedReceiver<SnapshotUpdate>) {
        let cache = match Cache::user() {
            Ok(cache) => Some(cache),
            Err(e) => {
                log::warn!("Conversation cache disabled: {}", e);
                None
            }
        };
        Self::with_cache(db, token, cache)
    }

    pub fn with_cache(
        db: FirestoreClient,
        token: Option<String>,
        cache: Option<Cache>,
    ) -> (Self, mpsc::UnboundedReceiver<SnapshotUpdate>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let store = Self {
            db,
            token,
            cache,
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            pending: Arc::new(RwLock::new(HashMap::new())),
            updates: RefCell::new(Some(updates)),
            refresh: Arc::new(Notify::new()),
            pollers: RefCell::new(HashMap::new()),
            stopped: Cell::new(false),
        };
        (store, rx)
    }

    /// Abort every poller and close the update channel. Later queries are
    /// answered from memory and the cache only.
    pub fn stop(&self) {
        if self.stopped.replace(true) {
            return;
        }
        for (participant, poller) in self.pollers.borrow_mut().drain() {
            log::debug!("Stopped polling conversations of {}", participant);
            poller.abort();
        }
        self.updates.borrow_mut().take();
    }

    fn cached(&self, participant: &str) -> Vec<Conversation> {
        let Some(cache) = &self.cache else { return Vec::new() };
        match cache.conversations_for(participant, None) {
            Ok(list) => list,
            Err(e) => {
                log::warn!("Conversation cache unavailable: {}", e);
                Vec::new()
            }
        }
    }

    fn subscribe(&self, participant: &str) {
        if self.stopped.get() || self.pollers.borrow().contains_key(participant) {
            return;
        }
        let Some(updates) = self.updates.borrow().as_ref().map(mpsc::UnboundedSender::downgrade) else {
            return;
        };
        let db = self.db.clone();
        let token = self.token.clone();
        let cache = self.cache.clone();
        let snapshots = self.snapshots.clone();
        let pending = self.pending.clone();
        let refresh = self.refresh.clone();
        let owner = participant.to_string();
        log::debug!("Subscribing to conversations of {}", owner);
        let poller = crate::utils::RUNTIME.spawn(async move {
            loop {
                let Some(updates) = updates.upgrade() else {
                    log::debug!("Store dropped; no longer polling {}", owner);
                    break;
                };
                match db.conversations_with(&owner, token.as_deref()).await {
                    Ok(list) => {
                        let rows = list.clone();
                        write_cache(cache.clone(), owner.clone(), move |cache, owner| cache.replace_conversations(owner, &rows)).await;
                        let snapshot = apply_poll(&snapshots, &pending, &owner, list);
                        let update = SnapshotUpdate { participant: owner.clone(), snapshot };
                        if updates.send(update).is_err() {
                            log::debug!("No listener left for {}; stopping", owner);
                            break;
                        }
                    }
                    Err(e) => log::warn!("Conversation query for {} failed: {}", owner, e),
                }
                drop(updates);
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    _ = refresh.notified() => {}
                }
            }
        });
        self.pollers.borrow_mut().insert(participant.to_string(), poller);
    }
}

impl Drop for LiveConversations {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ConversationStore for LiveConversations {
    fn query_by_participant(&self, participant: &str) -> Snapshot {
        if let Ok(map) = self.snapshots.read() {
            if let Some(snapshot) = map.get(participant) {
                return snapshot.clone();
            }
        }
        let seeded = Snapshot { conversations: self.cached(participant), loaded: false };
        if let Ok(mut map) = self.snapshots.write() {
            map.insert(participant.to_string(), seeded.clone());
        }
        self.subscribe(participant);
        seeded
    }

    fn insert(&self, conversation: NewConversation) {
        let db = self.db.clone();
        let token = self.token.clone();
        let cache = self.cache.clone();
        let snapshots = self.snapshots.clone();
        let pending = self.pending.clone();
        let refresh = self.refresh.clone();
        crate::utils::spawn_async(async move {
            match db.create_conversation(&conversation, token.as_deref()).await {
                Ok(created) => {
                    log::info!("Created conversation {} with {:?}", created.id, created.participants);
                    // The creator is always listed first.
                    if let Some(owner) = created.participants.first().cloned() {
                        record_created(&snapshots, &pending, &owner, &created);
                        let row = created.clone();
                        write_cache(cache, owner, move |cache, owner| cache.upsert_conversation(owner, &row)).await;
                    }
                    // A stored permit is kept if the poller is mid-fetch.
                    refresh.notify_one();
                }
                Err(e) => log::warn!("Creating conversation with {:?} failed: {}", conversation.participants, e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendConfig;

    fn chat(id: &str, users: &[&str]) -> Conversation {
        Conversation {
            id: id.into(),
            participants: users.iter().map(|u| u.to_string()).collect(),
            name: None,
            photo_url: None,
        }
    }

    /// A client pointed at a port nothing answers on, so every query fails.
    fn unreachable_db() -> FirestoreClient {
        let config = BackendConfig {
            api_key: "key".into(),
            project_id: "demo".into(),
            firestore_url: "http://127.0.0.1:9/v1".into(),
            ..BackendConfig::default()
        };
        FirestoreClient::new(reqwest::Client::new(), &config).unwrap()
    }

    #[test]
    fn membership_test_ignores_empty_snapshot() {
        let snapshot = Snapshot::default();
        assert!(!snapshot.loaded);
        assert!(!snapshot.contains_participant("a@b.com"));

        let snapshot = Snapshot { conversations: vec![chat("c", &["me@x.com", "a@b.com"])], loaded: true };
        assert!(snapshot.contains_participant("a@b.com"));
        assert!(!snapshot.contains_participant("a@b.co"));
    }

    #[test]
    fn created_conversation_is_visible_before_next_poll() {
        let snapshots: Snapshots = Arc::new(RwLock::new(HashMap::new()));
        let pending: Pending = Arc::new(RwLock::new(HashMap::new()));
        snapshots.write().unwrap().insert(
            "me@x.com".into(),
            Snapshot { conversations: vec![chat("old", &["me@x.com", "b@b.com"])], loaded: true },
        );

        record_created(&snapshots, &pending, "me@x.com", &chat("new", &["me@x.com", "a@b.com"]));
        record_created(&snapshots, &pending, "me@x.com", &chat("new", &["me@x.com", "a@b.com"]));
        {
            let map = snapshots.read().unwrap();
            assert!(map["me@x.com"].contains_participant("a@b.com"));
            assert_eq!(map["me@x.com"].conversations.len(), 2);
        }

        // A poll that started before the create does not list it yet.
        let stale = apply_poll(&snapshots, &pending, "me@x.com", vec![chat("old", &["me@x.com", "b@b.com"])]);
        assert!(stale.contains_participant("a@b.com"));
        assert_eq!(stale.conversations.len(), 2);

        // Once listed, it is no longer carried separately.
        let fresh = apply_poll(
            &snapshots,
            &pending,
            "me@x.com",
            vec![chat("new", &["me@x.com", "a@b.com"]), chat("old", &["me@x.com", "b@b.com"])],
        );
        assert_eq!(fresh.conversations.len(), 2);
        assert!(pending.read().unwrap().get("me@x.com").is_none());
        assert_eq!(snapshots.read().unwrap()["me@x.com"], fresh);
    }

    #[test]
    fn first_query_is_seeded_from_cache_and_subscribes_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::at(dir.path().join("cache.sqlite"));
        let cached = chat("c1", &["me@x.com", "a@b.com"]);
        cache.upsert_conversation("me@x.com", &cached).unwrap();

        let (store, _rx) = LiveConversations::with_cache(unreachable_db(), None, Some(cache));
        let first = store.query_by_participant("me@x.com");
        assert!(!first.loaded);
        assert_eq!(first.conversations, vec![cached]);

        let again = store.query_by_participant("me@x.com");
        assert_eq!(again, first);
        assert_eq!(store.pollers.borrow().len(), 1);
    }

    #[test]
    fn stop_ends_pollers_and_closes_updates() {
        let (store, mut rx) = LiveConversations::with_cache(unreachable_db(), None, None);
        assert!(!store.query_by_participant("me@x.com").loaded);
        let _ = store.query_by_participant("other@x.com");
        assert_eq!(store.pollers.borrow().len(), 2);

        store.stop();
        assert!(store.pollers.borrow().is_empty());
        let closed = crate::utils::RUNTIME
            .block_on(async { tokio::time::timeout(Duration::from_secs(5), rx.recv()).await });
        assert!(matches!(closed, Ok(None)));

        // Stopped stores keep answering from memory without polling again.
        let _ = store.query_by_participant("third@x.com");
        assert!(store.pollers.borrow().is_empty());
    }

    #[test]
    fn dropping_the_store_closes_updates() {
        let (store, mut rx) = LiveConversations::with_cache(unreachable_db(), None, None);
        let _ = store.query_by_participant("me@x.com");
        drop(store);
        let closed = crate::utils::RUNTIME
            .block_on(async { tokio::time::timeout(Duration::from_secs(5), rx.recv()).await });
        assert!(matches!(closed, Ok(None)));
    }
}
