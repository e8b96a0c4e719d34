//! Shared settings record with an explicit hydration lifecycle and
//! cross-surface change propagation.

use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::core::folders::contains_folder;
use crate::core::models::{
    FlatFolder, PersistedEnvelope, Settings, SettingsPatch, TitleSaveMode, STORE_KEY,
};
use crate::core::store::{ChangeFeed, StorageArea, StorageChange, SurfaceId};
use crate::Error;

/// Persisted state as seen by a surface: not yet loaded, or loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum Hydration<T> {
    Loading,
    Ready(T),
}

impl<T> Hydration<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Hydration::Ready(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Hydration::Ready(value) => Some(value),
            Hydration::Loading => None,
        }
    }
}

/// Whether this store receives writes made by other surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Subscribed,
    Unavailable,
}

enum WriteCmd {
    Persist(String),
    Flush(oneshot::Sender<()>),
}

struct Inner {
    surface: SurfaceId,
    key: String,
    state: watch::Sender<Hydration<Settings>>,
    writes: mpsc::UnboundedSender<WriteCmd>,
    sync: SyncStatus,
    listener: Mutex<Option<AbortHandle>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.listener.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

/// Handle to the settings of one surface. Clones share state.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<Inner>,
}

impl SettingsStore {
    /// Open the settings stored under the default key. Must be called from
    /// within a tokio runtime; hydration and persistence run as tasks.
    pub fn open(storage: Arc<dyn StorageArea>) -> Self {
        Self::open_with_key(storage, STORE_KEY)
    }

    pub fn open_with_key(storage: Arc<dyn StorageArea>, key: &str) -> Self {
        let surface = Uuid::new_v4();
        let (state, _) = watch::channel(Hydration::Loading);
        let (writes, write_rx) = mpsc::unbounded_channel();

        let (feed, sync) = match storage.subscribe() {
            Ok(feed) => (Some(feed), SyncStatus::Subscribed),
            Err(e) => {
                log::debug!("Settings won't follow other surfaces: {}", e);
                (None, SyncStatus::Unavailable)
            }
        };

        let inner = Arc::new(Inner {
            surface,
            key: key.to_string(),
            state,
            writes,
            sync,
            listener: Mutex::new(None),
        });

        tokio::spawn(run_writer(storage.clone(), key.to_string(), surface, write_rx));
        let listener = tokio::spawn(hydrate_and_listen(storage, Arc::downgrade(&inner), feed));
        if let Ok(mut slot) = inner.listener.lock() {
            *slot = Some(listener.abort_handle());
        }

        SettingsStore { inner }
    }

    pub fn surface_id(&self) -> SurfaceId {
        self.inner.surface
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.inner.sync
    }

    pub fn snapshot(&self) -> Hydration<Settings> {
        self.inner.state.borrow().clone()
    }

    /// Settings if hydrated.
    pub fn settings(&self) -> Option<Settings> {
        self.inner.state.borrow().ready().cloned()
    }

    /// Observe every state change, hydration included.
    pub fn watch(&self) -> watch::Receiver<Hydration<Settings>> {
        self.inner.state.subscribe()
    }

    /// Wait for hydration and return the settings.
    pub async fn ready(&self) -> Result<Settings, Error> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(Hydration::is_ready)
            .await
            .map_err(|_| Error::Unavailable("settings store closed".into()))?;
        state.ready().cloned().ok_or(Error::NotHydrated)
    }

    /// Wait until every write issued so far has reached storage.
    pub async fn flush(&self) -> Result<(), Error> {
        let (done, rx) = oneshot::channel();
        self.inner
            .writes
            .send(WriteCmd::Flush(done))
            .map_err(|_| Error::Storage("settings writer stopped".into()))?;
        rx.await
            .map_err(|_| Error::Storage("settings writer stopped".into()))
    }

    /// Apply `f` to the hydrated settings. When it reports a change, watchers
    /// are notified and a write is queued.
    fn update(&self, f: impl FnOnce(&mut Settings) -> bool) -> Result<bool, Error> {
        let mut outcome = Err(Error::NotHydrated);
        self.inner.state.send_if_modified(|state| match state {
            Hydration::Loading => false,
            Hydration::Ready(settings) => {
                let changed = f(settings);
                outcome = if changed {
                    serde_json::to_string(&PersistedEnvelope {
                        state: &*settings,
                        version: 0,
                    })
                    .map(Some)
                    .map_err(Error::from)
                } else {
                    Ok(None)
                };
                changed
            }
        });
        match outcome? {
            Some(json) => {
                self.inner
                    .writes
                    .send(WriteCmd::Persist(json))
                    .map_err(|_| Error::Storage("settings writer stopped".into()))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn set_default_folder_id(&self, id: Option<String>) -> Result<(), Error> {
        self.update(|s| replace(&mut s.default_folder_id, id))?;
        Ok(())
    }

    pub fn set_default_title_save_mode(&self, mode: TitleSaveMode) -> Result<(), Error> {
        self.update(|s| replace(&mut s.default_title_save_mode, mode))?;
        Ok(())
    }

    pub fn set_should_add_to_top(&self, top: bool) -> Result<(), Error> {
        self.update(|s| replace(&mut s.should_add_to_top, top))?;
        Ok(())
    }

    pub fn set_quick_access_enabled(&self, enabled: bool) -> Result<(), Error> {
        self.update(|s| replace(&mut s.is_quick_access_enabled, enabled))?;
        Ok(())
    }

    /// Replace the quick-access list. Later duplicates are dropped.
    pub fn set_quick_access_folder_ids(&self, ids: Vec<String>) -> Result<(), Error> {
        let mut unique: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        self.update(|s| replace(&mut s.quick_access_folder_ids, unique))?;
        Ok(())
    }

    /// Append `id`. Returns `false` if it was already listed.
    pub fn add_quick_access(&self, id: &str) -> Result<bool, Error> {
        self.update(|s| {
            if s.quick_access_folder_ids.iter().any(|existing| existing == id) {
                return false;
            }
            s.quick_access_folder_ids.push(id.to_string());
            true
        })
    }

    /// Drop `id`, keeping the order of the rest.
    pub fn remove_quick_access(&self, id: &str) -> Result<bool, Error> {
        self.update(|s| {
            let before = s.quick_access_folder_ids.len();
            s.quick_access_folder_ids.retain(|existing| existing != id);
            s.quick_access_folder_ids.len() != before
        })
    }

    /// Drag `active` onto the position of `over`.
    pub fn move_quick_access(&self, active: &str, over: &str) -> Result<bool, Error> {
        if active == over {
            return Ok(false);
        }
        self.update(|s| {
            let ids = &mut s.quick_access_folder_ids;
            match (
                ids.iter().position(|id| id == active),
                ids.iter().position(|id| id == over),
            ) {
                (Some(from), Some(to)) => {
                    array_move(ids, from, to);
                    true
                }
                _ => false,
            }
        })
    }

    /// Drop quick-access ids that no longer resolve to a folder in `folders`.
    pub fn retain_quick_access(&self, folders: &[FlatFolder]) -> Result<bool, Error> {
        self.update(|s| {
            let before = s.quick_access_folder_ids.len();
            s.quick_access_folder_ids
                .retain(|id| contains_folder(folders, id));
            let dropped = before - s.quick_access_folder_ids.len();
            if dropped > 0 {
                log::info!("Dropped {} stale quick access folder(s)", dropped);
            }
            dropped > 0
        })
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

/// Move the element at `from` to `to`, shifting the elements in between.
pub fn array_move<T>(items: &mut [T], from: usize, to: usize) {
    if from >= items.len() || to >= items.len() {
        return;
    }
    if from < to {
        items[from..=to].rotate_left(1);
    } else {
        items[to..=from].rotate_right(1);
    }
}

async fn run_writer(
    storage: Arc<dyn StorageArea>,
    key: String,
    surface: SurfaceId,
    mut rx: mpsc::UnboundedReceiver<WriteCmd>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WriteCmd::Persist(json) => {
                if let Err(e) = storage.set(&key, json, Some(surface)).await {
                    log::warn!("Failed to persist settings: {}", e);
                }
            }
            WriteCmd::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    log::debug!("Settings writer exiting");
}

async fn load_settings(storage: &dyn StorageArea, key: &str) -> Settings {
    match storage.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str::<PersistedEnvelope<Settings>>(&raw) {
            Ok(envelope) => envelope.state,
            Err(e) => {
                log::warn!("Stored settings unreadable, using defaults: {}", e);
                Settings::default()
            }
        },
        Ok(None) => {
            log::info!("No stored settings, using defaults");
            Settings::default()
        }
        Err(e) => {
            log::warn!("Failed to load settings, using defaults: {}", e);
            Settings::default()
        }
    }
}

/// Fields carried by a change another surface made to `key`.
fn patch_from_change(change: &StorageChange, key: &str, surface: SurfaceId) -> Option<SettingsPatch> {
    if change.key != key || change.writer == Some(surface) {
        return None;
    }
    let Some(raw) = change.new_value.as_deref() else {
        log::debug!("Settings key removed by another surface, keeping current values");
        return None;
    };
    match serde_json::from_str::<PersistedEnvelope<SettingsPatch>>(raw) {
        Ok(envelope) => Some(envelope.state),
        Err(e) => {
            log::warn!("Ignoring unreadable settings change: {}", e);
            None
        }
    }
}

async fn hydrate_and_listen(
    storage: Arc<dyn StorageArea>,
    inner: Weak<Inner>,
    feed: Option<ChangeFeed>,
) {
    let Some((key, surface)) = inner.upgrade().map(|i| (i.key.clone(), i.surface)) else {
        return;
    };
    let mut settings = load_settings(storage.as_ref(), &key).await;

    // Changes queued while loading may be newer than what was read.
    let mut feed = feed;
    if let Some(feed) = feed.as_mut() {
        while let Some(change) = feed.try_recv() {
            if let Some(patch) = patch_from_change(&change, &key, surface) {
                settings.apply(patch);
            }
        }
    }

    match inner.upgrade() {
        Some(i) => {
            i.state.send_replace(Hydration::Ready(settings));
            log::debug!("Settings hydrated for surface {}", surface);
        }
        None => return,
    }

    let Some(mut feed) = feed else {
        return;
    };
    while let Some(change) = feed.recv().await {
        let Some(i) = inner.upgrade() else {
            break;
        };
        let Some(patch) = patch_from_change(&change, &key, surface) else {
            continue;
        };
        i.state.send_if_modified(|state| match state {
            Hydration::Ready(current) => {
                let before = current.clone();
                current.apply(patch);
                *current != before
            }
            Hydration::Loading => false,
        });
    }
}
