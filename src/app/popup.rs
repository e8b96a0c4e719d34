use std::sync::Arc;
use std::time::Instant;

use crate::core::folders::{
    contains_folder, fetch_flat_folder_list, find_folder, folder_display_title,
    split_at_other_bookmarks, truncate_title,
};
use crate::core::host::{self, BookmarkApi, TabApi, TabBookmarks};
use crate::core::models::{BookmarkNode, FlatFolder, Tab, TitleSaveMode, OTHER_BOOKMARKS_ID};
use crate::core::settings::SettingsStore;
use crate::core::title::{compose_title, parse_title, switch_mode};
use crate::Error;

use super::folder_label;
use super::keys::{is_close_shortcut, DoublePressDetector, KeyPress};

const QUICK_ACCESS_KEYS: [&str; 9] = ["1", "2", "3", "4", "5", "6", "7", "8", "9"];
const CAPTION_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupPhase {
    Uninitialized,
    Hydrating,
    ResolvingTab,
    ExistingBookmark,
    NoBookmarkCreating,
    Ready,
    Closed,
}

/// Whether the popup saved the page on open or found it already bookmarked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookmarkStatus {
    AddedNow,
    Existing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupMessage {
    NoteChanged(String),
    ModeChanged(TitleSaveMode),
    FolderSelected(String),
    CreateFolder { title: String, parent_id: String },
    ToggleDefaultFolder,
    Remove,
    Done,
    Key(KeyPress),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupFlow {
    Continue,
    Close,
}

/// One entry of the folder select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderOption {
    pub id: String,
    pub label: String,
}

pub struct PopupModel<H: BookmarkApi + TabApi + ?Sized> {
    host: Arc<H>,
    store: SettingsStore,
    pub phase: PopupPhase,
    pub status: BookmarkStatus,
    pub folders: Vec<FlatFolder>,
    pub selected_folder_id: String,
    pub note: String,
    pub mode: TitleSaveMode,
    pub tab: Tab,
    /// Last node returned by the host for this tab's bookmark.
    pub bookmark: Option<BookmarkNode>,
    double_press: DoublePressDetector,
}

impl<H: BookmarkApi + TabApi + ?Sized> PopupModel<H> {
    pub fn new(host: Arc<H>, store: SettingsStore) -> Self {
        PopupModel {
            host,
            store,
            phase: PopupPhase::Uninitialized,
            status: BookmarkStatus::AddedNow,
            folders: Vec::new(),
            selected_folder_id: OTHER_BOOKMARKS_ID.to_string(),
            note: String::new(),
            mode: TitleSaveMode::JustCustom,
            tab: Tab::default(),
            bookmark: None,
            double_press: DoublePressDetector::new(QUICK_ACCESS_KEYS),
        }
    }

    /// Run the open flow: wait for settings, then either adopt the tab's
    /// existing bookmark or save the tab right away.
    pub async fn open(&mut self) -> Result<(), Error> {
        self.phase = PopupPhase::Hydrating;
        let settings = self.store.ready().await?;

        self.phase = PopupPhase::ResolvingTab;
        self.folders = fetch_flat_folder_list(self.host.as_ref()).await?;
        let TabBookmarks { tab, bookmarks } = host::current_tab_and_bookmarks(self.host.as_ref()).await?;
        self.tab = tab;

        if let Some(existing) = bookmarks.into_iter().next() {
            self.phase = PopupPhase::ExistingBookmark;
            let parsed = parse_title(&existing.title);
            self.note = parsed.note;
            self.mode = parsed.mode;
            self.selected_folder_id = existing
                .parent_id
                .clone()
                .unwrap_or_else(|| OTHER_BOOKMARKS_ID.to_string());
            self.status = BookmarkStatus::Existing;
            log::debug!(
                "Tab already bookmarked as {} in {}",
                existing.id,
                self.selected_folder_id
            );
            self.bookmark = Some(existing);
        } else {
            self.phase = PopupPhase::NoBookmarkCreating;
            self.note = self.tab.title_or_empty().to_string();

            let folder_id = match settings.default_folder_id {
                Some(id) if contains_folder(&self.folders, &id) => id,
                Some(stale) => {
                    log::info!("Default folder {} no longer exists, clearing it", stale);
                    self.store.set_default_folder_id(None)?;
                    OTHER_BOOKMARKS_ID.to_string()
                }
                None => OTHER_BOOKMARKS_ID.to_string(),
            };
            self.selected_folder_id = folder_id;

            let created = host::create_bookmark_of_current_tab(
                self.host.as_ref(),
                &self.selected_folder_id,
                settings.should_add_to_top,
            )
            .await?;
            log::debug!("Saved tab as {} in {}", created.id, self.selected_folder_id);
            self.bookmark = Some(created);
            self.status = BookmarkStatus::AddedNow;

            if settings.default_title_save_mode == TitleSaveMode::CustomAndOriginal {
                self.mode = TitleSaveMode::CustomAndOriginal;
                self.note.clear();
            }
        }

        self.phase = PopupPhase::Ready;
        Ok(())
    }

    pub async fn update(&mut self, message: PopupMessage) -> Result<PopupFlow, Error> {
        if self.phase == PopupPhase::Closed {
            return Ok(PopupFlow::Close);
        }
        match message {
            PopupMessage::Done => return Ok(self.close()),
            PopupMessage::Key(press) => return self.handle_key(press, Instant::now()).await,
            PopupMessage::NoteChanged(text) => self.handle_note(text).await?,
            PopupMessage::ModeChanged(mode) => self.handle_mode(mode).await?,
            PopupMessage::FolderSelected(id) => self.handle_folder(id).await?,
            PopupMessage::CreateFolder { title, parent_id } => {
                self.handle_create_folder(&title, &parent_id).await?
            }
            PopupMessage::ToggleDefaultFolder => self.toggle_default_folder()?,
            PopupMessage::Remove => {
                self.ensure_ready()?;
                let removed = host::remove_bookmarks_of_current_tab(self.host.as_ref()).await?;
                log::debug!("Removed {} bookmark(s), closing", removed);
                self.bookmark = None;
                return Ok(self.close());
            }
        }
        Ok(PopupFlow::Continue)
    }

    /// Key-down with an explicit timestamp, for double-press detection.
    pub async fn handle_key(&mut self, press: KeyPress, at: Instant) -> Result<PopupFlow, Error> {
        if is_close_shortcut(&press) {
            return Ok(self.close());
        }
        let Some(digit) = self.double_press.press(&press.key, at) else {
            return Ok(PopupFlow::Continue);
        };
        let Some(settings) = self.store.settings() else {
            return Ok(PopupFlow::Continue);
        };
        if !settings.is_quick_access_enabled {
            return Ok(PopupFlow::Continue);
        }
        let target = digit
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| settings.quick_access_folder_ids.get(i))
            .filter(|id| contains_folder(&self.folders, id))
            .cloned();
        if let Some(id) = target {
            log::debug!("Quick access {} -> folder {}", digit, id);
            self.handle_folder(id).await?;
        }
        Ok(PopupFlow::Continue)
    }

    fn ensure_ready(&self) -> Result<(), Error> {
        match self.phase {
            PopupPhase::Ready => Ok(()),
            phase => Err(Error::InvalidInput(format!("popup is {phase:?}, not ready"))),
        }
    }

    fn current_title(&self) -> Result<&str, Error> {
        self.bookmark
            .as_ref()
            .map(|b| b.title.as_str())
            .ok_or_else(|| Error::NotFound("no bookmark for current tab".into()))
    }

    async fn handle_note(&mut self, text: String) -> Result<(), Error> {
        self.ensure_ready()?;
        let title = compose_title(self.mode, &text, self.tab.title_or_empty());
        let renamed = host::rename_current_tab_bookmarks(self.host.as_ref(), &title).await?;
        self.note = text;
        self.bookmark = Some(renamed);
        Ok(())
    }

    async fn handle_mode(&mut self, mode: TitleSaveMode) -> Result<(), Error> {
        self.ensure_ready()?;
        // Switching to the active mode would append the page title again.
        if mode == self.mode {
            return Ok(());
        }
        let switch = switch_mode(mode, self.current_title()?, self.tab.title_or_empty());
        let renamed = host::rename_current_tab_bookmarks(self.host.as_ref(), &switch.title).await?;
        self.mode = mode;
        self.note = switch.note;
        self.bookmark = Some(renamed);
        Ok(())
    }

    async fn handle_folder(&mut self, id: String) -> Result<(), Error> {
        self.ensure_ready()?;
        let moved = host::move_current_tab_bookmarks(self.host.as_ref(), &id).await?;
        self.selected_folder_id = id;
        self.bookmark = Some(moved);
        Ok(())
    }

    async fn handle_create_folder(&mut self, title: &str, parent_id: &str) -> Result<(), Error> {
        self.ensure_ready()?;
        if title.trim().is_empty() {
            return Err(Error::InvalidInput("folder title is blank".into()));
        }
        let folder_id = host::create_folder(self.host.as_ref(), title, parent_id).await?;
        self.folders = fetch_flat_folder_list(self.host.as_ref()).await?;
        self.handle_folder(folder_id).await
    }

    fn toggle_default_folder(&mut self) -> Result<(), Error> {
        self.ensure_ready()?;
        if self.is_selected_default() {
            self.store.set_default_folder_id(None)
        } else {
            self.store
                .set_default_folder_id(Some(self.selected_folder_id.clone()))
        }
    }

    fn close(&mut self) -> PopupFlow {
        match self.host.close_popup() {
            Ok(()) => log::debug!("Popup closed"),
            Err(e) => log::debug!("Popup close ignored: {}", e),
        }
        self.phase = PopupPhase::Closed;
        PopupFlow::Close
    }

    pub fn default_folder_id(&self) -> Option<String> {
        self.store.settings().and_then(|s| s.default_folder_id)
    }

    pub fn is_selected_default(&self) -> bool {
        self.default_folder_id().as_deref() == Some(self.selected_folder_id.as_str())
    }

    /// Selected folder title as shown in the set/unset-default dialog.
    pub fn selected_folder_caption(&self) -> String {
        let title = find_folder(&self.folders, &self.selected_folder_id)
            .map(|f| f.title.as_str())
            .unwrap_or("");
        if title.trim().is_empty() {
            folder_display_title(title).to_string()
        } else {
            truncate_title(title, CAPTION_MAX_CHARS)
        }
    }

    /// Folder select entries, grouped before and from "Other bookmarks".
    pub fn folder_options(&self) -> (Vec<FolderOption>, Vec<FolderOption>) {
        let default = self.default_folder_id();
        let (head, tail) = split_at_other_bookmarks(&self.folders);
        let to_options = |group: &[FlatFolder]| {
            group
                .iter()
                .map(|f| FolderOption {
                    id: f.id.clone(),
                    label: folder_label(f, default.as_deref()),
                })
                .collect::<Vec<_>>()
        };
        (to_options(head), to_options(tail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory_host::MemoryHost;
    use crate::core::models::TITLE_SEPARATOR;
    use crate::core::store::MemoryStorage;
    use std::time::Duration;

    const PAGE_URL: &str = "https://example.com/article";
    const PAGE_TITLE: &str = "Example Article";

    async fn fixture() -> (Arc<MemoryHost>, SettingsStore) {
        let host = Arc::new(MemoryHost::new());
        host.set_active_tab(Tab {
            title: Some(PAGE_TITLE.into()),
            url: Some(PAGE_URL.into()),
        })
        .unwrap();
        let store = SettingsStore::open(Arc::new(MemoryStorage::new()));
        store.ready().await.unwrap();
        (host, store)
    }

    async fn opened(host: &Arc<MemoryHost>, store: &SettingsStore) -> PopupModel<MemoryHost> {
        let mut popup = PopupModel::new(host.clone(), store.clone());
        popup.open().await.unwrap();
        assert_eq!(popup.phase, PopupPhase::Ready);
        popup
    }

    #[tokio::test]
    async fn new_tab_goes_to_other_bookmarks_without_default() {
        let (host, store) = fixture().await;
        let popup = opened(&host, &store).await;

        assert_eq!(popup.status, BookmarkStatus::AddedNow);
        assert_eq!(popup.selected_folder_id, OTHER_BOOKMARKS_ID);
        assert_eq!(popup.note, PAGE_TITLE);
        let saved = popup.bookmark.unwrap();
        assert_eq!(saved.title, PAGE_TITLE);
        assert_eq!(saved.parent_id.as_deref(), Some(OTHER_BOOKMARKS_ID));
    }

    #[tokio::test]
    async fn stale_default_falls_back_and_is_cleared() {
        let (host, store) = fixture().await;
        store.set_default_folder_id(Some("999".into())).unwrap();

        let popup = opened(&host, &store).await;
        assert_eq!(popup.selected_folder_id, OTHER_BOOKMARKS_ID);
        assert_eq!(store.settings().unwrap().default_folder_id, None);
    }

    #[tokio::test]
    async fn live_default_with_add_to_top() {
        let (host, store) = fixture().await;
        let reading = host.add_folder("1", "Reading").unwrap();
        host.add_bookmark(&reading, "older", "https://older.example/").unwrap();
        store.set_default_folder_id(Some(reading.clone())).unwrap();
        store.set_should_add_to_top(true).unwrap();

        let popup = opened(&host, &store).await;
        let saved = popup.bookmark.clone().unwrap();
        assert_eq!(popup.selected_folder_id, reading);
        assert_eq!(host.child_ids(&reading).unwrap()[0], saved.id);
        assert!(popup.is_selected_default());
    }

    #[tokio::test]
    async fn default_custom_and_original_clears_note() {
        let (host, store) = fixture().await;
        store
            .set_default_title_save_mode(TitleSaveMode::CustomAndOriginal)
            .unwrap();

        let mut popup = opened(&host, &store).await;
        assert_eq!(popup.mode, TitleSaveMode::CustomAndOriginal);
        assert_eq!(popup.note, "");
        // The page is saved under its own title until the note is edited.
        assert_eq!(popup.bookmark.as_ref().unwrap().title, PAGE_TITLE);

        popup
            .update(PopupMessage::NoteChanged("read later".into()))
            .await
            .unwrap();
        assert_eq!(
            popup.bookmark.unwrap().title,
            format!("read later{TITLE_SEPARATOR}{PAGE_TITLE}")
        );
    }

    #[tokio::test]
    async fn existing_bookmark_is_adopted_with_its_mode() {
        let (host, store) = fixture().await;
        let reading = host.add_folder("1", "Reading").unwrap();
        let id = host
            .add_bookmark(&reading, &format!("todo{TITLE_SEPARATOR}{PAGE_TITLE}"), PAGE_URL)
            .unwrap();

        let popup = opened(&host, &store).await;
        assert_eq!(popup.status, BookmarkStatus::Existing);
        assert_eq!(popup.mode, TitleSaveMode::CustomAndOriginal);
        assert_eq!(popup.note, "todo");
        assert_eq!(popup.selected_folder_id, reading);
        assert_eq!(popup.bookmark.unwrap().id, id);
        // Nothing new was created.
        assert_eq!(host.child_ids(OTHER_BOOKMARKS_ID).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn mode_switch_round_trip() {
        let (host, store) = fixture().await;
        host.add_bookmark("1", "Notes", PAGE_URL).unwrap();

        let mut popup = opened(&host, &store).await;
        assert_eq!(popup.mode, TitleSaveMode::JustCustom);

        popup
            .update(PopupMessage::ModeChanged(TitleSaveMode::CustomAndOriginal))
            .await
            .unwrap();
        assert_eq!(
            popup.bookmark.as_ref().unwrap().title,
            format!("Notes{TITLE_SEPARATOR}{PAGE_TITLE}")
        );
        assert_eq!(popup.note, "Notes");

        popup
            .update(PopupMessage::ModeChanged(TitleSaveMode::JustCustom))
            .await
            .unwrap();
        assert_eq!(popup.bookmark.as_ref().unwrap().title, "Notes");
        assert_eq!(popup.note, "Notes");
    }

    #[tokio::test]
    async fn reselecting_active_mode_keeps_title() {
        let (host, store) = fixture().await;
        let id = host.add_bookmark("1", "Notes", PAGE_URL).unwrap();

        let mut popup = opened(&host, &store).await;
        for _ in 0..2 {
            popup
                .update(PopupMessage::ModeChanged(TitleSaveMode::CustomAndOriginal))
                .await
                .unwrap();
        }
        let expected = format!("Notes{TITLE_SEPARATOR}{PAGE_TITLE}");
        assert_eq!(popup.bookmark.as_ref().unwrap().title, expected);
        assert_eq!(popup.note, "Notes");
        assert_eq!(host.node(&id).unwrap().title, expected);

        let reopened = opened(&host, &store).await;
        assert_eq!(reopened.mode, TitleSaveMode::CustomAndOriginal);
        assert_eq!(reopened.note, "Notes");
    }

    #[tokio::test]
    async fn failed_rename_keeps_previous_note() {
        let (host, store) = fixture().await;
        let mut popup = opened(&host, &store).await;
        let id = popup.bookmark.as_ref().unwrap().id.clone();
        host.remove(&id).await.unwrap();

        let result = popup
            .update(PopupMessage::NoteChanged("edited".into()))
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(popup.note, PAGE_TITLE);
        assert_eq!(popup.bookmark.as_ref().unwrap().title, PAGE_TITLE);
    }

    #[tokio::test]
    async fn create_folder_moves_bookmark_into_it() {
        let (host, store) = fixture().await;
        let mut popup = opened(&host, &store).await;

        assert!(matches!(
            popup
                .update(PopupMessage::CreateFolder {
                    title: "  ".into(),
                    parent_id: OTHER_BOOKMARKS_ID.into(),
                })
                .await,
            Err(Error::InvalidInput(_))
        ));

        popup
            .update(PopupMessage::CreateFolder {
                title: "Recipes".into(),
                parent_id: "1".into(),
            })
            .await
            .unwrap();
        let folder = popup.folders.iter().find(|f| f.title == "Recipes").unwrap();
        assert_eq!(popup.selected_folder_id, folder.id);
        assert_eq!(
            popup.bookmark.as_ref().unwrap().parent_id.as_deref(),
            Some(folder.id.as_str())
        );
    }

    #[tokio::test]
    async fn toggle_default_sets_then_clears() {
        let (host, store) = fixture().await;
        let mut popup = opened(&host, &store).await;

        popup.update(PopupMessage::ToggleDefaultFolder).await.unwrap();
        assert_eq!(
            store.settings().unwrap().default_folder_id.as_deref(),
            Some(OTHER_BOOKMARKS_ID)
        );
        let (head, tail) = popup.folder_options();
        assert!(head.iter().all(|o| !o.label.ends_with(" (DEFAULT)")));
        assert!(tail[0].label.ends_with("Other bookmarks (DEFAULT)"));

        popup.update(PopupMessage::ToggleDefaultFolder).await.unwrap();
        assert_eq!(store.settings().unwrap().default_folder_id, None);
    }

    #[tokio::test]
    async fn remove_deletes_every_copy_and_closes() {
        let (host, store) = fixture().await;
        host.add_bookmark("1", "one", PAGE_URL).unwrap();
        host.add_bookmark(OTHER_BOOKMARKS_ID, "two", PAGE_URL).unwrap();

        let mut popup = opened(&host, &store).await;
        let flow = popup.update(PopupMessage::Remove).await.unwrap();
        assert_eq!(flow, PopupFlow::Close);
        assert_eq!(popup.phase, PopupPhase::Closed);
        assert!(host.child_ids("1").unwrap().is_empty());
        assert!(host.child_ids(OTHER_BOOKMARKS_ID).unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_failure_is_tolerated() {
        let (host, store) = fixture().await;
        host.set_close_fails(true).unwrap();
        let mut popup = opened(&host, &store).await;

        let flow = popup
            .update(PopupMessage::Key(KeyPress::meta("d")))
            .await
            .unwrap();
        assert_eq!(flow, PopupFlow::Close);
        assert_eq!(popup.phase, PopupPhase::Closed);
        assert_eq!(host.close_requests().unwrap(), 1);

        // Further messages are no-ops.
        let flow = popup.update(PopupMessage::Done).await.unwrap();
        assert_eq!(flow, PopupFlow::Close);
        assert_eq!(host.close_requests().unwrap(), 1);
    }

    #[tokio::test]
    async fn plain_keys_keep_popup_open() {
        let (host, store) = fixture().await;
        let mut popup = opened(&host, &store).await;
        let flow = popup
            .update(PopupMessage::Key(KeyPress::plain("d")))
            .await
            .unwrap();
        assert_eq!(flow, PopupFlow::Continue);
        let flow = popup
            .update(PopupMessage::Key(KeyPress::plain("Enter")))
            .await
            .unwrap();
        assert_eq!(flow, PopupFlow::Close);
    }

    #[tokio::test]
    async fn double_digit_jumps_to_quick_access_folder() {
        let (host, store) = fixture().await;
        let reading = host.add_folder("1", "Reading").unwrap();
        let work = host.add_folder("1", "Work").unwrap();
        store
            .set_quick_access_folder_ids(vec![reading.clone(), work.clone()])
            .unwrap();

        let mut popup = opened(&host, &store).await;
        let t0 = Instant::now();

        // Disabled: nothing moves.
        popup.handle_key(KeyPress::plain("2"), t0).await.unwrap();
        popup
            .handle_key(KeyPress::plain("2"), t0 + Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(popup.selected_folder_id, OTHER_BOOKMARKS_ID);

        store.set_quick_access_enabled(true).unwrap();
        popup
            .handle_key(KeyPress::plain("2"), t0 + Duration::from_millis(1000))
            .await
            .unwrap();
        popup
            .handle_key(KeyPress::plain("2"), t0 + Duration::from_millis(1100))
            .await
            .unwrap();
        assert_eq!(popup.selected_folder_id, work);
        assert_eq!(
            popup.bookmark.as_ref().unwrap().parent_id.as_deref(),
            Some(work.as_str())
        );

        // No third entry.
        popup
            .handle_key(KeyPress::plain("3"), t0 + Duration::from_millis(2000))
            .await
            .unwrap();
        popup
            .handle_key(KeyPress::plain("3"), t0 + Duration::from_millis(2100))
            .await
            .unwrap();
        assert_eq!(popup.selected_folder_id, work);
    }

    #[test]
    fn caption_truncates_long_titles() {
        let host = Arc::new(MemoryHost::new());
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let _guard = rt.enter();
        let store = SettingsStore::open(Arc::new(MemoryStorage::new()));
        let mut popup = PopupModel::new(host, store);

        popup.folders = vec![
            FlatFolder {
                id: "7".into(),
                title: "x".repeat(120),
                indented_title: String::new(),
            },
            FlatFolder {
                id: "8".into(),
                title: " ".into(),
                indented_title: String::new(),
            },
        ];
        popup.selected_folder_id = "7".into();
        let caption = popup.selected_folder_caption();
        assert_eq!(caption.chars().count(), 103);
        assert!(caption.ends_with("..."));

        popup.selected_folder_id = "8".into();
        assert_eq!(popup.selected_folder_caption(), "⚠️ untitled folder");
    }
}
