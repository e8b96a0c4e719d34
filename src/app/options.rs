use std::sync::Arc;

use url::Url;

use crate::core::folders::{contains_folder, fetch_flat_folder_list, folder_display_title};
use crate::core::host::BookmarkApi;
use crate::core::models::{FlatFolder, Settings, TitleSaveMode};
use crate::core::settings::SettingsStore;
use crate::Error;

use super::folder_label;

pub const OPTIONS_PAGE: &str = "options.html";
const TAB_PARAM: &str = "tab";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OptionsTab {
    Welcome,
    Changelog,
    #[default]
    Options,
}

impl OptionsTab {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionsTab::Welcome => "welcome",
            OptionsTab::Changelog => "changelog",
            OptionsTab::Options => "options",
        }
    }

    /// Unknown or missing values select the options tab.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("welcome") => OptionsTab::Welcome,
            Some("changelog") => OptionsTab::Changelog,
            _ => OptionsTab::Options,
        }
    }

    pub fn from_location(location: &Url) -> Self {
        let value = location
            .query_pairs()
            .find(|(k, _)| k == TAB_PARAM)
            .map(|(_, v)| v.into_owned());
        Self::parse(value.as_deref())
    }

    /// `location` with its `tab` parameter set to this tab; other parameters are kept.
    pub fn apply_to(&self, location: &Url) -> Url {
        let kept: Vec<(String, String)> = location
            .query_pairs()
            .filter(|(k, _)| k != TAB_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let mut url = location.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (k, v) in &kept {
                pairs.append_pair(k, v);
            }
            pairs.append_pair(TAB_PARAM, self.as_str());
        }
        url
    }

    /// The options page under the extension `base` URL, opened on this tab.
    pub fn page_url(&self, base: &Url) -> Result<Url, Error> {
        let page = base
            .join(OPTIONS_PAGE)
            .map_err(|e| Error::InvalidInput(format!("bad extension base URL: {e}")))?;
        Ok(self.apply_to(&page))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionsMessage {
    TabSelected(OptionsTab),
    TitleModeSelected(TitleSaveMode),
    AddToTopToggled(bool),
    QuickAccessToggled(bool),
    QuickAccessAdded(String),
    QuickAccessRemoved(String),
    QuickAccessDragged { active: String, over: String },
}

/// A row of the quick-access list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickAccessRow {
    pub id: String,
    pub title: String,
    pub is_default: bool,
}

/// A row of the "add folder to quick access" picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerRow {
    pub id: String,
    pub label: String,
    pub disabled: bool,
}

pub struct OptionsModel<H: BookmarkApi + ?Sized> {
    host: Arc<H>,
    store: SettingsStore,
    pub tab: OptionsTab,
    pub location: Url,
    pub folders: Vec<FlatFolder>,
}

impl<H: BookmarkApi + ?Sized> OptionsModel<H> {
    /// Open the options page at `location`. Waits for hydration, then drops
    /// quick-access entries whose folder no longer exists.
    pub async fn open(host: Arc<H>, store: SettingsStore, location: Url) -> Result<Self, Error> {
        let tab = OptionsTab::from_location(&location);
        store.ready().await?;
        let folders = fetch_flat_folder_list(host.as_ref()).await?;
        store.retain_quick_access(&folders)?;
        log::debug!("Options opened on {} tab", tab.as_str());
        Ok(OptionsModel {
            host,
            store,
            tab,
            location,
            folders,
        })
    }

    pub fn settings(&self) -> Result<Settings, Error> {
        self.store.settings().ok_or(Error::NotHydrated)
    }

    pub async fn refresh_folders(&mut self) -> Result<(), Error> {
        self.folders = fetch_flat_folder_list(self.host.as_ref()).await?;
        Ok(())
    }

    pub fn update(&mut self, message: OptionsMessage) -> Result<(), Error> {
        match message {
            OptionsMessage::TabSelected(tab) => {
                self.tab = tab;
                self.location = tab.apply_to(&self.location);
            }
            OptionsMessage::TitleModeSelected(mode) => {
                self.store.set_default_title_save_mode(mode)?;
            }
            OptionsMessage::AddToTopToggled(top) => {
                self.store.set_should_add_to_top(top)?;
            }
            OptionsMessage::QuickAccessToggled(enabled) => {
                self.store.set_quick_access_enabled(enabled)?;
            }
            OptionsMessage::QuickAccessAdded(id) => {
                if !contains_folder(&self.folders, &id) {
                    return Err(Error::NotFound(format!("folder {id}")));
                }
                if !self.store.add_quick_access(&id)? {
                    log::debug!("Folder {} already in quick access", id);
                }
            }
            OptionsMessage::QuickAccessRemoved(id) => {
                self.store.remove_quick_access(&id)?;
            }
            OptionsMessage::QuickAccessDragged { active, over } => {
                self.store.move_quick_access(&active, &over)?;
            }
        }
        Ok(())
    }

    /// Quick-access folders in list order. Ids without a folder are skipped.
    pub fn quick_access_rows(&self) -> Vec<QuickAccessRow> {
        let Some(settings) = self.store.settings() else {
            return Vec::new();
        };
        settings
            .quick_access_folder_ids
            .iter()
            .filter_map(|id| self.folders.iter().find(|f| &f.id == id))
            .map(|folder| QuickAccessRow {
                id: folder.id.clone(),
                title: folder_display_title(&folder.title).to_string(),
                is_default: settings.default_folder_id.as_deref() == Some(folder.id.as_str()),
            })
            .collect()
    }

    pub fn picker_rows(&self) -> Vec<PickerRow> {
        let settings = self.store.settings().unwrap_or_default();
        self.folders
            .iter()
            .map(|folder| {
                let disabled = settings.quick_access_folder_ids.contains(&folder.id);
                let mut label = folder_label(folder, settings.default_folder_id.as_deref());
                if disabled {
                    label.push_str(" (already added)");
                }
                PickerRow {
                    id: folder.id.clone(),
                    label,
                    disabled,
                }
            })
            .collect()
    }
}
