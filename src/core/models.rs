use serde::{Deserialize, Serialize};

/// Id of the synthetic root node that holds the top-level system folders.
pub const ROOT_ID: &str = "0";
/// Id of the bookmarks bar folder.
pub const BOOKMARKS_BAR_ID: &str = "1";
/// Id of the "Other bookmarks" folder, the fallback save location.
pub const OTHER_BOOKMARKS_ID: &str = "2";
/// Joins the custom note and the original page title.
pub const TITLE_SEPARATOR: &str = "   · · ·   ";
/// Storage key of the persisted settings record.
pub const STORE_KEY: &str = "deeboo-storage";

/// A node of the host bookmark tree. Nodes without a URL are folders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkNode {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<BookmarkNode>>,
}

impl BookmarkNode {
    pub fn is_folder(&self) -> bool {
        self.url.is_none()
    }
}

/// Parameters for creating a bookmark or folder. A missing `url` creates a folder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateDetails {
    pub parent_id: String,
    pub title: String,
    pub url: Option<String>,
    pub index: Option<usize>,
}

/// The active browser tab. Special pages may have neither title nor URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tab {
    pub title: Option<String>,
    pub url: Option<String>,
}

impl Tab {
    pub fn title_or_empty(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }
}

/// One row of a flat folder picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatFolder {
    pub id: String,
    pub title: String,
    pub indented_title: String,
}

/// How a bookmark title is built from the user's note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TitleSaveMode {
    /// Title is exactly the note.
    #[default]
    #[serde(rename = "just-custom")]
    JustCustom,
    /// Title is note + separator + original page title.
    #[serde(rename = "custom-and-original")]
    CustomAndOriginal,
}

impl TitleSaveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TitleSaveMode::JustCustom => "just-custom",
            TitleSaveMode::CustomAndOriginal => "custom-and-original",
        }
    }
}

/// The persisted settings record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub default_folder_id: Option<String>,
    pub default_title_save_mode: TitleSaveMode,
    pub should_add_to_top: bool,
    pub quick_access_folder_ids: Vec<String>,
    pub is_quick_access_enabled: bool,
}

/// Partial settings as carried by a change notification. Only fields present
/// in the payload are applied.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, deserialize_with = "present")]
    pub default_folder_id: Option<Option<String>>,
    pub default_title_save_mode: Option<TitleSaveMode>,
    pub should_add_to_top: Option<bool>,
    pub quick_access_folder_ids: Option<Vec<String>>,
    pub is_quick_access_enabled: Option<bool>,
}

/// Distinguishes an explicit `null` from an absent field.
fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl Settings {
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(id) = patch.default_folder_id {
            self.default_folder_id = id;
        }
        if let Some(mode) = patch.default_title_save_mode {
            self.default_title_save_mode = mode;
        }
        if let Some(top) = patch.should_add_to_top {
            self.should_add_to_top = top;
        }
        if let Some(ids) = patch.quick_access_folder_ids {
            self.quick_access_folder_ids = ids;
        }
        if let Some(enabled) = patch.is_quick_access_enabled {
            self.is_quick_access_enabled = enabled;
        }
    }
}

/// On-disk envelope: `{"state": {...}, "version": 0}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEnvelope<T> {
    pub state: T,
    #[serde(default)]
    pub version: u32,
}
