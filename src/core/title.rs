//! Bookmark title modes: a custom note alone, or the note followed by the
//! original page title.

use crate::core::models::{TitleSaveMode, TITLE_SEPARATOR};

/// A stored title split into its mode and the note shown for editing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTitle {
    pub mode: TitleSaveMode,
    pub note: String,
}

/// Detect the mode of an existing bookmark title. Only a title that splits
/// into exactly two parts around the separator counts as note + page title;
/// a note that itself contains the separator reads as `JustCustom`.
pub fn parse_title(title: &str) -> ParsedTitle {
    let parts: Vec<&str> = title.split(TITLE_SEPARATOR).collect();
    if parts.len() == 2 {
        ParsedTitle {
            mode: TitleSaveMode::CustomAndOriginal,
            note: parts[0].to_string(),
        }
    } else {
        ParsedTitle {
            mode: TitleSaveMode::JustCustom,
            note: title.to_string(),
        }
    }
}

/// Build the title to store for `note` under `mode`.
pub fn compose_title(mode: TitleSaveMode, note: &str, page_title: &str) -> String {
    match mode {
        TitleSaveMode::JustCustom => note.to_string(),
        TitleSaveMode::CustomAndOriginal => format!("{note}{TITLE_SEPARATOR}{page_title}"),
    }
}

/// The part of a stored title before the first separator.
pub fn custom_part(title: &str) -> &str {
    title.split(TITLE_SEPARATOR).next().unwrap_or(title)
}

/// Result of switching the mode of an existing bookmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSwitch {
    /// Title to write to the bookmark.
    pub title: String,
    /// Note to show in the input field.
    pub note: String,
}

/// Compute the new stored title and displayed note when the user switches
/// to `target` while the bookmark is titled `current_title`.
pub fn switch_mode(target: TitleSaveMode, current_title: &str, page_title: &str) -> ModeSwitch {
    match target {
        TitleSaveMode::CustomAndOriginal => ModeSwitch {
            title: format!("{current_title}{TITLE_SEPARATOR}{page_title}"),
            note: current_title.to_string(),
        },
        TitleSaveMode::JustCustom => {
            let custom = custom_part(current_title).to_string();
            ModeSwitch {
                title: custom.clone(),
                note: custom,
            }
        }
    }
}
