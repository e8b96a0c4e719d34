pub mod keys;
pub mod lifecycle;
pub mod options;
pub mod popup;

use crate::core::models::FlatFolder;

/// Picker label for `folder`, marking the default folder.
pub(crate) fn folder_label(folder: &FlatFolder, default_folder_id: Option<&str>) -> String {
    if default_folder_id == Some(folder.id.as_str()) {
        format!("{} (DEFAULT)", folder.indented_title)
    } else {
        folder.indented_title.clone()
    }
}
