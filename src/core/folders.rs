//! Projection of the bookmark tree into a flat, indented folder list.

use crate::core::host::BookmarkApi;
use crate::core::models::{BookmarkNode, FlatFolder, OTHER_BOOKMARKS_ID, ROOT_ID};
use crate::Error;

const NBSP: char = '\u{a0}';
const INDENT_WIDTH: usize = 6;
const BULLET: &str = "· ";
const UNTITLED_FOLDER: &str = "⚠️ untitled folder";

/// Flatten every folder of `tree` in pre-order, skipping the synthetic root
/// and all bookmark leaves.
pub fn flatten_folders(tree: &[BookmarkNode]) -> Vec<FlatFolder> {
    let mut out = Vec::new();
    walk(tree, 0, &mut out);
    out
}

fn walk(nodes: &[BookmarkNode], level: usize, out: &mut Vec<FlatFolder>) {
    for node in nodes {
        if !node.is_folder() {
            continue;
        }
        if node.id != ROOT_ID {
            out.push(FlatFolder {
                id: node.id.clone(),
                title: node.title.clone(),
                indented_title: indented_title(&node.title, level),
            });
        }
        if let Some(children) = &node.children {
            walk(children, level + 1, out);
        }
    }
}

/// Display label for a folder at `level` (root children are level 1).
pub fn indented_title(title: &str, level: usize) -> String {
    let pad = INDENT_WIDTH * level.saturating_sub(1);
    let mut s = String::with_capacity(title.len() + pad * 2 + 4);
    s.push(NBSP);
    s.extend(std::iter::repeat(NBSP).take(pad));
    if level >= 2 {
        s.push_str(BULLET);
    }
    s.push_str(title);
    s
}

/// Fetch the live tree from the host and flatten it.
pub async fn fetch_flat_folder_list<H: BookmarkApi + ?Sized>(
    host: &H,
) -> Result<Vec<FlatFolder>, Error> {
    let tree = host.get_tree().await?;
    let list = flatten_folders(&tree);
    log::debug!("Flattened {} folders", list.len());
    Ok(list)
}

pub fn find_folder<'a>(list: &'a [FlatFolder], id: &str) -> Option<&'a FlatFolder> {
    list.iter().find(|f| f.id == id)
}

pub fn contains_folder(list: &[FlatFolder], id: &str) -> bool {
    list.iter().any(|f| f.id == id)
}

/// Split a picker list at "Other bookmarks" so a separator can be drawn
/// between the bookmarks-bar group and the rest.
pub fn split_at_other_bookmarks(list: &[FlatFolder]) -> (&[FlatFolder], &[FlatFolder]) {
    match list.iter().position(|f| f.id == OTHER_BOOKMARKS_ID) {
        Some(idx) => list.split_at(idx),
        None => (list, &[]),
    }
}

/// Blank folder titles get a visible placeholder.
pub fn folder_display_title(title: &str) -> &str {
    if title.trim().is_empty() {
        UNTITLED_FOLDER
    } else {
        title
    }
}

/// Cut `title` to `max` characters, marking the cut with `...`.
pub fn truncate_title(title: &str, max: usize) -> String {
    match title.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}...", &title[..byte_idx]),
        None => title.to_string(),
    }
}
