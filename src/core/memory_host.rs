//! In-process bookmark host with the same tree shape and id conventions as the
//! browser: a synthetic root holding the bookmarks bar and "Other bookmarks".

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::core::host::{BookmarkApi, TabApi};
use crate::core::models::{
    BookmarkNode, CreateDetails, Tab, BOOKMARKS_BAR_ID, OTHER_BOOKMARKS_ID, ROOT_ID,
};
use crate::Error;

#[derive(Debug, Clone)]
struct NodeRecord {
    title: String,
    url: Option<String>,
    parent_id: Option<String>,
    children: Vec<String>,
}

#[derive(Debug, Default)]
struct HostState {
    nodes: HashMap<String, NodeRecord>,
    next_id: u64,
    active_tab: Tab,
    opened_tabs: Vec<String>,
    close_requests: usize,
    close_fails: bool,
}

pub struct MemoryHost {
    state: Mutex<HostState>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

/// URLs compare the way the browser stores them (`https://a.com` == `https://a.com/`).
fn normalize_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(u) => u.to_string(),
        Err(_) => raw.to_string(),
    }
}

impl MemoryHost {
    /// Empty profile: root, bookmarks bar and other bookmarks.
    pub fn new() -> Self {
        let mut state = HostState {
            next_id: 3,
            ..HostState::default()
        };
        state.nodes.insert(
            ROOT_ID.into(),
            NodeRecord {
                title: String::new(),
                url: None,
                parent_id: None,
                children: vec![BOOKMARKS_BAR_ID.into(), OTHER_BOOKMARKS_ID.into()],
            },
        );
        for (id, title) in [(BOOKMARKS_BAR_ID, "Bookmarks bar"), (OTHER_BOOKMARKS_ID, "Other bookmarks")] {
            state.nodes.insert(
                id.into(),
                NodeRecord {
                    title: title.into(),
                    url: None,
                    parent_id: Some(ROOT_ID.into()),
                    children: Vec::new(),
                },
            );
        }
        MemoryHost {
            state: Mutex::new(state),
        }
    }

    /// Load a tree as returned by `get_tree` (e.g. from a JSON export).
    pub fn from_tree(tree: Vec<BookmarkNode>) -> Result<Self, Error> {
        let root = tree
            .into_iter()
            .find(|n| n.id == ROOT_ID)
            .ok_or_else(|| Error::InvalidInput(format!("tree has no root node '{ROOT_ID}'")))?;

        let mut state = HostState::default();
        let mut max_id = 0u64;
        let mut stack = vec![(root, None::<String>)];
        while let Some((node, parent_id)) = stack.pop() {
            if state.nodes.contains_key(&node.id) {
                return Err(Error::InvalidInput(format!("duplicate node id '{}'", node.id)));
            }
            if let Ok(n) = node.id.parse::<u64>() {
                max_id = max_id.max(n);
            }
            let children = node.children.unwrap_or_default();
            let child_ids = children.iter().map(|c| c.id.clone()).collect();
            for child in children.into_iter().rev() {
                stack.push((child, Some(node.id.clone())));
            }
            state.nodes.insert(
                node.id,
                NodeRecord {
                    title: node.title,
                    url: node.url,
                    parent_id,
                    children: child_ids,
                },
            );
        }
        state.next_id = max_id + 1;
        Ok(MemoryHost {
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, HostState>, Error> {
        self.state
            .lock()
            .map_err(|_| Error::Host("bookmark host state poisoned".into()))
    }

    pub fn set_active_tab(&self, tab: Tab) -> Result<(), Error> {
        self.lock()?.active_tab = tab;
        Ok(())
    }

    /// Make `close_popup` fail, as it does in a plain web page.
    pub fn set_close_fails(&self, fails: bool) -> Result<(), Error> {
        self.lock()?.close_fails = fails;
        Ok(())
    }

    pub fn opened_tabs(&self) -> Result<Vec<String>, Error> {
        Ok(self.lock()?.opened_tabs.clone())
    }

    pub fn close_requests(&self) -> Result<usize, Error> {
        Ok(self.lock()?.close_requests)
    }

    /// Synchronous variant of `create` for seeding.
    pub fn insert(&self, details: CreateDetails) -> Result<BookmarkNode, Error> {
        let mut state = self.lock()?;
        Self::do_create(&mut state, details)
    }

    pub fn add_folder(&self, parent_id: &str, title: &str) -> Result<String, Error> {
        self.insert(CreateDetails {
            parent_id: parent_id.into(),
            title: title.into(),
            url: None,
            index: None,
        })
        .map(|n| n.id)
    }

    pub fn add_bookmark(&self, parent_id: &str, title: &str, url: &str) -> Result<String, Error> {
        self.insert(CreateDetails {
            parent_id: parent_id.into(),
            title: title.into(),
            url: Some(url.into()),
            index: None,
        })
        .map(|n| n.id)
    }

    /// Snapshot of a single node.
    pub fn node(&self, id: &str) -> Result<BookmarkNode, Error> {
        let state = self.lock()?;
        Self::snapshot(&state, id, false)
    }

    /// Ids of the children of `folder_id`, in order.
    pub fn child_ids(&self, folder_id: &str) -> Result<Vec<String>, Error> {
        let state = self.lock()?;
        state
            .nodes
            .get(folder_id)
            .map(|n| n.children.clone())
            .ok_or_else(|| Error::NotFound(folder_id.to_string()))
    }

    fn snapshot(state: &HostState, id: &str, deep: bool) -> Result<BookmarkNode, Error> {
        let rec = state
            .nodes
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let index = rec.parent_id.as_ref().and_then(|p| {
            state
                .nodes
                .get(p)
                .and_then(|parent| parent.children.iter().position(|c| c == id))
        });
        let children = if deep && rec.url.is_none() {
            let mut out = Vec::with_capacity(rec.children.len());
            for child in &rec.children {
                out.push(Self::snapshot(state, child, true)?);
            }
            Some(out)
        } else {
            None
        };
        Ok(BookmarkNode {
            id: id.to_string(),
            title: rec.title.clone(),
            url: rec.url.clone(),
            parent_id: rec.parent_id.clone(),
            index,
            children,
        })
    }

    fn writable_folder<'a>(state: &'a mut HostState, id: &str) -> Result<&'a mut NodeRecord, Error> {
        if id == ROOT_ID {
            return Err(Error::Host("can't modify the root bookmark folders".into()));
        }
        let rec = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if rec.url.is_some() {
            return Err(Error::InvalidInput(format!("'{id}' is not a folder")));
        }
        Ok(rec)
    }

    fn do_create(state: &mut HostState, details: CreateDetails) -> Result<BookmarkNode, Error> {
        let id = state.next_id.to_string();
        let parent = Self::writable_folder(state, &details.parent_id)?;
        match details.index {
            Some(i) => parent.children.insert(i.min(parent.children.len()), id.clone()),
            None => parent.children.push(id.clone()),
        }
        state.next_id += 1;
        state.nodes.insert(
            id.clone(),
            NodeRecord {
                title: details.title,
                url: details.url,
                parent_id: Some(details.parent_id),
                children: Vec::new(),
            },
        );
        Self::snapshot(state, &id, false)
    }

    fn guard_fixed(id: &str) -> Result<(), Error> {
        if id == ROOT_ID || id == BOOKMARKS_BAR_ID || id == OTHER_BOOKMARKS_ID {
            return Err(Error::Host("can't modify the root bookmark folders".into()));
        }
        Ok(())
    }

    fn do_update_title(state: &mut HostState, id: &str, title: &str) -> Result<BookmarkNode, Error> {
        Self::guard_fixed(id)?;
        let rec = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        rec.title = title.to_string();
        Self::snapshot(state, id, false)
    }

    fn do_move(state: &mut HostState, id: &str, parent_id: &str) -> Result<BookmarkNode, Error> {
        Self::guard_fixed(id)?;
        // A folder must not end up inside its own subtree.
        let mut cursor = Some(parent_id.to_string());
        while let Some(curr) = cursor {
            if curr == id {
                return Err(Error::InvalidInput(format!("can't move '{id}' into itself")));
            }
            cursor = state.nodes.get(&curr).and_then(|n| n.parent_id.clone());
        }
        Self::writable_folder(state, parent_id)?;
        let old_parent = state
            .nodes
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?
            .parent_id
            .clone();
        if let Some(old) = old_parent.and_then(|p| state.nodes.get_mut(&p)) {
            old.children.retain(|c| c != id);
        }
        Self::writable_folder(state, parent_id)?.children.push(id.to_string());
        if let Some(rec) = state.nodes.get_mut(id) {
            rec.parent_id = Some(parent_id.to_string());
        }
        Self::snapshot(state, id, false)
    }

    fn do_remove(state: &mut HostState, id: &str) -> Result<(), Error> {
        Self::guard_fixed(id)?;
        let rec = state
            .nodes
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if !rec.children.is_empty() {
            return Err(Error::InvalidInput(format!("folder '{id}' is not empty")));
        }
        let parent_id = rec.parent_id.clone();
        state.nodes.remove(id);
        if let Some(parent) = parent_id.and_then(|p| state.nodes.get_mut(&p)) {
            parent.children.retain(|c| c != id);
        }
        Ok(())
    }

    fn do_search(state: &HostState, url: &str) -> Vec<BookmarkNode> {
        let wanted = normalize_url(url);
        // Walk in tree order so results come back in a stable, host-like order.
        let mut out = Vec::new();
        let mut stack = vec![ROOT_ID.to_string()];
        while let Some(id) = stack.pop() {
            let Some(rec) = state.nodes.get(&id) else {
                continue;
            };
            if rec.url.as_deref().map(normalize_url).as_deref() == Some(wanted.as_str()) {
                if let Ok(node) = Self::snapshot(state, &id, false) {
                    out.push(node);
                }
            }
            stack.extend(rec.children.iter().rev().cloned());
        }
        out
    }
}

impl BookmarkApi for MemoryHost {
    fn get_tree(&self) -> BoxFuture<'_, Result<Vec<BookmarkNode>, Error>> {
        async move {
            let state = self.lock()?;
            Ok(vec![Self::snapshot(&state, ROOT_ID, true)?])
        }
        .boxed()
    }

    fn search_url(&self, url: &str) -> BoxFuture<'_, Result<Vec<BookmarkNode>, Error>> {
        let url = url.to_string();
        async move {
            let state = self.lock()?;
            Ok(Self::do_search(&state, &url))
        }
        .boxed()
    }

    fn create(&self, details: CreateDetails) -> BoxFuture<'_, Result<BookmarkNode, Error>> {
        async move {
            let mut state = self.lock()?;
            Self::do_create(&mut state, details)
        }
        .boxed()
    }

    fn update_title(&self, id: &str, title: &str) -> BoxFuture<'_, Result<BookmarkNode, Error>> {
        let (id, title) = (id.to_string(), title.to_string());
        async move {
            let mut state = self.lock()?;
            Self::do_update_title(&mut state, &id, &title)
        }
        .boxed()
    }

    fn move_to(&self, id: &str, parent_id: &str) -> BoxFuture<'_, Result<BookmarkNode, Error>> {
        let (id, parent_id) = (id.to_string(), parent_id.to_string());
        async move {
            let mut state = self.lock()?;
            Self::do_move(&mut state, &id, &parent_id)
        }
        .boxed()
    }

    fn remove(&self, id: &str) -> BoxFuture<'_, Result<(), Error>> {
        let id = id.to_string();
        async move {
            let mut state = self.lock()?;
            Self::do_remove(&mut state, &id)
        }
        .boxed()
    }
}

impl TabApi for MemoryHost {
    fn active_tab(&self) -> BoxFuture<'_, Result<Tab, Error>> {
        async move { Ok(self.lock()?.active_tab.clone()) }.boxed()
    }

    fn open_tab(&self, url: &str) -> BoxFuture<'_, Result<(), Error>> {
        let url = url.to_string();
        async move {
            self.lock()?.opened_tabs.push(url);
            Ok(())
        }
        .boxed()
    }

    fn close_popup(&self) -> Result<(), Error> {
        let mut state = self.lock()?;
        state.close_requests += 1;
        if state.close_fails {
            return Err(Error::Unavailable("no popup window to close".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::folders::flatten_folders;
    use crate::core::host;

    fn tab(title: &str, url: &str) -> Tab {
        Tab {
            title: Some(title.into()),
            url: Some(url.into()),
        }
    }

    #[tokio::test]
    async fn new_profile_has_system_folders() {
        let host = MemoryHost::new();
        let tree = host.get_tree().await.unwrap();
        let ids: Vec<String> = flatten_folders(&tree).into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn search_normalizes_trailing_slash() {
        let host = MemoryHost::new();
        host.add_bookmark("1", "Example", "https://example.com").unwrap();
        let hits = host.search_url("https://example.com/").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].parent_id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn create_at_index_zero_goes_to_top() {
        let host = MemoryHost::new();
        host.add_bookmark("2", "First", "https://a.example/").unwrap();
        let top = host
            .create(CreateDetails {
                parent_id: "2".into(),
                title: "Top".into(),
                url: Some("https://b.example/".into()),
                index: Some(0),
            })
            .await
            .unwrap();
        assert_eq!(top.index, Some(0));
        assert_eq!(host.child_ids("2").unwrap()[0], top.id);
    }

    #[tokio::test]
    async fn move_rejects_cycles_and_system_folders() {
        let host = MemoryHost::new();
        let outer = host.add_folder("1", "Outer").unwrap();
        let inner = host.add_folder(&outer, "Inner").unwrap();
        assert!(host.move_to(&outer, &inner).await.is_err());
        assert!(host.move_to("1", "2").await.is_err());
        let moved = host.move_to(&inner, "2").await.unwrap();
        assert_eq!(moved.parent_id.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn remove_current_tab_bookmarks_fans_out() {
        let host = MemoryHost::new();
        host.add_bookmark("1", "One", "https://dup.example/").unwrap();
        host.add_bookmark("2", "Two", "https://dup.example/").unwrap();
        host.set_active_tab(tab("Dup", "https://dup.example/")).unwrap();

        let removed = host::remove_bookmarks_of_current_tab(&host).await.unwrap();
        assert_eq!(removed, 2);
        assert!(host.search_url("https://dup.example/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rename_without_bookmark_is_not_found() {
        let host = MemoryHost::new();
        host.set_active_tab(tab("Nothing", "https://none.example/")).unwrap();
        let err = host::rename_current_tab_bookmarks(&host, "x").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn from_tree_round_trips_get_tree() {
        let host = MemoryHost::new();
        let f = host.add_folder("1", "Work").unwrap();
        host.add_bookmark(&f, "Ticket", "https://t.example/1").unwrap();
        let tree = host.get_tree().await.unwrap();

        let loaded = MemoryHost::from_tree(tree.clone()).unwrap();
        assert_eq!(loaded.get_tree().await.unwrap(), tree);
        let next = loaded.add_folder("2", "New").unwrap();
        assert_eq!(next, "5");
    }

    #[test]
    fn from_tree_requires_root() {
        let err = MemoryHost::from_tree(vec![BookmarkNode {
            id: "1".into(),
            ..BookmarkNode::default()
        }]);
        assert!(err.is_err());
    }
}
