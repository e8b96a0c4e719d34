//! Host browser APIs consumed by the surfaces, and the bookmark helpers built
//! on top of them.

use futures::future::{try_join_all, BoxFuture};

use crate::core::models::{BookmarkNode, CreateDetails, Tab};
use crate::Error;

/// The host bookmark tree.
pub trait BookmarkApi: Send + Sync {
    /// Full hierarchy, starting at the synthetic root.
    fn get_tree(&self) -> BoxFuture<'_, Result<Vec<BookmarkNode>, Error>>;

    /// Bookmarks whose URL matches `url`, in host order.
    fn search_url(&self, url: &str) -> BoxFuture<'_, Result<Vec<BookmarkNode>, Error>>;

    fn create(&self, details: CreateDetails) -> BoxFuture<'_, Result<BookmarkNode, Error>>;

    fn update_title(&self, id: &str, title: &str) -> BoxFuture<'_, Result<BookmarkNode, Error>>;

    fn move_to(&self, id: &str, parent_id: &str) -> BoxFuture<'_, Result<BookmarkNode, Error>>;

    fn remove(&self, id: &str) -> BoxFuture<'_, Result<(), Error>>;
}

/// The host tab and window APIs.
pub trait TabApi: Send + Sync {
    /// The active tab of the current window.
    fn active_tab(&self) -> BoxFuture<'_, Result<Tab, Error>>;

    fn open_tab(&self, url: &str) -> BoxFuture<'_, Result<(), Error>>;

    /// Close the popup window. May fail outside an extension context.
    fn close_popup(&self) -> Result<(), Error>;
}

/// The active tab together with every bookmark that points at it.
#[derive(Debug, Clone)]
pub struct TabBookmarks {
    pub tab: Tab,
    pub bookmarks: Vec<BookmarkNode>,
}

pub async fn current_tab<H: TabApi + ?Sized>(host: &H) -> Result<Tab, Error> {
    host.active_tab().await
}

pub async fn bookmarks_of_tab<H: BookmarkApi + ?Sized>(
    host: &H,
    tab: &Tab,
) -> Result<Vec<BookmarkNode>, Error> {
    match tab.url.as_deref() {
        Some(url) => host.search_url(url).await,
        None => Ok(Vec::new()),
    }
}

pub async fn current_tab_and_bookmarks<H>(host: &H) -> Result<TabBookmarks, Error>
where
    H: BookmarkApi + TabApi + ?Sized,
{
    let tab = current_tab(host).await?;
    let bookmarks = bookmarks_of_tab(host, &tab).await?;
    Ok(TabBookmarks { tab, bookmarks })
}

/// Remove every bookmark of the active tab. Removals run concurrently.
pub async fn remove_bookmarks_of_current_tab<H>(host: &H) -> Result<usize, Error>
where
    H: BookmarkApi + TabApi + ?Sized,
{
    let TabBookmarks { bookmarks, .. } = current_tab_and_bookmarks(host).await?;
    try_join_all(bookmarks.iter().map(|b| host.remove(&b.id))).await?;
    log::debug!("Removed {} bookmark(s) of current tab", bookmarks.len());
    Ok(bookmarks.len())
}

/// Create a folder and return its id.
pub async fn create_folder<H: BookmarkApi + ?Sized>(
    host: &H,
    title: &str,
    parent_id: &str,
) -> Result<String, Error> {
    let folder = host
        .create(CreateDetails {
            parent_id: parent_id.to_string(),
            title: title.to_string(),
            url: None,
            index: None,
        })
        .await?;
    Ok(folder.id)
}

/// Move every bookmark of the active tab into `folder_id`; returns the first.
pub async fn move_current_tab_bookmarks<H>(host: &H, folder_id: &str) -> Result<BookmarkNode, Error>
where
    H: BookmarkApi + TabApi + ?Sized,
{
    let TabBookmarks { bookmarks, .. } = current_tab_and_bookmarks(host).await?;
    let moved = try_join_all(bookmarks.iter().map(|b| host.move_to(&b.id, folder_id))).await?;
    moved
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFound("no bookmark for current tab".into()))
}

/// Rename every bookmark of the active tab; returns the first.
pub async fn rename_current_tab_bookmarks<H>(host: &H, title: &str) -> Result<BookmarkNode, Error>
where
    H: BookmarkApi + TabApi + ?Sized,
{
    let TabBookmarks { bookmarks, .. } = current_tab_and_bookmarks(host).await?;
    let renamed = try_join_all(bookmarks.iter().map(|b| host.update_title(&b.id, title))).await?;
    renamed
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFound("no bookmark for current tab".into()))
}

/// Bookmark the active tab in `parent_id`, at the top when `add_to_top`.
pub async fn create_bookmark_of_current_tab<H>(
    host: &H,
    parent_id: &str,
    add_to_top: bool,
) -> Result<BookmarkNode, Error>
where
    H: BookmarkApi + TabApi + ?Sized,
{
    let tab = current_tab(host).await?;
    let Some(url) = tab.url.clone() else {
        return Err(Error::InvalidInput("active tab has no URL".into()));
    };
    host.create(CreateDetails {
        parent_id: parent_id.to_string(),
        title: tab.title_or_empty().to_string(),
        url: Some(url),
        index: add_to_top.then_some(0),
    })
    .await
}
