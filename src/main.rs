use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use deeboo::app::popup::{BookmarkStatus, FolderOption, PopupMessage, PopupModel};
use deeboo::core::memory_host::MemoryHost;
use deeboo::core::models::{BookmarkNode, Tab};
use deeboo::core::settings::SettingsStore;
use deeboo::core::store::SqliteStorage;
use deeboo::{Config, Error};

const USAGE: &str = "usage: deeboo <url> [page title...]";

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(url) = args.next() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };
    let title = args.collect::<Vec<_>>().join(" ");
    let tab = Tab {
        title: (!title.is_empty()).then_some(title),
        url: Some(url),
    };

    match run(tab).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("deeboo: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_tree(path: &Path) -> Result<MemoryHost, Error> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| Error::InvalidInput(format!("read {}: {e}", path.display())))?;
    let tree: Vec<BookmarkNode> = serde_json::from_str(&data)?;
    MemoryHost::from_tree(tree)
}

fn print_group(options: &[FolderOption], selected: &str) {
    for option in options {
        let marker = if option.id == selected { '>' } else { ' ' };
        println!("{marker} [{:>4}] {}", option.id, option.label);
    }
}

async fn run(tab: Tab) -> Result<(), Error> {
    let config = Config::resolve();
    let storage = Arc::new(SqliteStorage::open(&config.db_file())?);

    let host = match &config.tree_file {
        Some(path) => {
            log::info!("Loading bookmark tree from {}", path.display());
            load_tree(path)?
        }
        None => MemoryHost::new(),
    };
    host.set_active_tab(tab)?;
    let host = Arc::new(host);

    let store = SettingsStore::open(storage);
    let mut popup = PopupModel::new(host, store.clone());
    popup.open().await?;

    let (head, tail) = popup.folder_options();
    print_group(&head, &popup.selected_folder_id);
    println!("  ------");
    print_group(&tail, &popup.selected_folder_id);
    println!();

    let status = match popup.status {
        BookmarkStatus::AddedNow => "bookmark added",
        BookmarkStatus::Existing => "edit bookmark",
    };
    if let Some(bookmark) = &popup.bookmark {
        println!("{status}: {} \"{}\"", bookmark.id, bookmark.title);
    }
    println!("folder: {}", popup.selected_folder_caption());
    println!("title mode: {}", popup.mode.as_str());

    popup.update(PopupMessage::Done).await?;
    store.flush().await
}
