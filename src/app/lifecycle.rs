use std::str::FromStr;

use url::Url;

use crate::app::options::OptionsTab;
use crate::core::host::TabApi;
use crate::Error;

/// Why the extension's install handler fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallReason {
    Install,
    Update,
    BrowserUpdate,
    SharedModuleUpdate,
}

impl FromStr for InstallReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "install" => Ok(InstallReason::Install),
            "update" => Ok(InstallReason::Update),
            "chrome_update" | "browser_update" => Ok(InstallReason::BrowserUpdate),
            "shared_module_update" => Ok(InstallReason::SharedModuleUpdate),
            other => Err(Error::InvalidInput(format!("unknown install reason '{other}'"))),
        }
    }
}

/// Options tab to greet the user with, if any.
pub fn landing_tab(reason: InstallReason) -> Option<OptionsTab> {
    match reason {
        InstallReason::Install => Some(OptionsTab::Welcome),
        InstallReason::Update => Some(OptionsTab::Changelog),
        InstallReason::BrowserUpdate | InstallReason::SharedModuleUpdate => None,
    }
}

/// Open the options page after install or update. Returns the opened URL.
/// A failure to open is logged and swallowed; the handler never fails the install.
pub async fn on_installed<H: TabApi + ?Sized>(
    host: &H,
    base: &Url,
    reason: InstallReason,
) -> Option<Url> {
    let tab = landing_tab(reason)?;
    let url = match tab.page_url(base) {
        Ok(url) => url,
        Err(e) => {
            log::warn!("Can't build options URL: {}", e);
            return None;
        }
    };
    match host.open_tab(url.as_str()).await {
        Ok(()) => {
            log::info!("Opened {} after {:?}", url, reason);
            Some(url)
        }
        Err(e) => {
            log::warn!("Failed to open options page: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory_host::MemoryHost;

    fn base() -> Url {
        Url::parse("chrome-extension://deeboo/").unwrap()
    }

    #[test]
    fn reasons_parse() {
        assert_eq!("install".parse::<InstallReason>().unwrap(), InstallReason::Install);
        assert_eq!(
            "chrome_update".parse::<InstallReason>().unwrap(),
            InstallReason::BrowserUpdate
        );
        assert!("reinstall".parse::<InstallReason>().is_err());
    }

    #[tokio::test]
    async fn install_opens_welcome_update_opens_changelog() {
        let host = MemoryHost::new();
        on_installed(&host, &base(), InstallReason::Install).await;
        on_installed(&host, &base(), InstallReason::Update).await;
        on_installed(&host, &base(), InstallReason::BrowserUpdate).await;
        assert_eq!(
            host.opened_tabs().unwrap(),
            [
                "chrome-extension://deeboo/options.html?tab=welcome",
                "chrome-extension://deeboo/options.html?tab=changelog",
            ]
        );
    }
}
