//! Browser Launcher
//!
//! Handles browser discovery, launching with automation-hiding flags, and
//! the connection lifecycle.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cdp::transport::launch_chrome;
use crate::cdp::{Connection, Transport};
use crate::error::{Error, Result};
use crate::netlog::NetworkLog;
use crate::page::Page;
use crate::HarvestConfig;

/// Global counter for unique user data directories
static BROWSER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// How long to wait for the DevTools endpoint line after spawning
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Installation locations tried after the primary binary fails to launch
const ALT_INSTALL_LOCATIONS: &[&str] = &[
    "/snap/bin/chromium",
    "/var/lib/flatpak/app/org.chromium.Chromium/current/active/export/bin/org.chromium.Chromium",
];

/// Installed before any page content loads to hide the automation flag
const EVASION_SCRIPT: &str = r#"
Object.defineProperty(Object.getPrototypeOf(navigator), 'webdriver', {
    get: () => false,
    configurable: true,
    enumerable: true
});
try {
    Object.defineProperty(Navigator.prototype, 'webdriver', {
        get: () => false,
        configurable: true,
        enumerable: true
    });
} catch (e) {}
"#;

/// Chrome versions used for generated user agents
const CHROME_VERSIONS: &[&str] = &[
    "133.0.0.0",
    "134.0.0.0",
    "135.0.0.0",
    "136.0.0.0",
    "137.0.0.0",
    "138.0.0.0",
];

/// macOS versions used for generated user agents
const MACOS_VERSIONS: &[&str] = &["12_6_0", "13_4_0", "14_2_0", "14_4_0", "15_0_0"];

/// Generate a random realistic user agent
pub fn random_user_agent() -> String {
    use rand::seq::SliceRandom;
    use rand::Rng;

    let mut rng = rand::thread_rng();
    let chrome = CHROME_VERSIONS.choose(&mut rng).unwrap();

    if rng.gen_bool(0.6) {
        format!(
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36",
            chrome
        )
    } else {
        let macos = MACOS_VERSIONS.choose(&mut rng).unwrap();
        format!(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X {}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36",
            macos, chrome
        )
    }
}

/// Locate a Chrome/Chromium binary on this machine
pub fn find_chrome() -> Result<PathBuf> {
    let candidates = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    } else if cfg!(target_os = "windows") {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        vec![]
    };

    for candidate in candidates {
        let path = Path::new(candidate);
        if path.exists() {
            return Ok(path.to_path_buf());
        }
    }

    Err(Error::BrowserNotFound)
}

/// Launch arguments that keep the session looking like a normal browser
fn stealth_args(config: &HarvestConfig) -> Vec<String> {
    let mut args = vec![
        // Core automation hiding
        "--disable-blink-features=AutomationControlled".into(),
        "--disable-automation".into(),
        "--disable-infobars".into(),
        // Container/server friendliness
        "--no-sandbox".into(),
        "--disable-dev-shm-usage".into(),
        "--disable-gpu".into(),
        // Make the profile look natural
        "--no-first-run".into(),
        "--no-default-browser-check".into(),
        "--disable-default-apps".into(),
        "--disable-hang-monitor".into(),
        "--disable-prompt-on-repost".into(),
        "--disable-sync".into(),
        "--metrics-recording-only".into(),
        "--password-store=basic".into(),
        "--use-mock-keychain".into(),
        // Window size
        format!(
            "--window-size={},{}",
            config.viewport_width, config.viewport_height
        ),
    ];

    // User agent
    let user_agent = config.user_agent.clone().unwrap_or_else(random_user_agent);
    args.push(format!("--user-agent={}", user_agent));

    // Headless mode
    if config.headless {
        args.push("--headless=new".into());
    }

    args
}

/// A live browser owned by the harvester
pub struct Browser {
    connection: Connection,
    /// User data directory (cleaned up on close)
    user_data_dir: PathBuf,
}

impl Browser {
    /// Launch a new browser with default config
    pub async fn launch() -> Result<Self> {
        Self::launch_with_config(&HarvestConfig::default()).await
    }

    /// Launch with custom config
    ///
    /// Tries the configured (or discovered) binary first, then the
    /// alternative installation locations, before giving up.
    pub async fn launch_with_config(config: &HarvestConfig) -> Result<Self> {
        // Create unique user data directory
        let instance_id = BROWSER_COUNTER.fetch_add(1, Ordering::Relaxed);
        let user_data_dir = std::env::temp_dir().join(format!(
            "fanlens-browser-{}-{}",
            std::process::id(),
            instance_id
        ));

        // Clean up any stale data
        let _ = std::fs::remove_dir_all(&user_data_dir);
        std::fs::create_dir_all(&user_data_dir)?;

        let mut args = stealth_args(config);
        args.push(format!("--user-data-dir={}", user_data_dir.display()));

        let mut candidates: Vec<PathBuf> = Vec::new();
        match &config.chrome_path {
            Some(p) => candidates.push(PathBuf::from(p)),
            None => {
                if let Ok(found) = find_chrome() {
                    candidates.push(found);
                }
            }
        }
        for alt in ALT_INSTALL_LOCATIONS {
            let path = PathBuf::from(alt);
            if path.exists() && !candidates.contains(&path) {
                candidates.push(path);
            }
        }

        let mut launched = None;
        for path in &candidates {
            tracing::info!("Launching browser from {:?}", path);
            match launch_chrome(path, &args, LAUNCH_TIMEOUT) {
                Ok(pair) => {
                    launched = Some(pair);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Launch failed for {:?}: {}", path, e);
                }
            }
        }

        let (child, ws_url) = match launched {
            Some(pair) => pair,
            None => {
                let _ = std::fs::remove_dir_all(&user_data_dir);
                return Err(Error::BrowserNotFound);
            }
        };

        // Create transport and connection
        let transport = Transport::new(child, &ws_url)?;
        let connection = Connection::new(transport);

        // Get browser version
        let version = connection.version().await?;
        tracing::info!("Connected to browser: {}", version.product);

        Ok(Self {
            connection,
            user_data_dir,
        })
    }

    /// Create a new page at about:blank with capture enabled
    ///
    /// The evasion script is installed before any navigation, and the
    /// network and runtime domains are enabled so every subsequent load
    /// feeds the performance log.
    pub async fn new_page(&self) -> Result<Page> {
        let target_id = self
            .connection
            .create_target("about:blank", None, None)
            .await?;

        let session = self.connection.attach_to_target(&target_id).await?;

        session.page_enable().await?;
        session
            .add_script_to_evaluate_on_new_document(EVASION_SCRIPT)
            .await?;
        session.network_enable().await?;
        session.runtime_enable().await?;

        Ok(Page::new(session))
    }

    /// Drained view over this browser's captured network events
    pub fn network_log(&self) -> NetworkLog {
        NetworkLog::new(Arc::clone(self.connection.transport()))
    }

    /// Get the browser version
    pub async fn version(&self) -> Result<String> {
        let v = self.connection.version().await?;
        Ok(v.product)
    }

    /// Close the browser
    pub async fn close(self) -> Result<()> {
        self.connection.close().await?;

        // Clean up user data directory
        let _ = std::fs::remove_dir_all(&self.user_data_dir);

        Ok(())
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        // Best-effort cleanup of the user data directory if close() wasn't
        // called. The Transport's Drop impl handles killing the process.
        let _ = std::fs::remove_dir_all(&self.user_data_dir);
    }
}
