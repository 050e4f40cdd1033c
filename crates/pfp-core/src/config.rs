use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Retry backoff parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Base delay in seconds for exponential backoff (e.g. 0.5 = 500ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: 1.0,
            max_delay_secs: 30,
        }
    }
}

/// Per-step time limits for one fetch attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Navigation to the profile page (until the document is ready).
    pub navigation_secs: u64,
    /// Whole image download, connect included.
    pub download_secs: u64,
    /// Pause after navigation so late scripts can populate the page.
    pub settle_millis: u64,
    /// CDP request timeout handed to the browser binding.
    pub protocol_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation_secs: 25,
            download_secs: 20,
            settle_millis: 1500,
            protocol_secs: 60,
        }
    }
}

impl TimeoutConfig {
    pub fn navigation(&self) -> Duration {
        Duration::from_secs(self.navigation_secs)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_millis)
    }

    pub fn protocol(&self) -> Duration {
        Duration::from_secs(self.protocol_secs)
    }
}

/// Login credentials stored in the config file. Optional; the CLI prompts when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub username: String,
    pub password: String,
}

/// Everything that is specific to the target website: URLs, selectors, field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Profile page URL; `{id}` is replaced by the identifier.
    pub profile_url_template: String,
    pub login_url: String,
    /// Page that only renders for a signed-in user; used to validate a cached session.
    pub check_url: String,
    /// Selector present only when signed in.
    pub auth_indicator: String,
    pub username_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    /// Substrings of the post-login URL that mean a challenge/verification step.
    pub challenge_markers: Vec<String>,
    /// Embedded JSON fields holding the image URL, highest resolution first.
    pub embedded_fields: Vec<String>,
    /// Meta tag property carrying a fallback image URL.
    pub meta_property: String,
    /// DOM selectors for the image element, in priority order.
    pub image_selectors: Vec<String>,
    /// Regex matching placeholder / sprite images that must be rejected.
    pub placeholder_pattern: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            profile_url_template: "https://www.instagram.com/{id}/".to_string(),
            login_url: "https://www.instagram.com/accounts/login/".to_string(),
            check_url: "https://www.instagram.com/accounts/edit/".to_string(),
            auth_indicator: "input[name=\"fullName\"], a[href=\"/direct/inbox/\"]".to_string(),
            username_selector: "input[name=\"username\"]".to_string(),
            password_selector: "input[name=\"password\"]".to_string(),
            submit_selector: "button[type=\"submit\"]".to_string(),
            challenge_markers: vec![
                "/challenge".to_string(),
                "/two_factor".to_string(),
                "/checkpoint".to_string(),
            ],
            embedded_fields: vec![
                "profile_pic_url_hd".to_string(),
                "profile_pic_url".to_string(),
            ],
            meta_property: "og:image".to_string(),
            image_selectors: vec![
                "header img[alt*=\"profile picture\"]".to_string(),
                "header img".to_string(),
                "img[data-testid=\"user-avatar\"]".to_string(),
            ],
            placeholder_pattern: r"(?i)(44884218_345707102882519_2446069589734326272_n|/static/images/|sprite|anonymous)".to_string(),
        }
    }
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.0.0",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Global configuration loaded from `~/.config/pfp/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PfpConfig {
    /// Directory that receives one image per identifier.
    pub output_dir: PathBuf,
    /// File extension of saved images (without the dot).
    pub image_extension: String,
    /// Number of concurrent worker loops.
    pub concurrency: usize,
    /// Attempts per identifier (including the first).
    pub max_retries: u32,
    /// Relaunch the browser after this many page contexts.
    pub recycle_after: usize,
    /// Skip session validation and login entirely.
    #[serde(default)]
    pub unauthenticated: bool,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default)]
    pub no_sandbox: bool,
    /// Progress file; defaults to `~/.local/state/pfp/progress.json`.
    #[serde(default)]
    pub progress_path: Option<PathBuf>,
    /// Session cache; defaults to `~/.local/state/pfp/session.json`.
    #[serde(default)]
    pub session_cache_path: Option<PathBuf>,
    /// User agents rotated round-robin across page contexts.
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,
    /// Optional retry backoff; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub credentials: Option<CredentialsConfig>,
    #[serde(default)]
    pub site: SiteConfig,
}

fn default_true() -> bool {
    true
}

impl Default for PfpConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("pfp"),
            image_extension: "jpg".to_string(),
            concurrency: 6,
            max_retries: 2,
            recycle_after: 50,
            unauthenticated: false,
            headless: true,
            no_sandbox: false,
            progress_path: None,
            session_cache_path: None,
            user_agents: default_user_agents(),
            retry: None,
            timeouts: TimeoutConfig::default(),
            credentials: None,
            site: SiteConfig::default(),
        }
    }
}

impl PfpConfig {
    /// Progress file path: configured value or the XDG state default.
    pub fn progress_path(&self) -> Result<PathBuf> {
        match &self.progress_path {
            Some(p) => Ok(p.clone()),
            None => Ok(state_dir()?.join("progress.json")),
        }
    }

    /// Session cache path: configured value or the XDG state default.
    pub fn session_cache_path(&self) -> Result<PathBuf> {
        match &self.session_cache_path {
            Some(p) => Ok(p.clone()),
            None => Ok(state_dir()?.join("session.json")),
        }
    }
}

/// `~/.local/state/pfp`, shared by the log, progress and session files.
pub fn state_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("pfp")?;
    Ok(xdg_dirs.get_state_home().join("pfp"))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("pfp")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<PfpConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = PfpConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: PfpConfig = toml::from_str(&data)?;
    Ok(cfg)
}
