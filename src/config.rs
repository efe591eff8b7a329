use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub watcher: WatcherConfig,
    pub scraper: ScraperConfig,
    pub notifications: NotificationsConfig,
    pub matcher: MatcherConfig,
    pub products: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum WatchMode {
    /// Static fetch for every product, rendered confirmation for candidates only.
    TwoStage,
    /// Rendered fetch for every product on a long-lived browser.
    SingleStage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub check_every_seconds: u64,
    pub mode: WatchMode,
    /// Single-stage only: relaunch the shared browser every N cycles.
    pub recycle_every: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub request_timeout: u64,
    pub navigation_timeout: u64,
    pub element_timeout: u64,
    pub chrome_path: Option<String>,
    pub light_mode: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub pushover: PushoverConfig,
    pub discord: DiscordConfig,
    pub test_push_on_start: bool,
    pub cart_url: Option<String>,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushoverConfig {
    pub token: Option<String>,
    pub user: Option<String>,
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub webhook_url: Option<String>,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    pub buy_phrases: Vec<String>,
    pub sold_out_phrases: Vec<String>,
    pub waitlist_phrases: Vec<String>,
    /// Labels of consent/close buttons dismissed before a rendered check.
    pub overlay_phrases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushoverCredentials {
    pub token: String,
    pub user: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            check_every_seconds: 60,
            mode: WatchMode::TwoStage,
            recycle_every: 200,
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: 20,
            navigation_timeout: 60,
            element_timeout: 20,
            chrome_path: None,
            light_mode: true,
            viewport_width: 1024,
            viewport_height: 700,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            pushover: PushoverConfig {
                token: None,
                user: None,
                api_url: PUSHOVER_API_URL.to_string(),
            },
            discord: DiscordConfig {
                webhook_url: None,
                username: "Stock Watcher".to_string(),
            },
            test_push_on_start: false,
            cart_url: None,
            title: "Stock Alert".to_string(),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            buy_phrases: owned(&["Add to Cart", "Add to Bag", "Add to Basket", "Buy Now", "Purchase"]),
            sold_out_phrases: owned(&["Sold Out", "Out of Stock", "Unavailable"]),
            waitlist_phrases: owned(&["Notify Me", "Email Me When Available", "Back in Stock"]),
            overlay_phrases: owned(&[
                "Accept All",
                "Accept",
                "Agree",
                "OK",
                "Got it",
                "Close",
                "Continue",
                "I Understand",
                "Allow all",
            ]),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            watcher: WatcherConfig::default(),
            scraper: ScraperConfig::default(),
            notifications: NotificationsConfig::default(),
            matcher: MatcherConfig::default(),
            products: Vec::new(),
        }
    }
}

impl ScraperConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout)
    }
}

impl NotificationsConfig {
    /// Both token and user must be present for Pushover dispatch.
    pub fn pushover_credentials(&self) -> Option<PushoverCredentials> {
        let token = self.pushover.token.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let user = self.pushover.user.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some(PushoverCredentials {
            token: token.to_string(),
            user: user.to_string(),
        })
    }
}

impl AppConfig {
    /// Load configuration from built-in defaults, `config/default`, `config/local`,
    /// an optional explicit file, `WATCHER__*` variables and finally the plain
    /// deployment variables (`PUSHOVER_TOKEN`, `CHECK_EVERY_SECONDS`, ...).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        load_env_file();

        let mut builder = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let s = builder
            .add_source(Environment::with_prefix("WATCHER").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;
        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the flat variable names used by existing deployments.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("CHECK_EVERY_SECONDS") {
            self.watcher.check_every_seconds = raw.trim().parse().map_err(|_| {
                ConfigError::Message(format!("CHECK_EVERY_SECONDS must be a whole number, got '{}'", raw))
            })?;
        }
        if let Some(token) = lookup("PUSHOVER_TOKEN") {
            self.notifications.pushover.token = non_empty(token);
        }
        if let Some(user) = lookup("PUSHOVER_USER") {
            self.notifications.pushover.user = non_empty(user);
        }
        if let Some(flag) = lookup("SEND_TEST_PUSH_ON_START") {
            self.notifications.test_push_on_start = parse_flag(&flag);
        }
        if let Some(cart) = lookup("CART_URL") {
            self.notifications.cart_url = non_empty(cart);
        }
        if let Some(list) = lookup("PRODUCT_URLS") {
            let urls: Vec<String> = list
                .split(|c| c == ',' || c == '\n')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !urls.is_empty() {
                self.products = urls;
            }
        }
        if self.scraper.chrome_path.is_none() {
            self.scraper.chrome_path = lookup("CHROME_PATH").and_then(non_empty);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watcher.check_every_seconds == 0 {
            return Err(ConfigError::Message("check_every_seconds must be greater than 0".into()));
        }

        if self.watcher.recycle_every == 0 {
            return Err(ConfigError::Message("recycle_every must be greater than 0".into()));
        }

        if self.products.is_empty() {
            return Err(ConfigError::Message("At least one product URL must be configured".into()));
        }

        let mut seen = HashSet::new();
        for product in &self.products {
            match Url::parse(product) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                _ => return Err(ConfigError::Message(format!("Invalid product URL: {}", product))),
            }
            if !seen.insert(product.as_str()) {
                return Err(ConfigError::Message(format!("Duplicate product URL: {}", product)));
            }
        }

        if self.scraper.request_timeout == 0
            || self.scraper.navigation_timeout == 0
            || self.scraper.element_timeout == 0
        {
            return Err(ConfigError::Message("Scraper timeouts must be greater than 0".into()));
        }

        if self.matcher.buy_phrases.is_empty()
            || self.matcher.sold_out_phrases.is_empty()
            || self.matcher.waitlist_phrases.is_empty()
        {
            return Err(ConfigError::Message("Matcher phrase groups must not be empty".into()));
        }

        if let Some(cart) = &self.notifications.cart_url {
            if Url::parse(cart).is_err() {
                return Err(ConfigError::Message("Invalid cart URL format".into()));
            }
        }

        if Url::parse(&self.notifications.pushover.api_url).is_err() {
            return Err(ConfigError::Message("Invalid Pushover API URL format".into()));
        }

        Ok(())
    }
}

/// Read the nearest `.env` into the process environment. Call before anything
/// that reads the environment, `RUST_LOG` included. Variables already set win.
pub fn load_env_file() -> Option<PathBuf> {
    // A missing .env is the normal case in production
    dotenvy::dotenv().ok()
}

/// Read an explicit env file. Unlike [`load_env_file`] a missing file is an error.
pub fn load_env_from(path: &Path) -> Result<(), ConfigError> {
    dotenvy::from_path(path)
        .map_err(|e| ConfigError::Message(format!("Failed to read env file {}: {}", path.display(), e)))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
