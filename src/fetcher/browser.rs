use anyhow::{Context, anyhow};
use async_trait::async_trait;
use headless_chrome::browser::tab::RequestPausedDecision;
use headless_chrome::browser::transport::{SessionId, Transport};
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Fetch::{FailRequest, RequestPattern, RequestStage};
use headless_chrome::protocol::cdp::Network::{ErrorReason, ResourceType};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ControlState, FetchStrategy, PageContent, PageFetcher};
use crate::Result;
use crate::config::{MatcherConfig, ScraperConfig};
use crate::matcher::PhraseGroup;
use crate::utils::error::FetchError;

const CHROME_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--no-zygote",
    "--disable-extensions",
];

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const MIN_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Idle timeout for a browser that must survive the sleep between cycles.
pub fn idle_timeout_for(interval: Duration) -> Duration {
    interval.saturating_mul(2).max(MIN_IDLE_TIMEOUT)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Launch a browser for one page and tear it down afterwards.
    Scoped,
    /// Keep one browser alive across pages until [`PageFetcher::recycle`].
    Shared,
}

#[derive(Debug, Clone)]
struct RenderOptions {
    user_agent: String,
    navigation_timeout: Duration,
    element_timeout: Duration,
    light_mode: bool,
    buy_pattern: String,
    /// One pattern per overlay phrase; each may dismiss one element.
    overlay_patterns: Vec<String>,
}

/// Lazily launched engine handle shared across fetches.
struct SharedSlot<T> {
    inner: Mutex<Option<Arc<T>>>,
}

impl<T> SharedSlot<T> {
    fn new() -> Self {
        Self { inner: Mutex::new(None) }
    }

    fn get_or_launch<E>(&self, launch: impl FnOnce() -> std::result::Result<T, E>) -> std::result::Result<Arc<T>, E> {
        let mut slot = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(existing) = slot.as_ref() {
            return Ok(Arc::clone(existing));
        }
        let launched = Arc::new(launch()?);
        *slot = Some(Arc::clone(&launched));
        Ok(launched)
    }

    /// Forget `stale` if it is still the cached handle. A handle launched
    /// since then is left alone.
    fn evict(&self, stale: &Arc<T>) -> Option<Arc<T>> {
        let mut slot = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match slot.as_ref() {
            Some(current) if Arc::ptr_eq(current, stale) => slot.take(),
            _ => None,
        }
    }

    fn take(&self) -> Option<Arc<T>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    fn is_empty(&self) -> bool {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).is_none()
    }
}

/// Headless Chromium fetch. Executes scripts and inspects the buy control.
pub struct BrowserFetcher {
    config: ScraperConfig,
    options: RenderOptions,
    mode: SessionMode,
    idle_timeout: Duration,
    shared: Arc<SharedSlot<Browser>>,
}

#[derive(Debug, Deserialize)]
struct ControlReport {
    found: bool,
    visible: bool,
    enabled: bool,
}

impl BrowserFetcher {
    pub fn new(config: ScraperConfig, matcher: &MatcherConfig, mode: SessionMode) -> Result<Self> {
        let buy_pattern = PhraseGroup::new(&matcher.buy_phrases)?.as_regex().as_str().to_string();
        let overlay_patterns = overlay_patterns(&matcher.overlay_phrases)?;

        let options = RenderOptions {
            user_agent: config.user_agent.clone(),
            navigation_timeout: config.navigation_timeout(),
            element_timeout: config.element_timeout(),
            light_mode: config.light_mode,
            buy_pattern,
            overlay_patterns,
        };

        Ok(Self {
            config,
            options,
            mode,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            shared: Arc::new(SharedSlot::new()),
        })
    }

    /// How long Chromium may sit without events before it exits on its own.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    fn launch(config: &ScraperConfig, idle_timeout: Duration) -> anyhow::Result<Browser> {
        let args: Vec<&OsStr> = CHROME_ARGS.iter().map(OsStr::new).collect();
        let mut launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .window_size(Some((config.viewport_width, config.viewport_height)))
            .idle_browser_timeout(idle_timeout)
            .args(args)
            .build()
            .map_err(|e| anyhow!("Failed to create launch options: {}", e))?;

        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(PathBuf::from(chrome_path));
        }

        Browser::new(launch_options).map_err(|e| anyhow!("Failed to launch browser: {}", e))
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    fn strategy(&self) -> FetchStrategy {
        FetchStrategy::Rendered
    }

    async fn fetch(&self, url: &str) -> std::result::Result<PageContent, FetchError> {
        let config = self.config.clone();
        let options = self.options.clone();
        let url = url.to_string();
        let mode = self.mode;
        let idle_timeout = self.idle_timeout;
        let shared = Arc::clone(&self.shared);

        // Launching blocks, so it happens inside the worker in both modes
        let joined = tokio::task::spawn_blocking(move || {
            let launch = || Self::launch(&config, idle_timeout).map_err(|e| FetchError::Launch(e.to_string()));
            let browser = match mode {
                SessionMode::Shared => {
                    let was_empty = shared.is_empty();
                    let browser = shared.get_or_launch(launch)?;
                    if was_empty {
                        info!("Launched shared browser");
                    }
                    browser
                }
                SessionMode::Scoped => Arc::new(launch()?),
            };

            let result = render(&browser, &url, &options).map_err(|e| FetchError::Render(format!("{:#}", e)));

            // A crashed or idled-out browser fails every later tab; relaunch next time
            if result.is_err() && mode == SessionMode::Shared && shared.evict(&browser).is_some() {
                warn!("Dropping shared browser after a failed render of {}", url);
            }

            // In scoped mode this is the last handle, which kills the Chromium process
            drop(browser);
            result
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(e) => Err(FetchError::Render(format!("render task failed: {}", e))),
        }
    }

    async fn recycle(&self) -> std::result::Result<(), FetchError> {
        if let Some(browser) = self.shared.take() {
            // Dropping the last handle kills the process; do it off the runtime
            tokio::task::spawn_blocking(move || drop(browser))
                .await
                .map_err(|e| FetchError::Render(format!("browser teardown failed: {}", e)))?;
            info!("Recycled browser to keep memory low");
        }
        Ok(())
    }
}

/// Closes the tab on every exit path.
struct TabGuard(Arc<Tab>);

impl Drop for TabGuard {
    fn drop(&mut self) {
        let _ = self.0.close(true);
    }
}

fn render(browser: &Browser, url: &str, options: &RenderOptions) -> anyhow::Result<PageContent> {
    let guard = TabGuard(browser.new_tab().context("Failed to create tab")?);
    let tab = &guard.0;

    tab.set_user_agent(&options.user_agent, None, None)
        .context("Failed to set user agent")?;

    if options.light_mode {
        enable_light_mode(tab)?;
    }

    tab.set_default_timeout(options.navigation_timeout);
    tab.navigate_to(url).context("Navigation failed")?;
    tab.wait_until_navigated().context("Page load failed")?;
    tab.set_default_timeout(options.element_timeout);

    // Sold-out pages may render no button at all, so a miss here is not an error
    if let Err(e) = tab.wait_for_element_with_custom_timeout("button", options.element_timeout) {
        debug!("No button appeared on {}: {}", url, e);
    }

    if !options.overlay_patterns.is_empty() {
        dismiss_overlays(tab, &options.overlay_patterns);
    }

    let buy_control = inspect_buy_control(tab, &options.buy_pattern)?;
    let html = tab.get_content().context("Failed to get page content")?;

    Ok(PageContent::Rendered { html, buy_control })
}

/// Light mode drops images, media, fonts and stylesheets.
fn blocks(resource: &ResourceType) -> bool {
    matches!(
        resource,
        ResourceType::Image | ResourceType::Media | ResourceType::Font | ResourceType::Stylesheet
    )
}

fn enable_light_mode(tab: &Arc<Tab>) -> anyhow::Result<()> {
    let patterns = vec![RequestPattern {
        url_pattern: Some("*".to_string()),
        resource_Type: None,
        request_stage: Some(RequestStage::Request),
    }];
    tab.enable_fetch(Some(patterns.as_slice()), None)
        .context("Failed to enable request interception")?;

    let interceptor = Arc::new(
        |_transport: Arc<Transport>, _session_id: SessionId, intercepted: RequestPausedEvent| {
            if blocks(&intercepted.params.resource_Type) {
                RequestPausedDecision::Fail(FailRequest {
                    request_id: intercepted.params.request_id,
                    error_reason: ErrorReason::BlockedByClient,
                })
            } else {
                RequestPausedDecision::Continue(None)
            }
        },
    );
    tab.enable_request_interception(interceptor)
        .context("Failed to install request interceptor")?;
    Ok(())
}

const CONTROL_SELECTOR: &str =
    "button, [role=button], input[type=submit], input[type=button]";

/// Visible text, then form value, then the accessible label for icon-only buttons.
const LABEL_JS: &str =
    r#"(el) => (el.innerText || el.value || el.getAttribute("aria-label") || "").trim()"#;

/// Whole-word, case-insensitive pattern per phrase, matched anywhere in a label.
fn overlay_patterns(phrases: &[String]) -> Result<Vec<String>> {
    phrases
        .iter()
        .filter(|p| !p.trim().is_empty())
        .map(|phrase| {
            let group = PhraseGroup::new(std::slice::from_ref(phrase))?;
            Ok(format!(r"\b{}\b", group.as_regex().as_str()))
        })
        .collect()
}

fn control_script(pattern: &str) -> anyhow::Result<String> {
    let pattern = serde_json::to_string(pattern)?;
    let selector = serde_json::to_string(CONTROL_SELECTOR)?;
    Ok(format!(
        r#"(function() {{
            const re = new RegExp({pattern}, "i");
            const label = {LABEL_JS};
            const visible = (el) => {{
                const style = window.getComputedStyle(el);
                return el.getClientRects().length > 0
                    && style.visibility !== "hidden"
                    && style.display !== "none";
            }};
            const enabled = (el) => !el.disabled && el.getAttribute("aria-disabled") !== "true";
            const matches = Array.from(document.querySelectorAll({selector})).filter((el) => re.test(label(el)));
            if (matches.length === 0) {{
                return JSON.stringify({{ found: false, visible: false, enabled: false }});
            }}
            const ready = matches.find((el) => visible(el) && enabled(el));
            const el = ready || matches[0];
            return JSON.stringify({{ found: true, visible: visible(el), enabled: enabled(el) }});
        }})()"#
    ))
}

fn inspect_buy_control(tab: &Arc<Tab>, pattern: &str) -> anyhow::Result<ControlState> {
    let script = control_script(pattern)?;
    let result = tab.evaluate(&script, false).context("Buy control query failed")?;
    let raw = result
        .value
        .as_ref()
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Buy control query returned no value"))?;
    parse_control_report(raw)
}

fn parse_control_report(raw: &str) -> anyhow::Result<ControlState> {
    let report: ControlReport = serde_json::from_str(raw).context("Failed to parse buy control state")?;
    Ok(if report.found {
        ControlState::Present {
            visible: report.visible,
            enabled: report.enabled,
        }
    } else {
        ControlState::Absent
    })
}

/// Click the first visible match of every phrase, so a cookie banner and a
/// modal on the same page both go. Returns the click count.
fn overlay_script(patterns: &[String]) -> anyhow::Result<String> {
    let patterns = serde_json::to_string(patterns)?;
    let selector = serde_json::to_string(CONTROL_SELECTOR)?;
    Ok(format!(
        r#"(function() {{
            const label = {LABEL_JS};
            let clicked = 0;
            for (const source of {patterns}) {{
                const re = new RegExp(source, "i");
                for (const el of document.querySelectorAll({selector})) {{
                    if (el.isConnected && el.getClientRects().length > 0 && re.test(label(el))) {{
                        el.click();
                        clicked += 1;
                        break;
                    }}
                }}
            }}
            return clicked;
        }})()"#
    ))
}

/// Best effort; failures are only logged.
fn dismiss_overlays(tab: &Arc<Tab>, patterns: &[String]) {
    let script = match overlay_script(patterns) {
        Ok(script) => script,
        Err(e) => {
            debug!("Overlay script unavailable: {}", e);
            return;
        }
    };

    match tab.evaluate(&script, false) {
        Ok(result) => {
            let clicked = result.value.as_ref().and_then(|v| v.as_u64()).unwrap_or(0);
            if clicked > 0 {
                debug!("Dismissed {} overlay control(s)", clicked);
            }
        }
        Err(e) => debug!("Overlay dismissal failed: {}", e),
    }
}
