use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::classifier::{StockClassifier, Verdict};
use crate::config::{AppConfig, NotificationsConfig, WatchMode};
use crate::fetcher::browser::idle_timeout_for;
use crate::fetcher::{BrowserFetcher, PageContent, PageFetcher, SessionMode, StaticFetcher};
use crate::matcher::TextMatcher;
use crate::plugins::{DispatchOutcome, NotificationDispatcher, NotificationEvent};
use crate::tracker::TransitionTracker;

/// Summary of one polling cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    /// Products polled in the first pass.
    pub checked: usize,
    /// Fetches or confirmations that failed; those products keep their state.
    pub failures: usize,
    pub candidates: usize,
    /// Products judged in stock by a rendered check.
    pub confirmed: usize,
    /// Rising edges, i.e. alerts raised.
    pub notifications: usize,
}

/// Polls the product list forever and raises an alert on each rising edge.
///
/// Products are handled one at a time, so at most one rendering session is
/// alive. The tracker is owned here and only touched after a verdict is final.
pub struct StockWatcher {
    products: Vec<String>,
    cheap: Box<dyn PageFetcher>,
    renderer: Box<dyn PageFetcher>,
    classifier: StockClassifier,
    tracker: TransitionTracker,
    dispatcher: NotificationDispatcher,
    notifications: NotificationsConfig,
    mode: WatchMode,
    interval: Duration,
    recycle_every: u64,
    cycle: u64,
}

impl StockWatcher {
    pub fn new(
        config: &AppConfig,
        cheap: Box<dyn PageFetcher>,
        renderer: Box<dyn PageFetcher>,
        dispatcher: NotificationDispatcher,
    ) -> Result<Self> {
        let classifier = StockClassifier::new(TextMatcher::new(&config.matcher)?);
        let tracker = TransitionTracker::new(config.products.iter().cloned());

        Ok(Self {
            products: config.products.clone(),
            cheap,
            renderer,
            classifier,
            tracker,
            dispatcher,
            notifications: config.notifications.clone(),
            mode: config.watcher.mode,
            interval: Duration::from_secs(config.watcher.check_every_seconds),
            recycle_every: config.watcher.recycle_every.max(1),
            cycle: 0,
        })
    }

    /// Wire up the real HTTP client, Chromium and notifiers.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let session = match config.watcher.mode {
            WatchMode::TwoStage => SessionMode::Scoped,
            WatchMode::SingleStage => SessionMode::Shared,
        };
        let cheap = StaticFetcher::new(&config.scraper)?;
        let interval = Duration::from_secs(config.watcher.check_every_seconds);
        let renderer = BrowserFetcher::new(config.scraper.clone(), &config.matcher, session)?
            .with_idle_timeout(idle_timeout_for(interval));
        let dispatcher = NotificationDispatcher::from_config(&config.notifications)?;

        Self::new(config, Box::new(cheap), Box::new(renderer), dispatcher)
    }

    pub fn mode(&self) -> WatchMode {
        self.mode
    }

    pub fn tracker(&self) -> &TransitionTracker {
        &self.tracker
    }

    /// Drop all remembered stock state, as a restart would.
    pub fn reset_state(&mut self) {
        self.tracker.reset();
    }

    /// One-off "watcher started" push, linked to the first product.
    pub async fn send_startup_test(&self) -> DispatchOutcome {
        if !self.dispatcher.is_enabled() {
            warn!("No notifier configured; startup test push skipped");
            return DispatchOutcome::default();
        }
        let event = NotificationEvent::startup_test(self.products.first().map(String::as_str));
        let outcome = self.dispatcher.dispatch(&event).await;
        info!(
            "Startup test push delivered to {}/{} notifier(s)",
            outcome.delivered, outcome.attempted
        );
        outcome
    }

    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.cycle += 1;
        let mut report = CycleReport {
            cycle: self.cycle,
            ..CycleReport::default()
        };
        info!("Cycle {} starting ({} products)", self.cycle, self.products.len());

        match self.mode {
            WatchMode::TwoStage => self.two_stage(&mut report).await?,
            WatchMode::SingleStage => self.single_stage(&mut report).await?,
        }

        info!(
            "Cycle {} done: checked={} failures={} candidates={} confirmed={} notifications={} in_stock={}",
            report.cycle,
            report.checked,
            report.failures,
            report.candidates,
            report.confirmed,
            report.notifications,
            self.tracker.in_stock_count()
        );
        Ok(report)
    }

    async fn two_stage(&mut self, report: &mut CycleReport) -> Result<()> {
        let products = self.products.clone();
        let mut candidates = Vec::new();

        for url in &products {
            report.checked += 1;
            match self.cheap.fetch(url).await {
                Ok(content) => {
                    let verdict = self.classifier.classify(&content);
                    debug!("Screened {}: {}", url, verdict);
                    if verdict.is_candidate() {
                        candidates.push(url.clone());
                    } else {
                        self.apply_verdict(url, verdict, None, report).await?;
                    }
                }
                Err(e) => {
                    report.failures += 1;
                    warn!("Fetch failed for {} ({:?}): {}", url, e.kind(), e);
                }
            }
        }

        report.candidates = candidates.len();
        if !candidates.is_empty() {
            info!("{} candidate(s) to confirm", candidates.len());
        }

        for url in &candidates {
            match self.renderer.fetch(url).await {
                Ok(content) => {
                    let verdict = self.classifier.classify(&content);
                    info!("Confirmed {}: {}", url, verdict);
                    self.apply_verdict(url, verdict, Some(&content), report).await?;
                }
                Err(e) => {
                    report.failures += 1;
                    warn!("Could not confirm {} ({:?}): {}", url, e.kind(), e);
                }
            }
        }

        Ok(())
    }

    async fn single_stage(&mut self, report: &mut CycleReport) -> Result<()> {
        if self.cycle > 1 && (self.cycle - 1) % self.recycle_every == 0 {
            info!("Recycling browser after {} cycles", self.recycle_every);
            if let Err(e) = self.renderer.recycle().await {
                warn!("Browser recycle failed: {}", e);
            }
        }

        let products = self.products.clone();
        for url in &products {
            report.checked += 1;
            match self.renderer.fetch(url).await {
                Ok(content) => {
                    let verdict = self.classifier.classify(&content);
                    debug!("Checked {}: {}", url, verdict);
                    self.apply_verdict(url, verdict, Some(&content), report).await?;
                }
                Err(e) => {
                    report.failures += 1;
                    warn!("Render failed for {} ({:?}): {}", url, e.kind(), e);
                }
            }
        }

        Ok(())
    }

    /// Record a final verdict and dispatch an alert on a rising edge.
    async fn apply_verdict(
        &mut self,
        url: &str,
        verdict: Verdict,
        content: Option<&PageContent>,
        report: &mut CycleReport,
    ) -> Result<()> {
        if verdict.in_stock() {
            report.confirmed += 1;
        }

        let transition = self.tracker.record(url, verdict.in_stock())?;
        if !transition.should_notify() {
            debug!("{} -> {:?}", url, transition);
            return Ok(());
        }

        report.notifications += 1;
        let title = content.and_then(PageContent::title);
        info!("IN STOCK: {}", title.as_deref().unwrap_or(url));

        let event = NotificationEvent::stock_alert(&self.notifications, url, title.as_deref());
        if self.dispatcher.is_enabled() {
            let outcome = self.dispatcher.dispatch(&event).await;
            if !outcome.any_delivered() {
                warn!("Alert for {} was not delivered", url);
            }
        } else {
            warn!("No notifier configured; alert for {} not sent", url);
        }

        Ok(())
    }

    /// Cycle until `shutdown` resolves. The shutdown signal wins against both
    /// an in-flight cycle and the inter-cycle sleep.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            "Watching {} product(s) every {}s ({:?})",
            self.products.len(),
            self.interval.as_secs(),
            self.mode
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                result = self.run_cycle() => {
                    if let Err(e) = result {
                        error!("Cycle aborted: {}", e);
                    }
                }
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Shutdown requested; stopping after cycle {}", self.cycle);
        Ok(())
    }
}
