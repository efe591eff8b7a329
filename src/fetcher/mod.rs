//! Page retrieval strategies.
//!
//! Both strategies sit behind [`PageFetcher`]: the static fetcher returns raw
//! HTML and cannot see script-driven state, the browser fetcher renders the
//! page and also reports the state of the buy control.

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::utils::error::FetchError;

pub mod browser;
pub mod http;

pub use browser::{BrowserFetcher, SessionMode};
pub use http::StaticFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchStrategy {
    Static,
    Rendered,
}

/// What a rendered session observed about the "add to cart"-class control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlState {
    /// The strategy cannot inspect live controls.
    Unknown,
    Absent,
    Present { visible: bool, enabled: bool },
}

impl ControlState {
    pub fn is_actionable(&self) -> bool {
        matches!(self, ControlState::Present { visible: true, enabled: true })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageContent {
    Cheap { html: String },
    Rendered { html: String, buy_control: ControlState },
}

impl PageContent {
    pub fn html(&self) -> &str {
        match self {
            PageContent::Cheap { html } | PageContent::Rendered { html, .. } => html,
        }
    }

    pub fn buy_control(&self) -> ControlState {
        match self {
            PageContent::Cheap { .. } => ControlState::Unknown,
            PageContent::Rendered { buy_control, .. } => *buy_control,
        }
    }

    pub fn strategy(&self) -> FetchStrategy {
        match self {
            PageContent::Cheap { .. } => FetchStrategy::Static,
            PageContent::Rendered { .. } => FetchStrategy::Rendered,
        }
    }

    /// Document `<title>`, whitespace-collapsed. Used to name the product in alerts.
    pub fn title(&self) -> Option<String> {
        let document = Html::parse_document(self.html());
        let selector = Selector::parse("title").ok()?;
        let raw: String = document.select(&selector).next()?.text().collect();
        let title = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if title.is_empty() { None } else { Some(title) }
    }
}

/// Retrieve the observable content and state of a product page.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn strategy(&self) -> FetchStrategy;

    async fn fetch(&self, url: &str) -> Result<PageContent, FetchError>;

    /// Drop any long-lived engine state. Strategies without such state do nothing.
    async fn recycle(&self) -> Result<(), FetchError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cheap_content_has_unknown_control() {
        let content = PageContent::Cheap {
            html: "<button>Add to Cart</button>".to_string(),
        };
        assert_eq!(content.buy_control(), ControlState::Unknown);
        assert_eq!(content.strategy(), FetchStrategy::Static);
        assert!(!content.buy_control().is_actionable());
    }

    #[test]
    fn test_control_actionable_requires_visible_and_enabled() {
        assert!(ControlState::Present { visible: true, enabled: true }.is_actionable());
        assert!(!ControlState::Present { visible: true, enabled: false }.is_actionable());
        assert!(!ControlState::Present { visible: false, enabled: true }.is_actionable());
        assert!(!ControlState::Absent.is_actionable());
    }

    #[test]
    fn test_title_extraction() {
        let content = PageContent::Rendered {
            html: "<html><head><title>\n  LABUBU Time to Chill \n Vinyl Plush </title></head></html>".to_string(),
            buy_control: ControlState::Absent,
        };
        assert_eq!(content.title().as_deref(), Some("LABUBU Time to Chill Vinyl Plush"));
    }

    #[test]
    fn test_title_missing() {
        let content = PageContent::Cheap {
            html: "<html><body>no title</body></html>".to_string(),
        };
        assert_eq!(content.title(), None);
    }
}
