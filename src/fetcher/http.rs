use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{FetchStrategy, PageContent, PageFetcher};
use crate::Result;
use crate::config::ScraperConfig;
use crate::utils::error::FetchError;

/// Plain GET without script execution.
pub struct StaticFetcher {
    client: Client,
    timeout: Duration,
}

impl StaticFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let timeout = config.request_timeout();
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(timeout)
            .build()?;
        Ok(Self { client, timeout })
    }

    fn map_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::from(err)
        }
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    fn strategy(&self) -> FetchStrategy {
        FetchStrategy::Static
    }

    async fn fetch(&self, url: &str) -> std::result::Result<PageContent, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16() });
        }

        let html = response.text().await.map_err(|e| self.map_error(e))?;
        debug!("Fetched {} bytes from {}", html.len(), url);
        Ok(PageContent::Cheap { html })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::FetchErrorKind;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> ScraperConfig {
        ScraperConfig {
            request_timeout: 2,
            user_agent: "TestAgent/1.0".to_string(),
            ..ScraperConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_returns_cheap_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products/1"))
            .and(header("user-agent", "TestAgent/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<button>Add to Cart</button>"))
            .mount(&server)
            .await;

        let fetcher = StaticFetcher::new(&test_config()).unwrap();
        let content = fetcher.fetch(&format!("{}/products/1", server.uri())).await.unwrap();

        assert_eq!(
            content,
            PageContent::Cheap {
                html: "<button>Add to Cart</button>".to_string()
            }
        );
        assert_eq!(fetcher.strategy(), FetchStrategy::Static);
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = StaticFetcher::new(&test_config()).unwrap();
        let err = fetcher.fetch(&server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503 }));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let config = ScraperConfig {
            request_timeout: 1,
            ..test_config()
        };
        let fetcher = StaticFetcher::new(&config).unwrap();
        let err = fetcher.fetch(&server.uri()).await.unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let fetcher = StaticFetcher::new(&test_config()).unwrap();
        let err = fetcher.fetch("http://127.0.0.1:1/").await.unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Transport);
    }
}
