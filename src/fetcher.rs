use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use scraper::{Html, Node};
use url::Url;

use crate::Result;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Capability to fetch the monitored page's raw markup.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self) -> Result<String>;
}

/// reqwest-backed fetcher for a single target URL.
pub struct HttpFetcher {
    client: reqwest::Client,
    url: Url,
}

impl HttpFetcher {
    pub fn new(url: Url) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(FETCH_TIMEOUT)
            .build()?;

        Ok(Self { client, url })
    }

    /// Startup reachability check: a HEAD request with a short timeout.
    /// Any transport error or non-2xx status fails the probe.
    pub async fn probe(&self) -> Result<()> {
        self.client
            .head(self.url.clone())
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self) -> Result<String> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?;

        Ok(response.text().await?)
    }
}

/// Extract the visible text of an HTML document, dropping script and style
/// content. Text nodes are emitted on their own lines so line-based
/// matching sees the same boundaries the page source had.
pub fn extract_visible_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut text = String::new();
    let mut stack = vec![document.tree.root()];
    while let Some(node) = stack.pop() {
        match node.value() {
            Node::Text(chunk) => {
                text.push_str(&chunk.text);
                text.push('\n');
            }
            Node::Element(element) if matches!(element.name(), "script" | "style") => {}
            _ => {
                let children: Vec<_> = node.children().collect();
                for child in children.into_iter().rev() {
                    stack.push(child);
                }
            }
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn fetcher_for(server: &MockServer) -> HttpFetcher {
        let url = Url::parse(&server.uri()).unwrap();
        HttpFetcher::new(url).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_page_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>hello</body></html>"))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server).await;
        let body = fetcher.fetch().await.unwrap();
        assert!(body.contains("hello"));
    }

    #[tokio::test]
    async fn test_fetch_non_2xx_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server).await;
        assert!(fetcher.fetch().await.is_err());
    }

    #[tokio::test]
    async fn test_probe_succeeds_on_reachable_url() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server).await;
        assert!(fetcher.probe().await.is_ok());
    }

    #[tokio::test]
    async fn test_probe_fails_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server).await;
        assert!(fetcher.probe().await.is_err());
    }

    #[test]
    fn test_extract_drops_script_and_style() {
        let html = r#"
            <html>
            <head><style>body { color: red; }</style></head>
            <body>
                <h1>Title</h1>
                <script>var hidden = 1;</script>
                <p>Visible paragraph</p>
            </body>
            </html>
        "#;

        let text = extract_visible_text(html);
        assert!(text.contains("Title"));
        assert!(text.contains("Visible paragraph"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn test_extract_keeps_elements_on_separate_lines() {
        let html = "<ul><li>first entry</li><li>second entry</li></ul>";

        let text = extract_visible_text(html);
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        assert_eq!(lines, vec!["first entry", "second entry"]);
    }

    #[test]
    fn test_extract_preserves_document_order() {
        let html = "<div><p>one</p><p>two</p><p>three</p></div>";

        let text = extract_visible_text(html);
        let one = text.find("one").unwrap();
        let two = text.find("two").unwrap();
        let three = text.find("three").unwrap();
        assert!(one < two && two < three);
    }

    #[test]
    fn test_extract_of_plain_text_keeps_lines() {
        let text = extract_visible_text("Ignore this line\nNew Pickup: Alpha Widget\nUnrelated");
        assert!(text.contains("New Pickup: Alpha Widget"));
    }
}
