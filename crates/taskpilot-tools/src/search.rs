//! Search and fetch back-ends.
//!
//! `SearchProvider` is the seam the search subagent and the search
//! tools share: Tavily as the primary, DuckDuckGo as the fallback,
//! Wikipedia for augmentation. All providers are stateless reqwest
//! clients, safe to share across sessions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{decode_args, Tool, ToolError};

const FETCH_MAX_BYTES: usize = 200 * 1024;

/// A text-returning search back-end.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<String, ToolError>;

    /// Search with an explicit result cap; defaults to `search`.
    async fn search_with_limit(
        &self,
        query: &str,
        _max_results: usize,
    ) -> Result<String, ToolError> {
        self.search(query).await
    }
}

fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Tavily search API client (primary back-end).
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    default_limit: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
    #[serde(default)]
    images: Vec<TavilyImage>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TavilyImage {
    Url(String),
    Described {
        url: String,
        #[serde(default)]
        description: String,
    },
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>, default_limit: usize) -> Self {
        Self {
            client: http_client(30),
            api_key: api_key.into(),
            default_limit: default_limit.max(1),
        }
    }

    async fn run(&self, query: &str, max_results: usize) -> Result<String, ToolError> {
        if self.api_key.trim().is_empty() {
            return Err(ToolError::Execution(
                "Tavily API key is not set".to_string(),
            ));
        }

        let body = json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": max_results,
            "include_answer": true,
            "include_images": true,
            "include_image_descriptions": true,
        });
        let response = self
            .client
            .post("https://api.tavily.com/search")
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolError::Http(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ToolError::Http(format!("Tavily HTTP {}: {}", status, text)));
        }
        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Http(e.to_string()))?;

        let mut out = String::new();
        if let Some(answer) = parsed.answer.filter(|a| !a.is_empty()) {
            out.push_str(&format!("Answer: {}\n\n", answer));
        }
        for result in &parsed.results {
            out.push_str(&format!(
                "Title: {}\nURL: {}\nContent: {}\n\n",
                result.title, result.url, result.content
            ));
        }
        for image in &parsed.images {
            match image {
                TavilyImage::Url(url) => out.push_str(&format!("Image: {}\n", url)),
                TavilyImage::Described { url, description } => {
                    out.push_str(&format!("Image: {} - {}\n", url, description))
                }
            }
        }
        if out.is_empty() {
            out = format!("No results found for '{}'", query);
        }
        Ok(out)
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str) -> Result<String, ToolError> {
        self.run(query, self.default_limit).await
    }

    async fn search_with_limit(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<String, ToolError> {
        self.run(query, max_results.max(1)).await
    }
}

/// DuckDuckGo instant-answer client (fallback back-end).
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct DdgResponse {
    #[serde(default, rename = "Heading")]
    heading: String,
    #[serde(default, rename = "AbstractText")]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default, rename = "RelatedTopics")]
    related_topics: Vec<DdgTopic>,
}

#[derive(Debug, Clone, Deserialize)]
struct DdgTopic {
    #[serde(default, rename = "Text")]
    text: String,
    #[serde(default, rename = "FirstURL")]
    first_url: String,
    #[serde(default, rename = "Topics")]
    topics: Vec<DdgTopic>,
}

impl DuckDuckGoSearch {
    pub fn new() -> Self {
        Self {
            client: http_client(30),
        }
    }

    fn collect_topics(topics: &[DdgTopic], out: &mut String, budget: &mut usize) {
        for topic in topics {
            if *budget == 0 {
                return;
            }
            if !topic.text.is_empty() {
                out.push_str(&format!("- {} ({})\n", topic.text, topic.first_url));
                *budget -= 1;
            }
            Self::collect_topics(&topic.topics, out, budget);
        }
    }
}

impl Default for DuckDuckGoSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str) -> Result<String, ToolError> {
        let response = self
            .client
            .get("https://api.duckduckgo.com/")
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .map_err(|e| ToolError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ToolError::Http(format!(
                "DuckDuckGo HTTP {}",
                response.status()
            )));
        }
        let parsed: DdgResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Http(e.to_string()))?;

        let mut out = String::new();
        if !parsed.abstract_text.is_empty() {
            out.push_str(&format!(
                "{}\n{}\nSource: {}\n\n",
                parsed.heading, parsed.abstract_text, parsed.abstract_url
            ));
        }
        let mut budget = 10usize;
        Self::collect_topics(&parsed.related_topics, &mut out, &mut budget);
        if out.is_empty() {
            out = format!("No results found for '{}'", query);
        }
        Ok(out)
    }
}

/// Wikipedia search client (augmentation back-end).
///
/// Returns an empty string when nothing matches, which callers treat
/// as "skip augmentation".
pub struct WikipediaSearch {
    client: reqwest::Client,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct WikiResponse {
    #[serde(default)]
    query: WikiQuery,
}

#[derive(Debug, Default, Deserialize)]
struct WikiQuery {
    #[serde(default)]
    search: Vec<WikiHit>,
}

#[derive(Debug, Deserialize)]
struct WikiHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

impl WikipediaSearch {
    pub fn new(limit: usize) -> Self {
        Self {
            client: http_client(30),
            limit: limit.max(1),
        }
    }
}

impl Default for WikipediaSearch {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl SearchProvider for WikipediaSearch {
    fn name(&self) -> &str {
        "wikipedia"
    }

    async fn search(&self, query: &str) -> Result<String, ToolError> {
        let limit = self.limit.to_string();
        let response = self
            .client
            .get("https://en.wikipedia.org/w/api.php")
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ToolError::Http(format!(
                "Wikipedia HTTP {}",
                response.status()
            )));
        }
        let parsed: WikiResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Http(e.to_string()))?;

        let mut out = String::new();
        for hit in &parsed.query.search {
            out.push_str(&format!(
                "Title: {}\nSnippet: {}\n\n",
                hit.title,
                strip_tags(&hit.snippet)
            ));
        }
        Ok(out.trim_end().to_string())
    }
}

#[derive(Deserialize)]
struct QueryParams {
    query: String,
}

#[derive(Deserialize)]
struct FetchParams {
    url: String,
}

fn query_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {"type": "string", "description": "Search query."}
        },
        "required": ["query"]
    })
}

/// `duckduckgo_search` tool over the fallback provider.
pub struct DuckDuckGoSearchTool {
    provider: Arc<dyn SearchProvider>,
}

impl DuckDuckGoSearchTool {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Tool for DuckDuckGoSearchTool {
    fn name(&self) -> &str {
        "duckduckgo_search"
    }

    fn description(&self) -> &str {
        "Search the web with DuckDuckGo and return formatted results."
    }

    fn parameters(&self) -> Value {
        query_schema()
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        let params: QueryParams = decode_args(self.name(), arguments)?;
        self.provider.search(&params.query).await
    }
}

/// `wikipedia_search` tool over the augmentation provider.
pub struct WikipediaSearchTool {
    provider: Arc<dyn SearchProvider>,
}

impl WikipediaSearchTool {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Tool for WikipediaSearchTool {
    fn name(&self) -> &str {
        "wikipedia_search"
    }

    fn description(&self) -> &str {
        "Search Wikipedia and return matching article titles and snippets."
    }

    fn parameters(&self) -> Value {
        query_schema()
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        let params: QueryParams = decode_args(self.name(), arguments)?;
        self.provider.search(&params.query).await
    }
}

/// `web_fetch` tool: GET a URL and return the body text.
pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        Self {
            client: http_client(30),
        }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL and return the response body as text."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "URL to fetch."}
            },
            "required": ["url"]
        })
    }

    async fn invoke(&self, arguments: &str) -> Result<String, ToolError> {
        let params: FetchParams = decode_args(self.name(), arguments)?;
        let response = self
            .client
            .get(&params.url)
            .send()
            .await
            .map_err(|e| ToolError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ToolError::Http(format!(
                "GET {} returned {}",
                params.url,
                response.status()
            )));
        }
        let mut text = response
            .text()
            .await
            .map_err(|e| ToolError::Http(e.to_string()))?;
        if text.len() > FETCH_MAX_BYTES {
            let mut cut = FETCH_MAX_BYTES;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("... [truncated]");
        }
        Ok(text)
    }
}
