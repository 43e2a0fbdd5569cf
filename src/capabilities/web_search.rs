//! 网页搜索能力（ENABLE_WEB_SEARCH 开启）
//!
//! 请求 DuckDuckGo 的 HTML 端点，用正则抽取结果标题、摘要与链接，html2text 清理片段中的标签与实体。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;

use crate::capabilities::registry::{CapabilityContext, CapabilityRegistry, ProviderResult};
use crate::capabilities::EnablementPolicy;
use crate::core::CapabilityError;
use crate::tools::{str_arg, Tool};

pub const CAPABILITY_ID: &str = "web_search";
pub const ENABLE_WEB_SEARCH: &str = "ENABLE_WEB_SEARCH";
const TOOL_NAME: &str = "web_search";

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const NO_RESULTS: &str = "No results found. Try a different or more specific search query.";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// 单条搜索结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub body: String,
    pub url: String,
}

pub struct WebSearchTool {
    client: Client,
    default_max_results: usize,
    title_re: Regex,
    snippet_re: Regex,
    tag_re: Regex,
}

impl WebSearchTool {
    pub fn new(timeout_secs: u64, default_max_results: usize) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| format!("http client: {}", e))?;
        Ok(Self {
            client,
            default_max_results,
            title_re: Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]*)"[^>]*>(.*?)</a>"#)
                .map_err(|e| e.to_string())?,
            snippet_re: Regex::new(r#"(?s)class="result__snippet"[^>]*>(.*?)</(?:a|div|td)>"#)
                .map_err(|e| e.to_string())?,
            tag_re: Regex::new(r"<[^>]*>").map_err(|e| e.to_string())?,
        })
    }

    /// 解析结果页；标题与摘要按出现顺序配对
    pub fn parse_results(&self, html: &str, max_results: usize) -> Vec<SearchHit> {
        let snippets: Vec<String> = self
            .snippet_re
            .captures_iter(html)
            .map(|c| self.clean_fragment(&c[1]))
            .collect();
        self.title_re
            .captures_iter(html)
            .enumerate()
            .map(|(i, c)| SearchHit {
                title: self.clean_fragment(&c[2]),
                body: snippets.get(i).cloned().unwrap_or_default(),
                url: resolve_link(&c[1]),
            })
            .filter(|hit| !hit.title.is_empty())
            .take(max_results)
            .collect()
    }

    /// 去标签、解码实体、压平空白
    fn clean_fragment(&self, fragment: &str) -> String {
        let stripped = self.tag_re.replace_all(fragment, "");
        let text = from_read(stripped.as_bytes(), 10_000).unwrap_or_else(|_| stripped.to_string());
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, String> {
        let resp = self
            .client
            .get(SEARCH_ENDPOINT)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body = resp.text().await.map_err(|e| format!("read body: {}", e))?;
        Ok(self.parse_results(&body, max_results))
    }
}

/// 把结果列表格式化为给模型看的文本
pub fn format_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return NO_RESULTS.to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(i, h)| format!("{}. {}\n   {}\n   {}", i + 1, h.title, h.body, h.url))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// DuckDuckGo 的跳转链接 `//duckduckgo.com/l/?uddg=<encoded>` 还原为目标地址
fn resolve_link(href: &str) -> String {
    let href = href.replace("&amp;", "&");
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.clone()
    };
    reqwest::Url::parse(&absolute)
        .ok()
        .and_then(|u| u.query_pairs().find(|(k, _)| k == "uddg").map(|(_, v)| v.into_owned()))
        .unwrap_or(absolute)
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the web for current information. Use for: lists, news, facts, companies, how-to guides, \
         or anything not in your memory. Formulate a clear, specific search query \
         (e.g. 'list of pharmaceutical companies in Australia' not 'pharma companies')."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "max_results": {"type": "integer", "description": "Maximum number of results (default 8)"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = str_arg(&args, "query").trim();
        if query.is_empty() {
            return Err("query is required".to_string());
        }
        let max_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .filter(|n| *n > 0)
            .unwrap_or(self.default_max_results);
        // 搜索失败作为普通结果返回，模型可换个查询重试
        match self.search(query, max_results).await {
            Ok(hits) => Ok(format_hits(&hits)),
            Err(e) => Ok(format!("Search failed: {}", e)),
        }
    }
}

pub async fn register(registry: &CapabilityRegistry) -> Result<(), CapabilityError> {
    registry
        .register(
            CAPABILITY_ID,
            &[TOOL_NAME],
            Arc::new(|ctx: &CapabilityContext| -> ProviderResult {
                let search = &ctx.config.tools.search;
                let tool = WebSearchTool::new(search.timeout_secs, search.max_results)?;
                Ok(vec![Arc::new(tool) as Arc<dyn Tool>])
            }),
            EnablementPolicy::EnvGated(ENABLE_WEB_SEARCH.to_string()),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<div class="result results_links results_links_deep web-result">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust%2Dlang.org%2F&amp;rut=abc">Rust <b>Programming</b> Language</a>
  </h2>
  <a class="result__snippet" href="//duckduckgo.com/l/?uddg=x">A language empowering everyone &amp; fast.</a>
</div>
<div class="result">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="https://doc.rust-lang.org/book/">The Book</a>
  </h2>
  <a class="result__snippet" href="https://doc.rust-lang.org/book/">Learn Rust.</a>
</div>
"#;

    #[test]
    fn test_parse_results() {
        let tool = WebSearchTool::new(5, 8).unwrap();
        let hits = tool.parse_results(PAGE, 8);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Rust Programming Language");
        assert_eq!(hits[0].url, "https://www.rust-lang.org/");
        assert!(hits[0].body.contains("fast"));
        assert_eq!(hits[1].url, "https://doc.rust-lang.org/book/");

        assert_eq!(tool.parse_results(PAGE, 1).len(), 1);
    }

    #[test]
    fn test_format_hits() {
        assert_eq!(format_hits(&[]), NO_RESULTS);
        let hits = vec![
            SearchHit {
                title: "A".into(),
                body: "a body".into(),
                url: "https://a".into(),
            },
            SearchHit {
                title: "B".into(),
                body: "b body".into(),
                url: "https://b".into(),
            },
        ];
        assert_eq!(
            format_hits(&hits),
            "1. A\n   a body\n   https://a\n\n2. B\n   b body\n   https://b"
        );
    }
}
