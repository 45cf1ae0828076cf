//! Discourse-compatible forum connector.
//!
//! Lists topics page by page from `/latest.json` and fetches full topics
//! from `/t/{id}.json`. Implements [`RemoteSource`], so it plugs straight
//! into the sync engine.
//!
//! # Configuration
//!
//! ```toml
//! [source]
//! name = "forum"
//! base_url = "https://forum.example.com"
//! auth = "api_key"
//! api_key_env = "FORUM_API_KEY"
//! api_username = "system"
//! cooldown_ms = 500
//! ```
//!
//! # Change signals
//!
//! A topic's marker is its `last_posted_at` (falling back to `bumped_at`,
//! then `created_at`) in Unix seconds; its sub-element count is
//! `posts_count`. Both come from the listing, so unchanged topics are never
//! fetched.
//!
//! # Pacing and retries
//!
//! Every request (listing, topic, extra posts) waits until `cooldown` has
//! elapsed since the previous one. Network errors, 429 and 5xx are retried
//! with exponential backoff; 401/403 and other 4xx are fatal; 404/410 on a
//! topic mean the topic vanished (on its extra posts, a `Schema` error).
//!
//! # Long topics
//!
//! `/t/{id}.json` only embeds the first page of posts. The remaining post
//! ids listed in `post_stream.stream` are fetched from
//! `/t/{id}/posts.json` in groups of [`POSTS_PER_REQUEST`].

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use scraper::{ElementRef, Html, Node};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::{AuthScheme, Config};
use crate::error::{Result, SyncError};
use crate::models::{ItemContent, ListingPage, RemoteItem};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::source::RemoteSource;

/// Maximum post ids requested per `/t/{id}/posts.json` call.
pub const POSTS_PER_REQUEST: usize = 20;

/// How requests authenticate against the forum.
#[derive(Debug, Clone)]
pub enum ForumAuth {
    None,
    /// `Api-Key` + `Api-Username` headers.
    ApiKey { key: String, username: String },
    /// `Authorization: Bearer <token>`.
    Bearer(String),
}

#[derive(Debug, Clone)]
pub struct ForumSettings {
    pub name: String,
    pub base_url: String,
    pub auth: ForumAuth,
    pub cooldown: Duration,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ForumSettings {
    /// Build settings from config, resolving the credential from the
    /// environment.
    pub fn from_config(config: &Config) -> AnyResult<Self> {
        let src = &config.source;
        let auth = match (src.auth, src.api_key()?) {
            (AuthScheme::ApiKey, Some(key)) => ForumAuth::ApiKey {
                key,
                username: src
                    .api_username
                    .clone()
                    .unwrap_or_else(|| "system".to_string()),
            },
            (AuthScheme::Bearer, Some(token)) => ForumAuth::Bearer(token),
            _ => ForumAuth::None,
        };

        Ok(Self {
            name: src.name.clone(),
            base_url: src.base_url.trim_end_matches('/').to_string(),
            auth,
            cooldown: src.cooldown(),
            timeout: Duration::from_secs(src.timeout_secs),
            retry: RetryPolicy::from_config(&config.retry),
        })
    }
}

/// A forum instance that implements [`RemoteSource`].
pub struct ForumSource {
    settings: ForumSettings,
    client: reqwest::Client,
    last_request: Mutex<Option<Instant>>,
}

impl ForumSource {
    pub fn new(settings: ForumSettings) -> AnyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("content-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            settings,
            client,
            last_request: Mutex::new(None),
        })
    }

    pub fn from_config(config: &Config) -> AnyResult<Self> {
        Self::new(ForumSettings::from_config(config)?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url, path)
    }

    /// Wait until the cooldown since the previous request has elapsed.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.settings.cooldown {
                tokio::time::sleep(self.settings.cooldown - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        retry_with_backoff(&self.settings.retry, || self.get_json_once(url)).await
    }

    async fn get_json_once<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.pace().await;
        debug!(url, "GET");

        let mut req = self.client.get(url).header("Accept", "application/json");
        req = match &self.settings.auth {
            ForumAuth::None => req,
            ForumAuth::ApiKey { key, username } => req
                .header("Api-Key", key)
                .header("Api-Username", username),
            ForumAuth::Bearer(token) => req.bearer_auth(token),
        };

        let resp = req.send().await.map_err(|e| SyncError::TransientFetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = body.chars().take(500).collect::<String>();
            return Err(match status.as_u16() {
                404 | 410 => SyncError::NotFound(url.to_string()),
                429 => SyncError::TransientFetch {
                    url: url.to_string(),
                    message: format!("HTTP 429: {}", message),
                },
                s if status.is_server_error() => SyncError::TransientFetch {
                    url: url.to_string(),
                    message: format!("HTTP {}: {}", s, message),
                },
                s => SyncError::FatalFetch {
                    url: url.to_string(),
                    status: s,
                    message,
                },
            });
        }

        let text = resp.text().await.map_err(|e| SyncError::TransientFetch {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        serde_json::from_str(&text).map_err(|e| SyncError::Schema {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// Fetch posts that were not embedded in the topic response.
    async fn fetch_remaining_posts(&self, topic_id: u64, ids: &[u64]) -> Result<Vec<Post>> {
        let mut posts = Vec::with_capacity(ids.len());
        for group in ids.chunks(POSTS_PER_REQUEST) {
            let query = group
                .iter()
                .map(|id| format!("post_ids[]={}", id))
                .collect::<Vec<_>>()
                .join("&");
            let url = self.url(&format!(
                "/t/{}/posts.json?{}&include_raw=true",
                topic_id, query
            ));
            // 404 here is a broken post stream, not a vanished topic
            let resp: PostsResponse = match self.get_json(&url).await {
                Err(SyncError::NotFound(_)) => {
                    return Err(SyncError::Schema {
                        url,
                        message: format!("posts of topic {} not found", topic_id),
                    })
                }
                other => other?,
            };
            posts.extend(resp.post_stream.posts);
        }
        Ok(posts)
    }
}

// ============ Wire schema ============

#[derive(Debug, Deserialize)]
struct LatestResponse {
    topic_list: TopicList,
}

#[derive(Debug, Deserialize)]
struct TopicList {
    topics: Vec<TopicSummary>,
    #[serde(default)]
    more_topics_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopicSummary {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    posts_count: i64,
    #[serde(default)]
    last_posted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    bumped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TopicResponse {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    post_stream: PostStream,
}

#[derive(Debug, Deserialize)]
struct PostStream {
    posts: Vec<Post>,
    #[serde(default)]
    stream: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct PostsResponse {
    post_stream: PostStream,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: u64,
    #[serde(default)]
    post_number: i64,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    raw: Option<String>,
    #[serde(default)]
    cooked: Option<String>,
}

impl Post {
    fn text(&self) -> Option<String> {
        match (&self.raw, &self.cooked) {
            (Some(raw), _) => Some(raw.trim().to_string()),
            (None, Some(cooked)) => Some(html_to_text(cooked)),
            (None, None) => None,
        }
    }
}

fn summary_to_item(topic: TopicSummary, url: &str) -> Result<RemoteItem> {
    let marker = topic
        .last_posted_at
        .or(topic.bumped_at)
        .or(topic.created_at)
        .ok_or_else(|| SyncError::Schema {
            url: url.to_string(),
            message: format!(
                "topic {} has none of last_posted_at, bumped_at, created_at",
                topic.id
            ),
        })?;

    Ok(RemoteItem {
        source_id: topic.id.to_string(),
        marker: marker.timestamp(),
        title: topic.title,
        sub_count: topic.posts_count,
    })
}

#[async_trait]
impl RemoteSource for ForumSource {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn list_page(&self, page: u32) -> Result<ListingPage> {
        let url = self.url(&format!("/latest.json?page={}", page));
        let resp: LatestResponse = self.get_json(&url).await?;

        let items = resp
            .topic_list
            .topics
            .into_iter()
            .map(|t| summary_to_item(t, &url))
            .collect::<Result<Vec<_>>>()?;

        Ok(ListingPage {
            items,
            has_more: resp.topic_list.more_topics_url.is_some(),
        })
    }

    async fn fetch_item(&self, source_id: &str) -> Result<ItemContent> {
        let url = self.url(&format!("/t/{}.json?include_raw=true", source_id));
        let topic: TopicResponse = match self.get_json(&url).await {
            Err(SyncError::NotFound(_)) => return Err(SyncError::NotFound(source_id.to_string())),
            other => other?,
        };

        let mut posts = topic.post_stream.posts;
        let seen: HashSet<u64> = posts.iter().map(|p| p.id).collect();
        let missing: Vec<u64> = topic
            .post_stream
            .stream
            .iter()
            .copied()
            .filter(|id| !seen.contains(id))
            .collect();
        if !missing.is_empty() {
            debug!(topic = topic.id, count = missing.len(), "fetching remaining posts");
            posts.extend(self.fetch_remaining_posts(topic.id, &missing).await?);
        }
        posts.sort_by_key(|p| p.post_number);

        let mut sections = Vec::with_capacity(posts.len());
        for post in &posts {
            let text = post.text().ok_or_else(|| SyncError::Schema {
                url: url.clone(),
                message: format!("post {} has neither raw nor cooked", post.id),
            })?;
            if text.is_empty() {
                continue;
            }
            match &post.username {
                Some(user) => sections.push(format!("{} wrote:\n{}", user, text)),
                None => sections.push(text),
            }
        }

        let topic_url = match &topic.slug {
            Some(slug) => self.url(&format!("/t/{}/{}", slug, topic.id)),
            None => self.url(&format!("/t/{}", topic.id)),
        };

        Ok(ItemContent {
            source_id: topic.id.to_string(),
            title: topic.title,
            url: Some(topic_url),
            author: posts.first().and_then(|p| p.username.clone()),
            body: sections.join("\n\n"),
        })
    }
}

// ============ HTML to text ============

/// Convert rendered post HTML to plain text.
///
/// Parsed with `scraper`, so entities are decoded and attribute values never
/// leak into the text. Block elements become paragraph breaks for the
/// chunker; `<br>` becomes a newline.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());
    collect_text(fragment.root_element(), &mut out);

    // Collapse runs of blank lines and trim each line.
    let mut cleaned = String::with_capacity(out.len());
    let mut blank_run = 0;
    for line in out.lines() {
        let line = line.trim();
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !cleaned.is_empty() {
            cleaned.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        cleaned.push_str(line);
        blank_run = 0;
    }
    cleaned
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if matches!(name, "script" | "style" | "template" | "noscript") {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                let block = is_block(name);
                if block {
                    out.push_str("\n\n");
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
                if block {
                    out.push_str("\n\n");
                }
            }
            _ => {}
        }
    }
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "li"
            | "blockquote"
            | "pre"
            | "aside"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "ul"
            | "ol"
            | "table"
            | "tr"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_paragraphs() {
        let html = "<p>First line<br>second line</p>\n<p>Second &amp; last</p>";
        assert_eq!(
            html_to_text(html),
            "First line\nsecond line\n\nSecond & last"
        );
    }

    #[test]
    fn test_html_to_text_drops_inline_tags() {
        let html = "<p>See <a href=\"https://x.y\">the <strong>docs</strong></a>.</p>";
        assert_eq!(html_to_text(html), "See the docs.");
    }

    #[test]
    fn test_html_to_text_unterminated_tag() {
        assert_eq!(html_to_text("a < b"), "a < b");
    }

    #[test]
    fn test_html_to_text_decodes_all_entities() {
        assert_eq!(
            html_to_text("<p>It&#8217;s &hellip; caf&eacute; &#x2014; done</p>"),
            "It\u{2019}s \u{2026} caf\u{e9} \u{2014} done"
        );
    }

    #[test]
    fn test_html_to_text_ignores_attribute_contents() {
        assert_eq!(
            html_to_text("<p><a title=\"a > b\" href=\"/x\">link</a> text</p>"),
            "link text"
        );
    }

    #[test]
    fn test_html_to_text_quote_and_list_blocks() {
        let html = "<aside class=\"quote\"><blockquote><p>quoted</p></blockquote></aside>\
                    <ul><li>one</li><li>two</li></ul><script>alert(1)</script>";
        assert_eq!(html_to_text(html), "quoted\n\none\n\ntwo");
    }

    #[test]
    fn test_summary_marker_fallback() {
        let topic: TopicSummary = serde_json::from_str(
            r#"{"id": 7, "title": "t", "posts_count": 3, "last_posted_at": null,
                "bumped_at": "2024-05-01T10:00:00.000Z"}"#,
        )
        .unwrap();
        let item = summary_to_item(topic, "u").unwrap();
        assert_eq!(item.source_id, "7");
        assert_eq!(item.sub_count, 3);
        assert_eq!(item.marker, 1_714_557_600);
    }

    #[test]
    fn test_summary_without_any_timestamp_is_schema_error() {
        let topic: TopicSummary =
            serde_json::from_str(r#"{"id": 7, "posts_count": 3}"#).unwrap();
        assert!(matches!(
            summary_to_item(topic, "u"),
            Err(SyncError::Schema { .. })
        ));
    }

    #[test]
    fn test_post_prefers_raw() {
        let post: Post = serde_json::from_str(
            r#"{"id": 1, "post_number": 1, "raw": " **hi** ", "cooked": "<p><strong>hi</strong></p>"}"#,
        )
        .unwrap();
        assert_eq!(post.text().as_deref(), Some("**hi**"));
    }
}
