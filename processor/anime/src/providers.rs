//! 视频托管站点的提取策略
//!
//! 每种 [`ProviderKind`] 对应一个 [`StreamExtractor`]，候选源在构造时就已经分好类，
//! 解析时只需按类型查表。添加新的托管站点：
//!
//! 1. 在 `common::models::PROVIDER_HOSTS` 中登记主机名
//! 2. 实现 [`StreamExtractor`]
//! 3. 在 [`ProviderRegistry::standard`] 中注册

use std::collections::HashMap;
use std::sync::Arc;

use scraper::Html;
use serde_json::Value;
use url::Url;

use common::document::{all_elements, attr_of, first_attr};
use common::literal::find_literal;
use common::{
    AbortSignal, FetchRequest, Fetcher, ProviderKind, ResolveResult, SessionManager,
    SourceCandidate, StreamSource, fetch_checked,
};

/// iframe 链最多跟随的层数
const MAX_EMBED_HOPS: usize = 3;

/// 脚本中播放源数组的标记，按顺序尝试
const SCRIPT_MARKERS: &[&str] = &["sources", "player.src("];

/// 可以直接播放的文件扩展名
const MEDIA_EXTENSIONS: &[&str] = &[".mp4", ".m3u8", ".webm", ".mkv"];

/// 从候选源中提取可播放地址
///
/// 返回空列表与返回错误一样视为本次尝试失败。
#[async_trait::async_trait]
pub trait StreamExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(
        &self,
        candidate: &SourceCandidate,
        signal: &AbortSignal,
    ) -> ResolveResult<Vec<StreamSource>>;
}

/// 站点类型到提取策略的映射
#[derive(Clone)]
pub struct ProviderRegistry {
    strategies: HashMap<ProviderKind, Arc<dyn StreamExtractor>>,
    fallback: Arc<dyn StreamExtractor>,
}

impl ProviderRegistry {
    /// 未注册的站点类型使用 `fallback`
    pub fn new(fallback: Arc<dyn StreamExtractor>) -> Self {
        Self {
            strategies: HashMap::new(),
            fallback,
        }
    }

    /// 内置的全部策略
    pub fn standard(fetcher: Arc<dyn Fetcher>, session: Arc<SessionManager>) -> Self {
        Self::new(Arc::new(GenericExtractor {
            fetcher: Arc::clone(&fetcher),
        }))
        .register(
            ProviderKind::Desustream,
            Arc::new(VideoTagExtractor {
                fetcher: Arc::clone(&fetcher),
            }),
        )
        .register(
            ProviderKind::Mp4upload,
            Arc::new(ScriptSourcesExtractor { fetcher }),
        )
        .register(
            ProviderKind::Kuramadrive,
            Arc::new(AuthenticatedEmbedExtractor { session }),
        )
    }

    pub fn register(mut self, kind: ProviderKind, extractor: Arc<dyn StreamExtractor>) -> Self {
        self.strategies.insert(kind, extractor);
        self
    }

    pub fn strategy(&self, kind: ProviderKind) -> &dyn StreamExtractor {
        self.strategies
            .get(&kind)
            .unwrap_or(&self.fallback)
            .as_ref()
    }
}

// ========== 策略实现 ==========

/// 页面中直接包含 `<video><source>`
pub struct VideoTagExtractor {
    fetcher: Arc<dyn Fetcher>,
}

#[async_trait::async_trait]
impl StreamExtractor for VideoTagExtractor {
    fn name(&self) -> &'static str {
        "video-tag"
    }

    async fn extract(
        &self,
        candidate: &SourceCandidate,
        signal: &AbortSignal,
    ) -> ResolveResult<Vec<StreamSource>> {
        let link = &candidate.raw_link;
        let response = fetch_checked(self.fetcher.as_ref(), FetchRequest::get(link), signal).await?;
        Ok(into_streams(video_sources(&response.body, link)))
    }
}

/// 脚本中内嵌 `sources: [...]` 或 `player.src({...})`
pub struct ScriptSourcesExtractor {
    fetcher: Arc<dyn Fetcher>,
}

#[async_trait::async_trait]
impl StreamExtractor for ScriptSourcesExtractor {
    fn name(&self) -> &'static str {
        "script-sources"
    }

    async fn extract(
        &self,
        candidate: &SourceCandidate,
        signal: &AbortSignal,
    ) -> ResolveResult<Vec<StreamSource>> {
        let link = &candidate.raw_link;
        let response = fetch_checked(self.fetcher.as_ref(), FetchRequest::get(link), signal).await?;
        Ok(into_streams(script_sources(&response.body, link)))
    }
}

/// 需要会话凭证的 iframe 链
pub struct AuthenticatedEmbedExtractor {
    session: Arc<SessionManager>,
}

#[async_trait::async_trait]
impl StreamExtractor for AuthenticatedEmbedExtractor {
    fn name(&self) -> &'static str {
        "authenticated-embed"
    }

    async fn extract(
        &self,
        candidate: &SourceCandidate,
        signal: &AbortSignal,
    ) -> ResolveResult<Vec<StreamSource>> {
        let mut link = candidate.raw_link.clone();

        for hop in 0..MAX_EMBED_HOPS {
            let response = self
                .session
                .fetch_authenticated(FetchRequest::get(&link), signal)
                .await?;

            let mut found = video_sources(&response.body, &link);
            if found.is_empty() {
                found = script_sources(&response.body, &link);
            }
            if !found.is_empty() {
                return Ok(into_streams(found));
            }

            match iframe_src(&response.body, &link) {
                Some(next) => {
                    log::debug!("Following embed hop {}: {}", hop + 1, next);
                    link = next;
                }
                None => break,
            }
        }

        Ok(Vec::new())
    }
}

/// 未知站点：链接本身是媒体文件时直接使用，否则依次尝试视频标签与脚本
pub struct GenericExtractor {
    fetcher: Arc<dyn Fetcher>,
}

#[async_trait::async_trait]
impl StreamExtractor for GenericExtractor {
    fn name(&self) -> &'static str {
        "generic"
    }

    async fn extract(
        &self,
        candidate: &SourceCandidate,
        signal: &AbortSignal,
    ) -> ResolveResult<Vec<StreamSource>> {
        let link = &candidate.raw_link;
        if is_media_link(link) {
            return Ok(into_streams(vec![link.clone()]));
        }

        let response = fetch_checked(self.fetcher.as_ref(), FetchRequest::get(link), signal).await?;
        let mut found = video_sources(&response.body, link);
        if found.is_empty() {
            found = script_sources(&response.body, link);
        }
        Ok(into_streams(found))
    }
}

// ========== 工具函数 ==========

/// 相对地址以嵌入页为基准补全
fn resolve_against(base: &str, link: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }
    Url::parse(base)
        .and_then(|base| base.join(link))
        .map(|url| url.to_string())
        .ok()
}

fn is_media_link(link: &str) -> bool {
    let path = Url::parse(link)
        .map(|url| url.path().to_lowercase())
        .unwrap_or_default();
    MEDIA_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// `<video src>` 与 `<video><source src>`
pub(crate) fn video_sources(body: &str, base: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    all_elements(document.root_element(), "video, video source")
        .into_iter()
        .filter_map(|element| attr_of(element, &["src", "data-src"]))
        .filter_map(|src| resolve_against(base, &src))
        .collect()
}

/// 脚本字面量中的播放源
pub(crate) fn script_sources(body: &str, base: &str) -> Vec<String> {
    SCRIPT_MARKERS
        .iter()
        .filter_map(|marker| find_literal(body, marker))
        .map(|value| literal_urls(&value))
        .find(|urls| !urls.is_empty())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|src| resolve_against(base, &src))
        .collect()
}

fn iframe_src(body: &str, base: &str) -> Option<String> {
    let document = Html::parse_document(body);
    first_attr(document.root_element(), &["iframe"], &["src", "data-src"])
        .and_then(|src| resolve_against(base, &src))
}

/// 数组元素可以是字符串，或带 `file` / `src` / `url` 字段的对象
fn literal_urls(value: &Value) -> Vec<String> {
    match value {
        Value::String(url) if !url.trim().is_empty() => vec![url.clone()],
        Value::Array(items) => items.iter().flat_map(literal_urls).collect(),
        Value::Object(map) => ["file", "src", "url"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .filter(|url| !url.trim().is_empty())
            .map(|url| vec![url.to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// 去重，保持顺序
fn into_streams(urls: Vec<String>) -> Vec<StreamSource> {
    let mut streams: Vec<StreamSource> = Vec::with_capacity(urls.len());
    for url in urls {
        if !streams.iter().any(|s| s.url == url) {
            streams.push(StreamSource { url });
        }
    }
    streams
}
