//! 动画站内容源
//!
//! 服务端渲染的 HTML 站点：剧集列表页、播放页（`#change-server` 切换播放源）、
//! 目录与搜索结果网格。
//!
//! # 模块结构
//!
//! - [`page`] - 页面分类与解析
//! - [`providers`] - 视频托管站点的提取策略（添加新站点请查看此模块）
//! - [`resolver`] - 候选源回退解析

use std::sync::{Arc, OnceLock};

use regex::Regex;

use common::pagination::{current_page, paged_url};
use common::{
    AbortSignal, ContentHints, ContentSource, DetailRecord, FetchRequest, Fetcher, ResolveError,
    ResolveResult, ResolvedStream, SearchPage, SessionEndpoints, SessionManager, SourceCandidate,
    SourceConfig, UrlNormalizer, fetch_checked,
};

pub mod page;
pub mod providers;
pub mod resolver;
mod tests;

pub use page::{classify_and_parse, parse_resolution_label};
pub use providers::{ProviderRegistry, StreamExtractor};
pub use resolver::{LabelPattern, Resolver};

/// 站点地址的环境变量
pub const BASE_URL_VAR: &str = "ANIME_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "https://otakudesu.cloud/";

/// 令牌接口相对站点根目录的路径
const TOKEN_PATH: &str = "api/v1/token";

static ANIME_REGEX: OnceLock<Regex> = OnceLock::new();

/// 动画站内容源
pub struct AnimeSource {
    fetcher: Arc<dyn Fetcher>,
    normalizer: UrlNormalizer,
    session: Arc<SessionManager>,
    resolver: Resolver,
}

impl AnimeSource {
    const PATTERN: &'static str =
        r"https?://[^/\s]+/(?:anime|episode|ongoing-anime|complete-anime|genres)/[^\s]*";

    /// 从环境变量读取配置并创建
    pub fn from_env() -> ResolveResult<Self> {
        let config = SourceConfig::from_env(BASE_URL_VAR, DEFAULT_BASE_URL)?;
        let fetcher = config.build_fetcher()?;
        Ok(Self::new(&config, fetcher))
    }

    pub fn new(config: &SourceConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let normalizer = config.normalizer();
        let endpoints = SessionEndpoints {
            bootstrap_url: config.base_url.to_string(),
            token_url: normalizer.normalize(TOKEN_PATH),
        };
        let session = Arc::new(SessionManager::new(Arc::clone(&fetcher), endpoints));
        let resolver = Resolver::new(ProviderRegistry::standard(
            Arc::clone(&fetcher),
            Arc::clone(&session),
        ));

        Self {
            fetcher,
            normalizer,
            session,
            resolver,
        }
    }

    /// 替换候选源解析器（自定义提取策略）
    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// 供自定义策略共享的会话
    pub fn session(&self) -> Arc<SessionManager> {
        Arc::clone(&self.session)
    }

    pub fn normalizer(&self) -> &UrlNormalizer {
        &self.normalizer
    }

    async fn fetch_document(
        &self,
        url: &str,
        page: u32,
        signal: &AbortSignal,
    ) -> ResolveResult<DetailRecord> {
        let response = fetch_checked(self.fetcher.as_ref(), FetchRequest::get(url), signal).await?;
        let hints = ContentHints::new(&self.normalizer)
            .content_type(response.content_type())
            .page(page);
        let record = classify_and_parse(&response.body, &hints)?;
        log::debug!("Parsed {} as {}", url, record.variant_name());
        Ok(record)
    }
}

#[async_trait::async_trait]
impl ContentSource for AnimeSource {
    fn pattern(&self) -> &'static str {
        Self::PATTERN
    }

    fn regex(&self) -> &Regex {
        ANIME_REGEX.get_or_init(|| Regex::new(Self::PATTERN).expect("Invalid anime regex pattern"))
    }

    fn name(&self) -> &'static str {
        "anime"
    }

    async fn resolve_listing(
        &self,
        url: &str,
        page: Option<u32>,
        signal: &AbortSignal,
    ) -> ResolveResult<DetailRecord> {
        let current = current_page(page);
        let target = if current > 1 {
            paged_url(url, current)?
        } else {
            url.to_string()
        };

        let record = self.fetch_document(&target, current, signal).await?;
        if !record.is_listing_like() {
            return Err(ResolveError::parse(format!(
                "不是列表页: {}",
                record.variant_name()
            )));
        }
        Ok(record)
    }

    async fn resolve_detail(&self, url: &str, signal: &AbortSignal) -> ResolveResult<DetailRecord> {
        let record = self.fetch_document(url, 1, signal).await?;
        if !record.is_detail_like() {
            return Err(ResolveError::parse(format!(
                "不是播放页: {}",
                record.variant_name()
            )));
        }
        Ok(record)
    }

    async fn search(
        &self,
        query: &str,
        page: Option<u32>,
        signal: &AbortSignal,
    ) -> ResolveResult<SearchPage> {
        let current = current_page(page);
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchPage {
                items: Vec::new(),
                has_next: false,
                page: current,
            });
        }

        let mut url = self.normalizer.base().clone();
        if current > 1 {
            url.set_path(&format!("{}page/{}/", url.path(), current));
        }
        url.query_pairs_mut()
            .append_pair("s", query)
            .append_pair("post_type", "anime");

        match self.fetch_document(url.as_str(), current, signal).await? {
            DetailRecord::Search(results) => Ok(results),
            other => Err(ResolveError::parse(format!(
                "不是搜索结果页: {}",
                other.variant_name()
            ))),
        }
    }

    async fn resolve_source(
        &self,
        candidates: &[SourceCandidate],
        preferred_resolution: Option<&str>,
        signal: &AbortSignal,
    ) -> ResolveResult<ResolvedStream> {
        self.resolver
            .resolve(candidates, preferred_resolution, signal)
            .await
    }

    fn build_asset_url(&self, path: &str, width: u32, quality: u8) -> String {
        self.normalizer.derived_asset_url(path, width, quality)
    }
}
