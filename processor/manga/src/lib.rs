//! 漫画站内容源
//!
//! HTML 与 JSON 混合的站点：
//!
//! - 系列页是 HTML，完整的章节列表需要带会话凭证请求章节接口
//! - 阅读页把图片列表放在 `script#__NEXT_DATA__` 中，图片 CDN 写在脚本字面量里
//! - 搜索走 JSON 接口
//!
//! # 模块结构
//!
//! - [`page`] - 页面与接口响应的分类解析

use std::sync::{Arc, OnceLock};

use regex::Regex;

use common::config::env_url;
use common::pagination::{current_page, paged_url};
use common::{
    AbortSignal, CdnDescriptor, ContentHints, ContentSource, DetailRecord, FetchRequest,
    FetchResponse, Fetcher, ListingPage, ResolveError, ResolveResult, ResolvedStream, SearchPage,
    SessionEndpoints, SessionManager, SourceCandidate, SourceConfig, UrlNormalizer,
    fetch_checked,
};

pub mod page;

pub use page::{MangaDocument, classify_and_parse, find_cdn, parse_chapter_api, series_id};

/// 站点地址的环境变量
pub const BASE_URL_VAR: &str = "MANGA_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "https://komikcast.li/";

/// 默认图片 CDN 的环境变量
pub const CDN_VAR: &str = "MANGA_DEFAULT_CDN";
pub const DEFAULT_CDN: &str = "https://cdn.komikcast.li/";

const TOKEN_PATH: &str = "api/token";

static MANGA_REGEX: OnceLock<Regex> = OnceLock::new();

/// 漫画站内容源
pub struct MangaSource {
    fetcher: Arc<dyn Fetcher>,
    normalizer: UrlNormalizer,
    session: Arc<SessionManager>,
    default_cdn: CdnDescriptor,
}

impl MangaSource {
    const PATTERN: &'static str =
        r"https?://[^/\s]+/(?:komik|chapter|series|daftar-komik|manga)/[^\s]*";

    /// 从环境变量读取配置并创建
    pub fn from_env() -> ResolveResult<Self> {
        let config = SourceConfig::from_env(BASE_URL_VAR, DEFAULT_BASE_URL)?;
        let cdn = CdnDescriptor {
            link: env_url(CDN_VAR, DEFAULT_CDN)?.to_string(),
            name: "default".to_string(),
        };
        let fetcher = config.build_fetcher()?;
        Ok(Self::new(&config, fetcher, cdn))
    }

    pub fn new(config: &SourceConfig, fetcher: Arc<dyn Fetcher>, default_cdn: CdnDescriptor) -> Self {
        let normalizer = config.normalizer();
        let endpoints = SessionEndpoints {
            bootstrap_url: config.base_url.to_string(),
            token_url: normalizer.normalize(TOKEN_PATH),
        };
        let session = Arc::new(SessionManager::new(Arc::clone(&fetcher), endpoints));

        Self {
            fetcher,
            normalizer,
            session,
            default_cdn,
        }
    }

    pub fn session(&self) -> Arc<SessionManager> {
        Arc::clone(&self.session)
    }

    fn parse(&self, response: &FetchResponse, page: u32) -> ResolveResult<DetailRecord> {
        let hints = ContentHints::new(&self.normalizer)
            .content_type(response.content_type())
            .page(page);
        classify_and_parse(&response.body, &hints, &self.default_cdn)
    }

    async fn fetch_document(
        &self,
        url: &str,
        page: u32,
        signal: &AbortSignal,
    ) -> ResolveResult<(DetailRecord, FetchResponse)> {
        let response = fetch_checked(self.fetcher.as_ref(), FetchRequest::get(url), signal).await?;
        let record = self.parse(&response, page)?;
        log::debug!("Parsed {} as {}", url, record.variant_name());
        Ok((record, response))
    }

    async fn fetch_chapters(&self, url: &str, signal: &AbortSignal) -> ResolveResult<ListingPage> {
        let response = self
            .session
            .fetch_authenticated(FetchRequest::get(url), signal)
            .await?;
        let hints = ContentHints::new(&self.normalizer).content_type(response.content_type());
        parse_chapter_api(&response.body, &hints)
    }

    /// 用章节接口的结果替换页面上的章节表
    ///
    /// 页面上没有系列 ID 时直接使用章节表。接口请求或解析失败时，
    /// 只要章节表不为空就保留章节表。
    async fn complete_chapters(
        &self,
        mut listing: ListingPage,
        body: &str,
        signal: &AbortSignal,
    ) -> ResolveResult<ListingPage> {
        let Some(id) = series_id(body) else {
            log::debug!("No series id, using inline chapter rows");
            return Ok(listing);
        };

        let url = self
            .normalizer
            .normalize(&format!("api/series/{}/chapters", id));
        let chapters = match self.fetch_chapters(&url, signal).await {
            Ok(chapters) => chapters,
            Err(ResolveError::Canceled) => return Err(ResolveError::Canceled),
            Err(e) if !listing.items.is_empty() => {
                log::warn!("Chapter API failed, keeping inline rows: {}", e);
                return Ok(listing);
            }
            Err(e) => return Err(e),
        };

        if chapters.items.is_empty() {
            log::debug!("Chapter API returned no chapters");
        } else {
            log::debug!("Chapter API returned {} chapters", chapters.items.len());
            listing.items = chapters.items;
        }
        Ok(listing)
    }
}

#[async_trait::async_trait]
impl ContentSource for MangaSource {
    fn pattern(&self) -> &'static str {
        Self::PATTERN
    }

    fn regex(&self) -> &Regex {
        MANGA_REGEX.get_or_init(|| Regex::new(Self::PATTERN).expect("Invalid manga regex pattern"))
    }

    fn name(&self) -> &'static str {
        "manga"
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

        match self.fetch_document(&target, current, signal).await? {
            (DetailRecord::Listing(listing), response) => self
                .complete_chapters(listing, &response.body, signal)
                .await
                .map(DetailRecord::Listing),
            (record @ DetailRecord::Search(_), _) => Ok(record),
            (other, _) => Err(ResolveError::parse(format!(
                "不是列表页: {}",
                other.variant_name()
            ))),
        }
    }

    async fn resolve_detail(&self, url: &str, signal: &AbortSignal) -> ResolveResult<DetailRecord> {
        let (record, _) = self.fetch_document(url, 1, signal).await?;
        if !record.is_detail_like() {
            return Err(ResolveError::parse(format!(
                "不是阅读页: {}",
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

        let mut url = self.normalizer.base().join("api/search")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("page", &current.to_string());

        match self.fetch_document(url.as_str(), current, signal).await? {
            (DetailRecord::Search(results), _) => Ok(results),
            (other, _) => Err(ResolveError::parse(format!(
                "不是搜索结果: {}",
                other.variant_name()
            ))),
        }
    }

    /// 漫画没有播放源
    async fn resolve_source(
        &self,
        _candidates: &[SourceCandidate],
        _preferred_resolution: Option<&str>,
        signal: &AbortSignal,
    ) -> ResolveResult<ResolvedStream> {
        signal.check()?;
        Err(ResolveError::UnsupportedSource)
    }

    fn build_asset_url(&self, path: &str, width: u32, quality: u8) -> String {
        self.normalizer.derived_asset_url(path, width, quality)
    }
}
