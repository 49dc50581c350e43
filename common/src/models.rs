use serde::{Deserialize, Serialize};

use crate::error::ResolveResult;
use crate::signal::AbortSignal;

/// 缺失字段的占位文本，不要把空值直接交给界面层
pub const UNAVAILABLE: &str = "unavailable";

/// 无法识别的清晰度标签
pub const UNKNOWN_RESOLUTION: &str = "unknown";

/// 列表中的一项（剧集、章节、搜索结果）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListItem {
    pub title: String,
    /// 已补全的绝对链接
    pub url: String,
    /// 已补全的封面链接，空字符串表示没有封面
    pub thumbnail: String,
    /// 发布日期、最新章节等附加说明
    pub subtitle: String,
}

/// 作品元数据，缺失字段为 [`UNAVAILABLE`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub genres: Vec<String>,
    pub status: String,
    pub rating: String,
    pub release_year: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            genres: Vec::new(),
            status: UNAVAILABLE.to_string(),
            rating: UNAVAILABLE.to_string(),
            release_year: UNAVAILABLE.to_string(),
        }
    }
}

/// 已知的视频托管站点
///
/// 声明顺序即偏好顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// 页面直接包含 `<video><source>`
    Desustream,
    /// 脚本中内嵌 `sources: [...]` 字面量
    Mp4upload,
    /// 需要会话凭证的 iframe 链
    Kuramadrive,
    Generic,
}

/// 主机名到站点类型的映射，按顺序匹配
const PROVIDER_HOSTS: &[(&str, ProviderKind)] = &[
    ("desustream", ProviderKind::Desustream),
    ("desudrive", ProviderKind::Desustream),
    ("mp4upload", ProviderKind::Mp4upload),
    ("kuramadrive", ProviderKind::Kuramadrive),
    ("kuramanime", ProviderKind::Kuramadrive),
];

impl ProviderKind {
    /// 根据链接的主机名判断站点类型
    pub fn from_link(link: &str) -> Self {
        let host = url::Url::parse(link)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
            .unwrap_or_default();

        PROVIDER_HOSTS
            .iter()
            .find(|(needle, _)| host.contains(needle))
            .map_or(Self::Generic, |(_, kind)| *kind)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Desustream => "desustream",
            Self::Mp4upload => "mp4upload",
            Self::Kuramadrive => "kuramadrive",
            Self::Generic => "generic",
        }
    }
}

/// 一个候选播放源
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCandidate {
    /// 清晰度标签，如 `480p`，无法识别时为 [`UNKNOWN_RESOLUTION`]
    pub label: String,
    pub raw_link: String,
    pub provider_kind: ProviderKind,
}

impl SourceCandidate {
    pub fn new(label: impl Into<String>, raw_link: impl Into<String>) -> Self {
        let raw_link = raw_link.into();
        Self {
            label: label.into(),
            provider_kind: ProviderKind::from_link(&raw_link),
            raw_link,
        }
    }

    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.provider_kind = kind;
        self
    }
}

/// 按站点偏好排序，同类站点保持页面顺序
pub fn rank_candidates(mut candidates: Vec<SourceCandidate>) -> Vec<SourceCandidate> {
    candidates.sort_by_key(|c| c.provider_kind);
    candidates
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSource {
    pub url: String,
}

/// 最终解析出的播放源
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedStream {
    pub sources: Vec<StreamSource>,
    pub resolution_used: String,
    pub valid_resolutions: Vec<String>,
}

/// 图片 CDN 描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnDescriptor {
    #[serde(alias = "url")]
    pub link: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingPage {
    pub title: String,
    pub items: Vec<ListItem>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamingPage {
    pub title: String,
    pub candidates: Vec<SourceCandidate>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingPage {
    pub title: String,
    pub images: Vec<String>,
    pub next_ref: Option<String>,
    pub prev_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchPage {
    pub items: Vec<ListItem>,
    pub has_next: bool,
    /// 调用方传入的当前页码，页面本身不包含页码
    pub page: u32,
}

impl SearchPage {
    pub fn next_page(&self) -> Option<u32> {
        crate::pagination::next_page(self.page, self.has_next)
    }
}

/// 一次解析的结果，每次只会是其中一种
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetailRecord {
    Listing(ListingPage),
    Streaming(StreamingPage),
    Reading(ReadingPage),
    Search(SearchPage),
}

impl DetailRecord {
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Listing(_) => "listing",
            Self::Streaming(_) => "streaming",
            Self::Reading(_) => "reading",
            Self::Search(_) => "search",
        }
    }

    /// 是否为列表类页面（列表页或搜索页）
    pub fn is_listing_like(&self) -> bool {
        matches!(self, Self::Listing(_) | Self::Search(_))
    }

    /// 是否为详情类页面（播放页或阅读页）
    pub fn is_detail_like(&self) -> bool {
        matches!(self, Self::Streaming(_) | Self::Reading(_))
    }
}

/// 统一的内容源 trait
#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    /// 获取正则表达式模式字符串
    fn pattern(&self) -> &'static str;

    /// 获取匹配的正则表达式
    fn regex(&self) -> &regex::Regex;

    /// 获取内容源名称
    fn name(&self) -> &'static str;

    /// 解析列表页或搜索页
    async fn resolve_listing(
        &self,
        url: &str,
        page: Option<u32>,
        signal: &AbortSignal,
    ) -> ResolveResult<DetailRecord>;

    /// 解析播放页或阅读页
    async fn resolve_detail(&self, url: &str, signal: &AbortSignal) -> ResolveResult<DetailRecord>;

    /// 按关键字搜索
    async fn search(
        &self,
        query: &str,
        page: Option<u32>,
        signal: &AbortSignal,
    ) -> ResolveResult<SearchPage>;

    /// 在候选源中挑选并解析出可播放的地址
    async fn resolve_source(
        &self,
        candidates: &[SourceCandidate],
        preferred_resolution: Option<&str>,
        signal: &AbortSignal,
    ) -> ResolveResult<ResolvedStream>;

    /// 生成缩放/压缩后的图片地址
    fn build_asset_url(&self, path: &str, width: u32, quality: u8) -> String;
}
