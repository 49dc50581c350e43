//! 动画站页面解析
//!
//! 页面类型由结构特征决定，按以下顺序尝试：
//!
//! 1. `#change-server` 播放器切换控件 → [`StreamingPage`]
//! 2. `.episodelist` 剧集表 → [`ListingPage`]
//! 3. `.chivsrc` 搜索结果 / `.venz` 目录网格 → [`SearchPage`]

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};

use common::document::{
    Fingerprint, all_elements, attr_of, classify, element_text, exists, first_attr,
    first_element, first_text, looks_like_json, metadata_from_rows,
};
use common::{
    ContentHints, DetailRecord, ListItem, ListingPage, Metadata, ResolveError, ResolveResult,
    SearchPage, SourceCandidate, StreamingPage, UNAVAILABLE, UNKNOWN_RESOLUTION, rank_candidates,
};

/// 标题的候选选择器，按顺序尝试
const TITLE_SELECTORS: &[&str] = &["h1.entry-title", ".jdlrx h1", ".posttl", "title"];

/// 播放器选项中可能存放链接的属性
const LINK_ATTRS: &[&str] = &["value", "data-src", "data-content", "data-video"];

/// 信息栏（`键: 值`）
const INFO_ROWS: &str = ".infozingle p, .anime-info li, .spe span";

/// "下一页"控件
const NEXT_CONTROL: &str = "a.next.page-numbers, .pagenavix a.next, .hpage a.r, link[rel=next]";

static FINGERPRINTS: &[(&str, Fingerprint<Html>)] = &[
    ("change-server", streaming_page),
    ("episodelist", listing_page),
    ("result-grid", search_page),
];

static RESOLUTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("Invalid resolution regex"));

/// 分类并解析一个页面
pub fn classify_and_parse(body: &str, hints: &ContentHints<'_>) -> ResolveResult<DetailRecord> {
    if looks_like_json(body, hints.content_type) {
        return Err(ResolveError::parse("期望 HTML 页面，收到 JSON"));
    }

    let document = Html::parse_document(body);
    classify(&document, hints, FINGERPRINTS)
}

/// 宽松地解析清晰度标签
///
/// 取第一段位于 100..=4320 的数字并补上 `p`，如 `"Mirror 720P"` → `"720p"`。
/// 没有合适的数字时返回 [`UNKNOWN_RESOLUTION`]。
pub fn parse_resolution_label(text: &str) -> String {
    RESOLUTION_REGEX
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<u32>().ok())
        .find(|value| (100..=4320).contains(value))
        .map_or_else(|| UNKNOWN_RESOLUTION.to_string(), |value| format!("{}p", value))
}

fn page_title(root: ElementRef<'_>) -> String {
    first_text(root, TITLE_SELECTORS).unwrap_or_else(|| UNAVAILABLE.to_string())
}

fn page_metadata(root: ElementRef<'_>) -> Metadata {
    metadata_from_rows(all_elements(root, INFO_ROWS).into_iter().map(element_text))
}

// ========== 特征 ==========

fn streaming_page(document: &Html, hints: &ContentHints<'_>) -> Option<DetailRecord> {
    let root = document.root_element();
    let control = first_element(root, "#change-server")?;

    let mut candidates: Vec<SourceCandidate> = all_elements(control, "option, a")
        .into_iter()
        .filter_map(|option| {
            let link = attr_of(option, LINK_ATTRS).or_else(|| attr_of(option, &["href"]))?;
            let label_text = attr_of(option, &["data-quality"]).unwrap_or_else(|| element_text(option));
            Some(SourceCandidate::new(
                parse_resolution_label(&label_text),
                hints.normalizer.normalize(&link),
            ))
        })
        .collect();

    // 没有可选项时退回默认播放器
    if candidates.is_empty() {
        if let Some(src) = first_attr(
            root,
            &["#pembed iframe", ".player-embed iframe", "iframe"],
            &["src", "data-src"],
        ) {
            log::debug!("No server options, falling back to embedded player");
            candidates.push(SourceCandidate::new(
                UNKNOWN_RESOLUTION,
                hints.normalizer.normalize(&src),
            ));
        }
    }

    Some(DetailRecord::Streaming(StreamingPage {
        title: page_title(root),
        candidates: rank_candidates(candidates),
        metadata: page_metadata(root),
    }))
}

fn listing_page(document: &Html, hints: &ContentHints<'_>) -> Option<DetailRecord> {
    let root = document.root_element();
    if !exists(root, ".episodelist") {
        return None;
    }

    let items = all_elements(root, ".episodelist ul li")
        .into_iter()
        .filter_map(|row| {
            let link = first_element(row, "a")?;
            let url = attr_of(link, &["href"])?;
            Some(ListItem {
                title: element_text(link),
                url: hints.normalizer.normalize(&url),
                thumbnail: String::new(),
                subtitle: first_text(row, &[".zeebr", "span.date"])
                    .unwrap_or_else(|| UNAVAILABLE.to_string()),
            })
        })
        .collect();

    Some(DetailRecord::Listing(ListingPage {
        title: page_title(root),
        items,
        metadata: page_metadata(root),
    }))
}

fn search_page(document: &Html, hints: &ContentHints<'_>) -> Option<DetailRecord> {
    let root = document.root_element();
    if !exists(root, ".chivsrc, .venz") {
        return None;
    }

    let items = all_elements(root, ".chivsrc li, .venz li")
        .into_iter()
        .filter_map(|cell| grid_item(cell, hints))
        .collect();

    Some(DetailRecord::Search(SearchPage {
        items,
        has_next: exists(root, NEXT_CONTROL),
        page: hints.page,
    }))
}

fn grid_item(cell: ElementRef<'_>, hints: &ContentHints<'_>) -> Option<ListItem> {
    let url = first_attr(cell, &["h2 a", ".thumb a", "a"], &["href"])?;
    let title = first_text(cell, &["h2.jdlflm", "h2", "a"])?;
    let thumbnail = first_attr(cell, &["img"], &["data-src", "src"]).unwrap_or_default();

    Some(ListItem {
        title,
        url: hints.normalizer.normalize(&url),
        thumbnail: hints.normalizer.normalize(&thumbnail),
        subtitle: first_text(cell, &[".epz", ".newnime", ".set"])
            .unwrap_or_else(|| UNAVAILABLE.to_string()),
    })
}
