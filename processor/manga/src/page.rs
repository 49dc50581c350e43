//! 漫画站页面解析
//!
//! HTML 页面按以下顺序判断：
//!
//! 1. `script#__NEXT_DATA__` 中带章节图片 → [`ReadingPage`]
//! 2. `#chapter-list` / `table.chapters` 章节表 → [`ListingPage`]
//! 3. `.bge` 结果网格 → [`SearchPage`]
//!
//! JSON 接口：
//!
//! 1. `{data: [...], next_page_url}` → [`SearchPage`]
//! 2. `{data: [...]}` 章节列表 → [`ListingPage`]
//!
//! 章节接口的响应由 [`parse_chapter_api`] 单独解析，不走上面的特征表。

use scraper::{ElementRef, Html};
use serde_json::Value;
use url::Url;

use common::document::{
    Fingerprint, all_elements, attr_of, classify, element_text, exists, first_attr,
    first_element, first_text, looks_like_json, metadata_from_rows,
};
use common::literal::find_literal;
use common::{
    CdnDescriptor, ContentHints, DetailRecord, ListItem, ListingPage, Metadata, ReadingPage,
    ResolveError, ResolveResult, SearchPage, UNAVAILABLE, UrlNormalizer,
};

const SERIES_TITLE: &[&str] = &[
    "h1.komik_info-content-body-title",
    ".series-title h1",
    "h1.entry-title",
    "h1",
    "title",
];

const INFO_ROWS: &str = ".komik_info-content-meta span, .infox .spe span, .series-info li";

const GENRE_LINKS: &str = ".komik_info-content-genre a, .genre-info a";

const RATING: &[&str] = &[".komik_info-content-rating", ".rating .num"];

const NEXT_CONTROL: &str = "a.next.page-numbers, .pagination a.next, .hpage a.r, link[rel=next]";

/// 阅读页数据在 `__NEXT_DATA__` 中可能的位置
const PAYLOAD_ROOTS: &[&str] = &[
    "/props/pageProps/chapter",
    "/props/pageProps/data",
    "/props/pageProps",
];

static HTML_FINGERPRINTS: &[(&str, Fingerprint<MangaDocument>)] = &[
    ("next-data", reading_page),
    ("chapter-table", listing_page),
    ("result-grid", search_page),
];

static JSON_FINGERPRINTS: &[(&str, Fingerprint<Value>)] = &[
    ("search-api", search_json),
    ("chapter-api", chapters_json),
];

/// 解析后的 HTML 页面
pub struct MangaDocument {
    html: Html,
    /// 脚本中声明的图片 CDN，没有时使用默认 CDN
    cdn: CdnDescriptor,
}

impl MangaDocument {
    pub fn parse(body: &str, default_cdn: &CdnDescriptor) -> Self {
        Self {
            html: Html::parse_document(body),
            cdn: find_cdn(body).unwrap_or_else(|| default_cdn.clone()),
        }
    }

    pub fn cdn(&self) -> &CdnDescriptor {
        &self.cdn
    }
}

/// 分类并解析 HTML 页面或 JSON 响应
pub fn classify_and_parse(
    body: &str,
    hints: &ContentHints<'_>,
    default_cdn: &CdnDescriptor,
) -> ResolveResult<DetailRecord> {
    if looks_like_json(body, hints.content_type) {
        let value: Value = serde_json::from_str(body)?;
        return classify(&value, hints, JSON_FINGERPRINTS);
    }

    let document = MangaDocument::parse(body, default_cdn);
    classify(&document, hints, HTML_FINGERPRINTS)
}

/// 解析章节接口响应
///
/// 接口可能分页并带 `next_page_url`，所以直接按章节列表读取。
pub fn parse_chapter_api(body: &str, hints: &ContentHints<'_>) -> ResolveResult<ListingPage> {
    let value: Value = serde_json::from_str(body)?;
    chapter_listing(&value, hints)
        .ok_or_else(|| ResolveError::parse("章节接口响应中没有 data 数组"))
}

/// 从脚本中的 `cdns = [...]` 数组取第一个可用的 CDN
pub fn find_cdn(body: &str) -> Option<CdnDescriptor> {
    let value = find_literal(body, "cdns")?;
    serde_json::from_value::<Vec<CdnDescriptor>>(value)
        .map_err(|e| log::debug!("Unexpected CDN list shape: {}", e))
        .ok()?
        .into_iter()
        .find(|cdn| !cdn.link.trim().is_empty())
}

/// 系列页上章节接口所需的系列 ID
pub fn series_id(body: &str) -> Option<String> {
    let document = Html::parse_document(body);
    first_attr(
        document.root_element(),
        &["[data-series-id]"],
        &["data-series-id"],
    )
}

/// 只有 slug 时补全为章节路径
fn chapter_path(reference: &str) -> String {
    if reference.contains('/') {
        reference.to_string()
    } else {
        format!("chapter/{}/", reference)
    }
}

fn cdn_normalizer(cdn: &CdnDescriptor) -> Option<UrlNormalizer> {
    let mut url = Url::parse(cdn.link.trim()).ok()?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Some(UrlNormalizer::new(url))
}

/// 字符串或数字字段
fn str_field(entry: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match entry.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// 章节引用可能是字符串，也可能是带 `url` / `slug` 的对象
fn chapter_ref(chapter: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match chapter.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(chapter_path(s.trim())),
        object @ Value::Object(_) => str_field(object, &["url", "slug"]).map(|s| chapter_path(&s)),
        _ => None,
    })
}

fn image_path(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        object @ Value::Object(_) => str_field(object, &["url", "src", "path"]),
        _ => None,
    }
}

// ========== HTML 特征 ==========

fn reading_page(document: &MangaDocument, hints: &ContentHints<'_>) -> Option<DetailRecord> {
    let root = document.html.root_element();
    let script = first_element(root, "script#__NEXT_DATA__")?;
    let payload: Value = serde_json::from_str(&script.text().collect::<String>())
        .map_err(|e| log::debug!("Invalid __NEXT_DATA__ payload: {}", e))
        .ok()?;

    let chapter = PAYLOAD_ROOTS
        .iter()
        .filter_map(|pointer| payload.pointer(pointer))
        .find(|candidate| candidate.get("images").is_some_and(Value::is_array))?;

    let cdn = cdn_normalizer(&document.cdn).unwrap_or_else(|| hints.normalizer.clone());
    let images: Vec<String> = chapter["images"]
        .as_array()?
        .iter()
        .filter_map(image_path)
        .map(|path| {
            if path.starts_with("//") || path.contains("://") {
                hints.normalizer.normalize(&path)
            } else {
                cdn.normalize(path.trim_start_matches('/'))
            }
        })
        .collect();
    if images.is_empty() {
        return None;
    }

    let title = str_field(chapter, &["title", "name"])
        .or_else(|| first_text(root, &["h1", "title"]))
        .unwrap_or_else(|| UNAVAILABLE.to_string());

    let next_ref = chapter_ref(chapter, &["next", "nextChapter", "next_chapter"])
        .or_else(|| first_attr(root, &["a[rel=next]", ".nextprev a.next"], &["href"]))
        .map(|r| hints.normalizer.normalize(&r));
    let prev_ref = chapter_ref(chapter, &["prev", "prevChapter", "prev_chapter"])
        .or_else(|| first_attr(root, &["a[rel=prev]", ".nextprev a.prev"], &["href"]))
        .map(|r| hints.normalizer.normalize(&r));

    Some(DetailRecord::Reading(ReadingPage {
        title,
        images,
        next_ref,
        prev_ref,
    }))
}

fn series_metadata(root: ElementRef<'_>) -> Metadata {
    let mut metadata =
        metadata_from_rows(all_elements(root, INFO_ROWS).into_iter().map(element_text));
    if metadata.genres.is_empty() {
        metadata.genres = all_elements(root, GENRE_LINKS)
            .into_iter()
            .map(element_text)
            .filter(|genre| !genre.is_empty())
            .collect();
    }
    if metadata.rating == UNAVAILABLE {
        if let Some(rating) = first_text(root, RATING) {
            metadata.rating = rating;
        }
    }
    metadata
}

fn listing_page(document: &MangaDocument, hints: &ContentHints<'_>) -> Option<DetailRecord> {
    let root = document.html.root_element();
    if !exists(root, "#chapter-list, table.chapters") {
        return None;
    }

    let items = all_elements(root, "#chapter-list li, table.chapters tr")
        .into_iter()
        .filter_map(|row| {
            let link = first_element(row, "a")?;
            let href = attr_of(link, &["href"])?;
            Some(ListItem {
                title: first_text(row, &[".chapter-link-item", ".chapternum"])
                    .unwrap_or_else(|| element_text(link)),
                url: hints.normalizer.normalize(&href),
                thumbnail: String::new(),
                subtitle: first_text(row, &[".chapter-link-time", ".chapterdate", "td.date"])
                    .unwrap_or_else(|| UNAVAILABLE.to_string()),
            })
        })
        .collect();

    Some(DetailRecord::Listing(ListingPage {
        title: first_text(root, SERIES_TITLE).unwrap_or_else(|| UNAVAILABLE.to_string()),
        items,
        metadata: series_metadata(root),
    }))
}

fn search_page(document: &MangaDocument, hints: &ContentHints<'_>) -> Option<DetailRecord> {
    let root = document.html.root_element();
    if !exists(root, ".bge") {
        return None;
    }

    let items = all_elements(root, ".bge")
        .into_iter()
        .filter_map(|cell| {
            let url = first_attr(cell, &[".bgei a", ".kan a", "a"], &["href"])?;
            let thumbnail = first_attr(cell, &["img"], &["data-src", "src"]).unwrap_or_default();
            Some(ListItem {
                title: first_text(cell, &[".kan h3", "h3", "a"])?,
                url: hints.normalizer.normalize(&url),
                thumbnail: hints.normalizer.normalize(&thumbnail),
                subtitle: first_text(cell, &[".new1 span", ".judul2", ".tpe1_inf"])
                    .unwrap_or_else(|| UNAVAILABLE.to_string()),
            })
        })
        .collect();

    Some(DetailRecord::Search(SearchPage {
        items,
        has_next: exists(root, NEXT_CONTROL),
        page: hints.page,
    }))
}

// ========== JSON 特征 ==========

fn json_item(entry: &Value, hints: &ContentHints<'_>, prefix: &str) -> Option<ListItem> {
    let title = str_field(entry, &["title", "name"])
        .or_else(|| str_field(entry, &["chapter", "number"]).map(|n| format!("Chapter {}", n)))?;
    let url = str_field(entry, &["url", "link"])
        .or_else(|| str_field(entry, &["slug"]).map(|slug| format!("{}/{}/", prefix, slug)))?;
    let thumbnail = str_field(entry, &["thumbnail", "cover", "image"]).unwrap_or_default();

    Some(ListItem {
        title,
        url: hints.normalizer.normalize(&url),
        thumbnail: hints.normalizer.normalize(&thumbnail),
        subtitle: str_field(entry, &["latest_chapter", "created_at", "date"])
            .unwrap_or_else(|| UNAVAILABLE.to_string()),
    })
}

fn search_json(value: &Value, hints: &ContentHints<'_>) -> Option<DetailRecord> {
    let object = value.as_object()?;
    if !object.contains_key("next_page_url") {
        return None;
    }
    let data = object.get("data")?.as_array()?;

    Some(DetailRecord::Search(SearchPage {
        items: data
            .iter()
            .filter_map(|entry| json_item(entry, hints, "komik"))
            .collect(),
        has_next: object
            .get("next_page_url")
            .and_then(Value::as_str)
            .is_some_and(|next| !next.trim().is_empty()),
        page: hints.page,
    }))
}

fn chapter_listing(value: &Value, hints: &ContentHints<'_>) -> Option<ListingPage> {
    let data = value.get("data")?.as_array()?;

    Some(ListingPage {
        title: UNAVAILABLE.to_string(),
        items: data
            .iter()
            .filter_map(|entry| json_item(entry, hints, "chapter"))
            .collect(),
        metadata: Metadata::default(),
    })
}

fn chapters_json(value: &Value, hints: &ContentHints<'_>) -> Option<DetailRecord> {
    chapter_listing(value, hints).map(DetailRecord::Listing)
}
