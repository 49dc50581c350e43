//! 文档分类与字段提取工具
//!
//! 上游页面没有显式的类型字段，只能按结构特征判断页面类型。
//! 每个内容源维护一张有序的特征表，按固定顺序逐个尝试，第一个命中的特征
//! 直接产出完整的 [`DetailRecord`]。

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::collapse_whitespace;
use crate::error::{ResolveError, ResolveResult};
use crate::models::{DetailRecord, Metadata};
use crate::normalize::UrlNormalizer;

/// 解析时的上下文信息
#[derive(Debug, Clone, Copy)]
pub struct ContentHints<'a> {
    /// 响应的 `Content-Type`
    pub content_type: &'a str,
    /// 调用方传入的当前页码
    pub page: u32,
    pub normalizer: &'a UrlNormalizer,
}

impl<'a> ContentHints<'a> {
    pub fn new(normalizer: &'a UrlNormalizer) -> Self {
        Self {
            content_type: "",
            page: 1,
            normalizer,
        }
    }

    pub fn content_type(mut self, content_type: &'a str) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }
}

/// 结构特征：不匹配返回 `None`，匹配则返回完整的记录
pub type Fingerprint<D> = fn(&D, &ContentHints<'_>) -> Option<DetailRecord>;

/// 按顺序尝试特征表
pub fn classify<D>(
    document: &D,
    hints: &ContentHints<'_>,
    fingerprints: &[(&'static str, Fingerprint<D>)],
) -> ResolveResult<DetailRecord> {
    for (name, fingerprint) in fingerprints {
        if let Some(record) = fingerprint(document, hints) {
            log::debug!("Document matched fingerprint: {}", name);
            return Ok(record);
        }
    }
    Err(ResolveError::parse("页面结构无法识别"))
}

/// 响应内容是否为 JSON
pub fn looks_like_json(body: &str, content_type: &str) -> bool {
    content_type.contains("json") || body.trim_start().starts_with(['{', '['])
}

/// 解析 CSS 选择器，失败时记录日志
pub fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css)
        .map_err(|e| log::warn!("Invalid selector {:?}: {}", css, e))
        .ok()
}

/// 是否存在匹配任一选择器的元素
pub fn exists(scope: ElementRef<'_>, css: &str) -> bool {
    selector(css).is_some_and(|s| scope.select(&s).next().is_some())
}

/// 元素的全部文本，空白已压缩
pub fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// 按顺序尝试选择器，返回第一个非空文本
pub fn first_text(scope: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|css| {
        let s = selector(css)?;
        scope
            .select(&s)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

/// 按顺序尝试选择器与属性，返回第一个非空属性值
pub fn first_attr(scope: ElementRef<'_>, selectors: &[&str], attrs: &[&str]) -> Option<String> {
    selectors.iter().find_map(|css| {
        let s = selector(css)?;
        scope.select(&s).find_map(|el| attr_of(el, attrs))
    })
}

/// 按顺序读取元素属性，返回第一个非空值
pub fn attr_of(element: ElementRef<'_>, attrs: &[&str]) -> Option<String> {
    attrs
        .iter()
        .filter_map(|name| element.value().attr(name))
        .map(str::trim)
        .find(|v| !v.is_empty() && *v != "#")
        .map(str::to_string)
}

/// 第一个匹配选择器的元素
pub fn first_element<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let s = selector(css)?;
    scope.select(&s).next()
}

/// 所有匹配选择器的元素
pub fn all_elements<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(s) => scope.select(&s).collect(),
        None => Vec::new(),
    }
}

static YEAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("Invalid year regex"));

/// 元数据键的别名，按字段归类
const METADATA_KEYS: &[(&str, MetaField)] = &[
    ("genre", MetaField::Genres),
    ("genres", MetaField::Genres),
    ("genre(s)", MetaField::Genres),
    ("status", MetaField::Status),
    ("skor", MetaField::Rating),
    ("score", MetaField::Rating),
    ("rating", MetaField::Rating),
    ("rilis", MetaField::Release),
    ("tanggal rilis", MetaField::Release),
    ("released", MetaField::Release),
    ("release", MetaField::Release),
    ("tahun", MetaField::Release),
    ("year", MetaField::Release),
];

#[derive(Debug, Clone, Copy)]
enum MetaField {
    Genres,
    Status,
    Rating,
    Release,
}

/// 从 `键: 值` 形式的信息行中提取元数据
///
/// 无法识别的行被忽略，缺失字段保持占位值。
pub fn metadata_from_rows<I>(rows: I) -> Metadata
where
    I: IntoIterator<Item = String>,
{
    let mut meta = Metadata::default();

    for row in rows {
        let Some((key, value)) = row.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        let Some((_, field)) = METADATA_KEYS.iter().find(|(k, _)| *k == key) else {
            continue;
        };

        match field {
            MetaField::Genres => {
                meta.genres = value
                    .split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            MetaField::Status => meta.status = value.to_string(),
            MetaField::Rating => meta.rating = value.to_string(),
            MetaField::Release => {
                meta.release_year = YEAR_REGEX
                    .find(value)
                    .map_or_else(|| value.to_string(), |m| m.as_str().to_string());
            }
        }
    }

    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SearchPage, UNAVAILABLE};
    use scraper::Html;

    #[test]
    fn test_metadata_from_rows() {
        let rows = vec![
            "Judul: One Piece".to_string(),
            "Skor: 8.72".to_string(),
            "Status: Ongoing".to_string(),
            "Tanggal Rilis: Oct 20, 1999".to_string(),
            "Genre: Action, Adventure, , Fantasy".to_string(),
        ];
        let meta = metadata_from_rows(rows);
        assert_eq!(meta.genres, vec!["Action", "Adventure", "Fantasy"]);
        assert_eq!(meta.status, "Ongoing");
        assert_eq!(meta.rating, "8.72");
        assert_eq!(meta.release_year, "1999");
    }

    #[test]
    fn test_metadata_missing_fields_stay_sentinel() {
        let meta = metadata_from_rows(vec!["Status:".to_string(), "garbage".to_string()]);
        assert_eq!(meta.status, UNAVAILABLE);
        assert_eq!(meta.rating, UNAVAILABLE);
    }

    #[test]
    fn test_first_text_fallback_order() {
        let html = Html::parse_document(
            r#"<html><head><title>Fallback</title></head><body><h1 class="a">  </h1><div class="b">  Second   choice </div></body></html>"#,
        );
        let root = html.root_element();
        assert_eq!(
            first_text(root, &["h1.a", "div.b", "title"]),
            Some("Second choice".to_string())
        );
        assert_eq!(first_text(root, &["h2", "title"]), Some("Fallback".to_string()));
        assert_eq!(first_text(root, &["h2"]), None);
    }

    #[test]
    fn test_first_attr_skips_placeholders() {
        let html = Html::parse_document(
            r##"<a class="x" href="#">no</a><img data-src="" src="/cover.jpg">"##,
        );
        let root = html.root_element();
        assert_eq!(first_attr(root, &["a.x"], &["href"]), None);
        assert_eq!(
            first_attr(root, &["img"], &["data-src", "src"]),
            Some("/cover.jpg".to_string())
        );
    }

    fn never(_: &Html, _: &ContentHints<'_>) -> Option<DetailRecord> {
        None
    }

    fn always(_: &Html, hints: &ContentHints<'_>) -> Option<DetailRecord> {
        Some(DetailRecord::Search(SearchPage {
            items: Vec::new(),
            has_next: false,
            page: hints.page,
        }))
    }

    #[test]
    fn test_classify_order() {
        let normalizer = UrlNormalizer::parse("https://example.org/").unwrap();
        let hints = ContentHints::new(&normalizer).page(4);
        let html = Html::parse_document("<p></p>");

        let table: &[(&str, Fingerprint<Html>)] = &[("never", never), ("always", always)];
        let record = classify(&html, &hints, table).unwrap();
        assert!(matches!(record, DetailRecord::Search(SearchPage { page: 4, .. })));

        let err = classify(&html, &hints, &table[..1]).unwrap_err();
        assert!(matches!(err, ResolveError::Parse(_)));
    }

    #[test]
    fn test_looks_like_json() {
        assert!(looks_like_json("  {\"a\":1}", ""));
        assert!(looks_like_json("", "application/json; charset=utf-8"));
        assert!(!looks_like_json("<html>", "text/html"));
    }
}
