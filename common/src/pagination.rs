use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::ResolveResult;

static PAGE_SUFFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:/page/\d+)?/*$").expect("Invalid page suffix regex"));

/// 根据"下一页"控件是否存在计算下一页页码
///
/// 页码由调用方维护，这里只做投影。
pub fn next_page(current: u32, has_next: bool) -> Option<u32> {
    if has_next {
        current.checked_add(1)
    } else {
        None
    }
}

/// 调用方未指定页码时视为第一页
pub fn current_page(page: Option<u32>) -> u32 {
    page.filter(|&p| p > 0).unwrap_or(1)
}

/// 在列表地址后追加 `/page/N/`，已有页码时替换，查询参数保持不变
pub fn paged_url(url: &str, page: u32) -> ResolveResult<String> {
    let mut parsed = Url::parse(url)?;
    let base = PAGE_SUFFIX_REGEX.replace(parsed.path(), "").into_owned();
    parsed.set_path(&format!("{}/page/{}/", base, page));
    Ok(parsed.to_string())
}
