//! 共用工具函数库
//!
//! 这个模块包含了整个workspace中可能用到的通用类型与工具函数：
//!
//! - [`models`] - 解析结果的数据结构与 [`ContentSource`] trait
//! - [`error`] - 统一的错误类型
//! - [`fetch`] - HTTP 抓取能力
//! - [`document`] - 文档分类与字段提取工具
//! - [`session`] - 会话（cookie + token + sign）管理
//! - [`normalize`] - URL 补全与衍生图片地址
//! - [`literal`] - 脚本字面量解析器
//! - [`pagination`] - 翻页计算
//! - [`signal`] - 取消信号
pub mod config;
pub mod document;
pub mod error;
pub mod fetch;
pub mod literal;
pub mod models;
pub mod normalize;
pub mod pagination;
pub mod session;
pub mod signal;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::SourceConfig;
pub use document::ContentHints;
pub use error::{ErrorKind, ResolveError, ResolveResult, UNSUPPORTED_MESSAGE};
pub use fetch::{FetchRequest, FetchResponse, Fetcher, Method, ReqwestFetcher, fetch_checked};
pub use models::*;
pub use normalize::{UrlNormalizer, build_asset_url};
pub use pagination::next_page;
pub use session::{Session, SessionEndpoints, SessionManager, SessionPhase};
pub use signal::{AbortController, AbortSignal};

pub const GENERAL_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// 获取环境变量的值
pub fn get_env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// 把多个空白字符压缩为一个空格
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
