//! 环境变量配置
//!
//! 每个内容源读取自己的站点地址，其余设置共用。
//!
//! | 变量 | 默认值 |
//! | --- | --- |
//! | `SCRAPER_USER_AGENT` | [`GENERAL_UA`](crate::GENERAL_UA) |
//! | `SCRAPER_TIMEOUT_SECS` | 20 |

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::ResolveResult;
use crate::fetch::{Fetcher, ReqwestFetcher};
use crate::get_env_var;
use crate::normalize::UrlNormalizer;

pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// 单个内容源的配置
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub base_url: Url,
    pub user_agent: String,
    pub timeout: Duration,
}

impl SourceConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            user_agent: crate::GENERAL_UA.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// 从环境变量读取，站点地址变量名由调用方指定
    pub fn from_env(base_var: &str, default_base: &str) -> ResolveResult<Self> {
        let base_url = env_url(base_var, default_base)?;

        let user_agent =
            get_env_var("SCRAPER_USER_AGENT").unwrap_or_else(|| crate::GENERAL_UA.to_string());

        let timeout_secs = get_env_var("SCRAPER_TIMEOUT_SECS")
            .and_then(|v| match v.parse::<u64>() {
                Ok(secs) if secs > 0 => Some(secs),
                _ => {
                    log::warn!("Ignoring invalid SCRAPER_TIMEOUT_SECS: {}", v);
                    None
                }
            })
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            base_url,
            user_agent,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn normalizer(&self) -> UrlNormalizer {
        UrlNormalizer::new(self.base_url.clone())
    }

    /// 创建基于 reqwest 的 Fetcher
    pub fn build_fetcher(&self) -> ResolveResult<Arc<dyn Fetcher>> {
        let fetcher = ReqwestFetcher::new(&self.user_agent, self.timeout)?;
        Ok(Arc::new(fetcher))
    }
}

/// 读取 URL 类型的环境变量，无效时回退到默认值
pub fn env_url(name: &str, default: &str) -> ResolveResult<Url> {
    if let Some(value) = get_env_var(name) {
        match Url::parse(&value) {
            Ok(url) => return Ok(ensure_trailing_slash(url)),
            Err(e) => log::warn!("Invalid {} ({}): {}, using default", name, value, e),
        }
    }
    Ok(ensure_trailing_slash(Url::parse(default)?))
}

/// 站点地址以 `/` 结尾，`join` 时才不会丢掉最后一段路径
fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
