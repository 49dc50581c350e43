//! HTTP 抓取能力
//!
//! 解析逻辑只依赖 [`Fetcher`] trait，生产环境使用基于 reqwest 的 [`ReqwestFetcher`]。

use std::time::Duration;

use crate::error::{ResolveError, ResolveResult};
use crate::signal::AbortSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
}

/// 一次请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self {
            method: Method::Head,
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// 一次响应，头部名称统一为小写
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 第一个同名头部
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 所有同名头部（如多个 `Set-Cookie`）
    pub fn headers_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> &str {
        self.header("content-type").unwrap_or("")
    }

    /// 非 2xx 时转换为错误
    pub fn error_for_status(self) -> ResolveResult<Self> {
        if self.is_success() {
            return Ok(self);
        }

        let message = match self.status {
            401 | 403 => "没有访问权限".to_string(),
            404 => "页面不存在".to_string(),
            status => format!("HTTP 请求失败，状态码: {}", status),
        };
        Err(ResolveError::Http {
            status: self.status,
            message,
        })
    }
}

/// HTTP 抓取能力
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> ResolveResult<FetchResponse>;
}

/// 在取消信号保护下抓取，并检查状态码
pub async fn fetch_checked(
    fetcher: &dyn Fetcher,
    request: FetchRequest,
    signal: &AbortSignal,
) -> ResolveResult<FetchResponse> {
    log::debug!("Fetching {:?} {}", request.method, request.url);
    let response = signal.guard(fetcher.fetch(request)).await?;
    log::trace!("Response {}: {}", response.status, response.body);
    response.error_for_status()
}

/// 基于 reqwest 的实现
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> ResolveResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: FetchRequest) -> ResolveResult<FetchResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Head => self.client.head(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = match request.method {
            Method::Head => String::new(),
            Method::Get => response.text().await?,
        };

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}
