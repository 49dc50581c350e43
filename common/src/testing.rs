//! 测试用的内存版 [`Fetcher`]
//!
//! 按 (方法, URL) 返回预设响应并记录所有请求。URL 先精确匹配，
//! 匹配不到时再忽略查询参数匹配一次。

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ResolveError, ResolveResult};
use crate::fetch::{FetchRequest, FetchResponse, Fetcher, Method};

#[derive(Debug, Clone)]
enum Reply {
    Response(FetchResponse),
    NetworkError(String),
}

/// 内存版 Fetcher
#[derive(Default)]
pub struct StaticFetcher {
    /// 同一路由可以排队多个响应，最后一个会一直重复
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    requests: Mutex<Vec<FetchRequest>>,
    delay: Option<Duration>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次请求前等待一段时间
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn route(&self, method: Method, url: &str, response: FetchResponse) {
        self.insert(method, url, vec![Reply::Response(response)]);
    }

    /// 依次返回多个响应
    pub fn route_sequence(&self, method: Method, url: &str, responses: Vec<FetchResponse>) {
        self.insert(
            method,
            url,
            responses.into_iter().map(Reply::Response).collect(),
        );
    }

    /// 模拟传输层错误
    pub fn route_error(&self, method: Method, url: &str, message: &str) {
        self.insert(method, url, vec![Reply::NetworkError(message.to_string())]);
    }

    fn insert(&self, method: Method, url: &str, replies: Vec<Reply>) {
        let mut routes = self.routes.lock().unwrap();
        routes.insert((method, url.to_string()), replies.into());
    }

    /// 发往某个 URL（忽略查询参数）的请求次数
    pub fn calls(&self, method: Method, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && (r.url == url || strip_query(&r.url) == url))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests_to(&self, url: &str) -> Vec<FetchRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url || strip_query(&r.url) == url)
            .cloned()
            .collect()
    }

    fn next_reply(&self, method: Method, url: &str) -> Option<Reply> {
        let mut routes = self.routes.lock().unwrap();
        let key = (method, url.to_string());
        let fallback = (method, strip_query(url).to_string());

        let queue = if routes.contains_key(&key) {
            routes.get_mut(&key)
        } else {
            routes.get_mut(&fallback)
        }?;

        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, request: FetchRequest) -> ResolveResult<FetchResponse> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_reply(request.method, &request.url) {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::NetworkError(message)) => Err(ResolveError::Network(message)),
            None => Ok(FetchResponse::new(404, "no route")),
        }
    }
}

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

pub fn html(body: &str) -> FetchResponse {
    FetchResponse::new(200, body).with_header("content-type", "text/html; charset=UTF-8")
}

pub fn json(body: &str) -> FetchResponse {
    FetchResponse::new(200, body).with_header("content-type", "application/json")
}

pub fn status(code: u16) -> FetchResponse {
    FetchResponse::new(code, "")
}
