//! 会话管理
//!
//! 部分上游接口需要一组短期凭证：引导请求返回的 cookie，加上令牌接口签发的 token/sign。
//! 凭证只保存在内存中，失效后原地刷新，不保留历史。
//!
//! 状态机：`Unset -> Refreshing -> Valid`，`invalidate()` 回到 `Unset`。
//! 并发调用在 `Refreshing` 期间等待同一次刷新（single-flight），不会重复发起引导请求。
//! 刷新失败时，排队等待的调用者拿到同一个错误，而不是各自再引导一次。

use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use serde::Deserialize;
use url::Url;

use crate::error::{ResolveError, ResolveResult};
use crate::fetch::{FetchRequest, FetchResponse, Fetcher, fetch_checked};
use crate::signal::AbortSignal;

/// 会话相关的两个接口
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEndpoints {
    /// 引导请求（HEAD），用于拿到 `Set-Cookie`
    pub bootstrap_url: String,
    /// 令牌接口，返回 `{token, sign}`
    pub token_url: String,
}

/// 一组会话凭证
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub cookie: String,
    pub token: String,
    pub sign: String,
    pub obtained_at: SystemTime,
}

impl Session {
    /// 为请求附加 cookie 以及 token/sign 查询参数
    pub fn decorate(&self, mut request: FetchRequest) -> FetchRequest {
        if let Ok(mut url) = Url::parse(&request.url) {
            url.query_pairs_mut()
                .append_pair("token", &self.token)
                .append_pair("sign", &self.sign);
            request.url = url.to_string();
        }
        request.header("Cookie", self.cookie.clone())
    }
}

/// 对外可见的会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unset,
    Valid,
    Refreshing,
}

#[derive(Debug)]
enum SessionState {
    Unset,
    Refreshing,
    Valid(Arc<Session>),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    sign: Option<String>,
    #[serde(default)]
    data: Option<TokenData>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    sign: Option<String>,
}

/// 最近一次完成的刷新，被取消的刷新不计入
#[derive(Debug, Default)]
struct RefreshOutcome {
    generation: u64,
    error: Option<String>,
}

/// 会话管理器
pub struct SessionManager {
    fetcher: Arc<dyn Fetcher>,
    endpoints: SessionEndpoints,
    state: Mutex<SessionState>,
    /// 同一时间只允许一次刷新
    refresh_gate: tokio::sync::Mutex<()>,
    outcome: Mutex<RefreshOutcome>,
}

impl SessionManager {
    pub fn new(fetcher: Arc<dyn Fetcher>, endpoints: SessionEndpoints) -> Self {
        Self {
            fetcher,
            endpoints,
            state: Mutex::new(SessionState::Unset),
            refresh_gate: tokio::sync::Mutex::new(()),
            outcome: Mutex::new(RefreshOutcome::default()),
        }
    }

    pub fn endpoints(&self) -> &SessionEndpoints {
        &self.endpoints
    }

    pub fn phase(&self) -> SessionPhase {
        match &*self.lock_state() {
            SessionState::Unset => SessionPhase::Unset,
            SessionState::Refreshing => SessionPhase::Refreshing,
            SessionState::Valid(_) => SessionPhase::Valid,
        }
    }

    /// 获取有效会话，必要时执行引导
    ///
    /// 失败时返回 [`ResolveError::Session`]，不会在内部重试。
    pub async fn ensure_session(&self, signal: &AbortSignal) -> ResolveResult<Arc<Session>> {
        signal.check()?;
        let observed = self.lock_outcome().generation;
        if let Some(session) = self.cached() {
            log::debug!("Using cached session");
            return Ok(session);
        }

        let _gate = tokio::select! {
            biased;
            _ = signal.aborted() => return Err(ResolveError::Canceled),
            gate = self.refresh_gate.lock() => gate,
        };

        // 等待期间其他调用者可能已经完成刷新
        if let Some(session) = self.cached() {
            log::debug!("Session refreshed by a concurrent caller");
            return Ok(session);
        }
        {
            let outcome = self.lock_outcome();
            if outcome.generation != observed {
                if let Some(message) = &outcome.error {
                    log::debug!("Concurrent session refresh failed: {}", message);
                    return Err(ResolveError::Session(message.clone()));
                }
            }
        }

        *self.lock_state() = SessionState::Refreshing;
        let reset = ResetOnDrop { state: &self.state };

        log::debug!("Bootstrapping session from {}", self.endpoints.bootstrap_url);
        let session = match signal.guard(self.bootstrap()).await {
            Ok(session) => Arc::new(session),
            Err(ResolveError::Canceled) => return Err(ResolveError::Canceled),
            Err(e) => {
                let message = match e {
                    ResolveError::Session(message) => message,
                    other => other.to_string(),
                };
                self.record_outcome(Some(message.clone()));
                return Err(ResolveError::Session(message));
            }
        };

        *self.lock_state() = SessionState::Valid(Arc::clone(&session));
        drop(reset);
        self.record_outcome(None);
        log::debug!("Session bootstrap successful");
        Ok(session)
    }

    /// 标记会话失效，下次调用 `ensure_session` 时重新引导
    pub fn invalidate(&self) {
        let mut state = self.lock_state();
        if matches!(*state, SessionState::Valid(_)) {
            log::debug!("Session invalidated");
            *state = SessionState::Unset;
        }
    }

    /// 仅当当前会话就是 `stale` 时才标记失效
    ///
    /// 多个请求用同一个旧会话被拒绝时，只有第一个会清除它，
    /// 其余调用不会把别人刚刷新好的会话再清掉。
    pub fn invalidate_if(&self, stale: &Arc<Session>) {
        let mut state = self.lock_state();
        if matches!(&*state, SessionState::Valid(current) if Arc::ptr_eq(current, stale)) {
            log::debug!("Session invalidated");
            *state = SessionState::Unset;
        }
    }

    /// 带会话凭证发起请求
    ///
    /// 返回 401/403 时清除会话并重试一次。
    pub async fn fetch_authenticated(
        &self,
        request: FetchRequest,
        signal: &AbortSignal,
    ) -> ResolveResult<FetchResponse> {
        let session = self.ensure_session(signal).await?;
        let first = fetch_checked(
            self.fetcher.as_ref(),
            session.decorate(request.clone()),
            signal,
        )
        .await;

        match first {
            Err(e) if e.is_auth_failure() => {
                log::warn!(
                    "Authenticated request to {} rejected, clearing session and retrying: {}",
                    request.url,
                    e
                );
                self.invalidate_if(&session);

                let session = self.ensure_session(signal).await?;
                fetch_checked(self.fetcher.as_ref(), session.decorate(request), signal)
                    .await
                    .map_err(|e| {
                        if e.is_auth_failure() {
                            ResolveError::Session(e.to_string())
                        } else {
                            e
                        }
                    })
            }
            other => other,
        }
    }

    fn cached(&self) -> Option<Arc<Session>> {
        match &*self.lock_state() {
            SessionState::Valid(session) => Some(Arc::clone(session)),
            _ => None,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_outcome(&self) -> std::sync::MutexGuard<'_, RefreshOutcome> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_outcome(&self, error: Option<String>) {
        let mut outcome = self.lock_outcome();
        outcome.generation += 1;
        outcome.error = error;
    }

    async fn bootstrap(&self) -> ResolveResult<Session> {
        let head = self
            .fetcher
            .fetch(FetchRequest::head(&self.endpoints.bootstrap_url))
            .await?
            .error_for_status()?;

        let cookie = join_set_cookies(&head);
        if cookie.is_empty() {
            return Err(ResolveError::session("引导请求没有返回 cookie"));
        }

        let response = self
            .fetcher
            .fetch(
                FetchRequest::get(&self.endpoints.token_url)
                    .header("Cookie", cookie.clone())
                    .header("X-Requested-With", "XMLHttpRequest"),
            )
            .await?
            .error_for_status()?;

        let (token, sign) = parse_token_response(&response.body)?;

        Ok(Session {
            cookie,
            token,
            sign,
            obtained_at: SystemTime::now(),
        })
    }
}

/// 刷新中途被放弃时把状态恢复为 `Unset`
struct ResetOnDrop<'a> {
    state: &'a Mutex<SessionState>,
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, SessionState::Refreshing) {
            *state = SessionState::Unset;
        }
    }
}

/// 把所有 `Set-Cookie` 的 `name=value` 部分拼成一个 Cookie 头
pub fn join_set_cookies(response: &FetchResponse) -> String {
    response
        .headers_all("set-cookie")
        .filter_map(|raw| raw.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .collect::<Vec<_>>()
        .join("; ")
}

/// 解析令牌接口响应，token 与 sign 可能在顶层或 `data` 中
fn parse_token_response(body: &str) -> ResolveResult<(String, String)> {
    let response: TokenResponse = serde_json::from_str(body)
        .map_err(|e| ResolveError::session(format!("令牌响应无法解析: {}", e)))?;

    let (token, sign) = match response.data {
        Some(data) => (
            response.token.or(data.token),
            response.sign.or(data.sign),
        ),
        None => (response.token, response.sign),
    };

    match (token, sign) {
        (Some(token), Some(sign)) if !token.trim().is_empty() && !sign.trim().is_empty() => {
            Ok((token.trim().to_string(), sign.trim().to_string()))
        }
        _ => Err(ResolveError::session("令牌响应中缺少 token 或 sign")),
    }
}
