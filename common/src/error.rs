//! 解析流程的统一错误类型
//!
//! 调用方依据 [`ErrorKind`] 分支处理，不要匹配错误文本。

/// 界面层展示的"不支持"提示
pub const UNSUPPORTED_MESSAGE: &str = "Anime/konten tidak didukung";

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Session,
    Parse,
    UnsupportedSource,
    Canceled,
}

/// 解析流程中可能出现的错误
#[derive(Debug)]
pub enum ResolveError {
    /// 网络传输错误（DNS、连接失败、超时等）
    Network(String),
    /// 非 2xx 响应
    Http { status: u16, message: String },
    /// 会话（cookie + token + sign）获取失败
    Session(String),
    /// 文档不符合任何已知结构
    Parse(String),
    /// 所有候选源均已尝试失败
    UnsupportedSource,
    /// 调用方已取消
    Canceled,
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) | Self::Http { .. } => ErrorKind::Network,
            Self::Session(_) => ErrorKind::Session,
            Self::Parse(_) => ErrorKind::Parse,
            Self::UnsupportedSource => ErrorKind::UnsupportedSource,
            Self::Canceled => ErrorKind::Canceled,
        }
    }

    /// 取消错误不应展示给用户
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// 401/403 视为会话失效
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Http { status: 401 | 403, .. })
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::Session(message.into())
    }

    /// 面向界面层的提示文本
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedSource | Self::Parse(_) => UNSUPPORTED_MESSAGE.to_string(),
            Self::Canceled => String::new(),
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "网络请求失败: {}", msg),
            Self::Http { status, message } => write!(f, "HTTP 错误 {}: {}", status, message),
            Self::Session(msg) => write!(f, "获取会话失败: {}", msg),
            Self::Parse(msg) => write!(f, "解析页面失败: {}", msg),
            Self::UnsupportedSource => write!(f, "没有可用的播放源"),
            Self::Canceled => write!(f, "请求已取消"),
        }
    }
}

impl std::error::Error for ResolveError {}

impl From<reqwest::Error> for ResolveError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => Self::Http {
                status: status.as_u16(),
                message: error.to_string(),
            },
            None => Self::Network(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for ResolveError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(format!("JSON: {}", error))
    }
}

impl From<url::ParseError> for ResolveError {
    fn from(error: url::ParseError) -> Self {
        Self::Parse(format!("URL: {}", error))
    }
}

impl From<anyhow::Error> for ResolveError {
    fn from(error: anyhow::Error) -> Self {
        Self::Parse(error.to_string())
    }
}

pub type ResolveResult<T> = std::result::Result<T, ResolveError>;
