//! URL 补全与衍生图片地址

use url::Url;

/// 图片服务允许的宽度
pub const ALLOWED_WIDTHS: [u32; 8] = [16, 32, 48, 64, 96, 128, 256, 384];

/// 把站内相对路径补全为绝对地址
#[derive(Debug, Clone)]
pub struct UrlNormalizer {
    base: Url,
}

impl UrlNormalizer {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    pub fn parse(base: &str) -> Result<Self, url::ParseError> {
        Url::parse(base).map(Self::new)
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// 站点源（`https://host`），不带结尾斜杠
    pub fn origin(&self) -> String {
        self.base.origin().ascii_serialization()
    }

    /// 补全路径
    ///
    /// 空字符串原样返回（表示"没有资源"），已是绝对地址的原样返回。
    pub fn normalize(&self, path: &str) -> String {
        let path = path.trim();
        if path.is_empty() || has_scheme(path) {
            return path.to_string();
        }
        if let Some(rest) = path.strip_prefix("//") {
            return format!("https://{}", rest);
        }

        match self.base.join(path) {
            Ok(joined) => joined.to_string(),
            Err(e) => {
                log::debug!("Failed to join {} onto {}: {}", path, self.base, e);
                path.to_string()
            }
        }
    }

    /// 生成缩放/压缩后的图片地址
    pub fn derived_asset_url(&self, path: &str, width: u32, quality: u8) -> String {
        build_asset_url(&self.origin(), path, width, quality)
    }
}

/// 是否带有 URL scheme（如 `https:`、`data:`）
fn has_scheme(path: &str) -> bool {
    let Some(colon) = path.find(':') else {
        return false;
    };
    let scheme = &path[..colon];
    !scheme.is_empty()
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// 取不小于请求值的最小允许宽度，超出范围时取最大值
pub fn snap_width(width: u32) -> u32 {
    ALLOWED_WIDTHS
        .iter()
        .copied()
        .find(|&w| w >= width)
        .unwrap_or(ALLOWED_WIDTHS[ALLOWED_WIDTHS.len() - 1])
}

/// 构造 `/_next/image` 形式的图片地址
pub fn build_asset_url(origin: &str, path: &str, width: u32, quality: u8) -> String {
    if path.is_empty() {
        return String::new();
    }

    let encoded: String = url::form_urlencoded::byte_serialize(path.as_bytes()).collect();
    format!(
        "{}/_next/image?url={}&w={}&q={}",
        origin.trim_end_matches('/'),
        encoded,
        snap_width(width),
        quality.clamp(1, 100)
    )
}
