//! 候选源回退解析
//!
//! 规则（按标签回退）：
//!
//! 1. 优先尝试标签匹配 `preferred` 的第一个候选；没有匹配时取偏好顺序中的第一个候选
//! 2. 一次尝试失败（错误、超时、结果为空）后，移除**所有**带该标签的候选，
//!    继续尝试剩余候选中排在最前面的那个标签；同一标签不会换站点重试。
//!    "最前面"指站点偏好顺序，不按清晰度高低，下一个标签可能比失败的标签更高
//! 3. 候选耗尽时返回 [`ResolveError::UnsupportedSource`]，不会返回空结果
//! 4. 取消信号触发后立即放弃，不再发起下一次尝试

use regex::{Regex, RegexBuilder};

use common::{
    AbortSignal, ResolveError, ResolveResult, ResolvedStream, SourceCandidate, UNKNOWN_RESOLUTION,
    rank_candidates,
};

use crate::page::parse_resolution_label;
use crate::providers::ProviderRegistry;

/// 清晰度匹配模式
///
/// 只含字母、数字和空格的模式按字面比较（`"480"` 与 `"480p"` 等价），
/// 其余按正则表达式完整匹配。两种方式都不区分大小写，正则无效时按字面比较。
#[derive(Debug, Clone)]
pub enum LabelPattern {
    Literal(String),
    Regex(Regex),
}

impl LabelPattern {
    pub fn new(pattern: &str) -> Self {
        let pattern = pattern.trim();
        if pattern.chars().all(|c| c.is_alphanumeric() || c == ' ') {
            return Self::literal(pattern);
        }

        match RegexBuilder::new(&format!("^(?:{})$", pattern))
            .case_insensitive(true)
            .build()
        {
            Ok(regex) => Self::Regex(regex),
            Err(e) => {
                log::debug!("Resolution pattern {:?} is not a valid regex: {}", pattern, e);
                Self::Literal(pattern.to_string())
            }
        }
    }

    fn literal(pattern: &str) -> Self {
        let label = parse_resolution_label(pattern);
        if label == UNKNOWN_RESOLUTION {
            Self::Literal(pattern.to_string())
        } else {
            Self::Literal(label)
        }
    }

    pub fn matches(&self, label: &str) -> bool {
        match self {
            Self::Literal(expected) => expected.eq_ignore_ascii_case(label),
            Self::Regex(regex) => regex.is_match(label),
        }
    }
}

/// 候选源解析器
#[derive(Clone)]
pub struct Resolver {
    registry: ProviderRegistry,
}

impl Resolver {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    pub async fn resolve(
        &self,
        candidates: &[SourceCandidate],
        preferred: Option<&str>,
        signal: &AbortSignal,
    ) -> ResolveResult<ResolvedStream> {
        signal.check()?;

        let mut pool = rank_candidates(candidates.to_vec());
        let valid_resolutions = distinct_labels(&pool);

        let Some(first) = pool.first() else {
            log::debug!("No source candidates to resolve");
            return Err(ResolveError::UnsupportedSource);
        };

        let pattern = preferred.map(LabelPattern::new);
        let mut label = pattern
            .as_ref()
            .and_then(|p| pool.iter().find(|c| p.matches(&c.label)))
            .unwrap_or(first)
            .label
            .clone();

        loop {
            signal.check()?;

            let Some(candidate) = pool.iter().find(|c| c.label == label) else {
                return Err(ResolveError::UnsupportedSource);
            };
            let extractor = self.registry.strategy(candidate.provider_kind);
            log::debug!(
                "Trying {} via {} ({})",
                label,
                extractor.name(),
                candidate.raw_link
            );

            match signal.guard(extractor.extract(candidate, signal)).await {
                Ok(sources) if !sources.is_empty() => {
                    log::debug!("Resolved {} with {} source(s)", label, sources.len());
                    return Ok(ResolvedStream {
                        sources,
                        resolution_used: label,
                        valid_resolutions,
                    });
                }
                Err(ResolveError::Canceled) => return Err(ResolveError::Canceled),
                Ok(_) => log::warn!("Resolution {} produced no streams", label),
                Err(e) => log::warn!("Resolution {} failed: {}", label, e),
            }

            pool.retain(|c| c.label != label);
            match pool.first() {
                Some(next) => {
                    log::debug!("Falling back from {} to {}", label, next.label);
                    label = next.label.clone();
                }
                None => {
                    log::warn!("All source candidates exhausted");
                    return Err(ResolveError::UnsupportedSource);
                }
            }
        }
    }
}

/// 去重后的标签，保持顺序
fn distinct_labels(candidates: &[SourceCandidate]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for candidate in candidates {
        if !labels.contains(&candidate.label) {
            labels.push(candidate.label.clone());
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_pattern() {
        let cases = vec![
            ("480p", "480p", true),
            ("480P", "480p", true),
            ("480", "480p", true),
            ("720p", "480p", false),
            ("(720|1080)p", "1080p", true),
            ("(720|1080)p", "480p", false),
            ("\\d{3}p", "360p", true),
            ("\\d{3}p", "1080p", false),
            ("unknown", "unknown", true),
            ("[480p", "[480p", true),
            ("[480p", "480p", false),
        ];

        for (pattern, label, expected) in cases {
            assert_eq!(
                LabelPattern::new(pattern).matches(label),
                expected,
                "pattern {:?} vs label {:?}",
                pattern,
                label
            );
        }
    }

    #[test]
    fn test_distinct_labels() {
        let candidates = vec![
            SourceCandidate::new("480p", "https://a.example/1"),
            SourceCandidate::new("360p", "https://a.example/2"),
            SourceCandidate::new("480p", "https://a.example/3"),
        ];
        assert_eq!(distinct_labels(&candidates), vec!["480p", "360p"]);
    }
}
