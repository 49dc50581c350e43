use anyhow::Result;
use regex::RegexSet;

use common::ContentSource;
use processor_anime::AnimeSource;
use processor_manga::MangaSource;

/// 所有内容源，按链接路由
pub struct Sources {
    sources: Vec<Box<dyn ContentSource>>,
    regex_set: RegexSet,
}

impl Sources {
    pub fn new(sources: Vec<Box<dyn ContentSource>>) -> Result<Self> {
        let patterns: Vec<&str> = sources.iter().map(|s| s.pattern()).collect();
        let regex_set = RegexSet::new(&patterns)?;
        Ok(Self { sources, regex_set })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(vec![
            Box::new(AnimeSource::from_env()?),
            Box::new(MangaSource::from_env()?),
        ])
    }

    /// 第一个匹配链接的内容源
    pub fn route(&self, url: &str) -> Option<&dyn ContentSource> {
        let index = self.regex_set.matches(url).into_iter().next()?;
        Some(self.sources[index].as_ref())
    }

    pub fn by_name(&self, name: &str) -> Option<&dyn ContentSource> {
        self.sources
            .iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
            .map(|s| &**s)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}
