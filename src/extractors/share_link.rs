use regex::Regex;

use crate::PipelineError;

/// Locates a platform share link inside the text users paste from the app.
///
/// Share blobs look like `7.43 复制打开抖音，看看【xx的作品】… https://v.douyin.com/iRNBho6u/ zZm:/`,
/// so only the first substring matching the configured pattern is kept.
#[derive(Debug, Clone)]
pub struct ShareLinkMatcher {
    pattern: Regex,
}

impl ShareLinkMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    /// Return the first embedded share link, exactly as it appears in the input
    pub fn find(&self, input: &str) -> Result<String, PipelineError> {
        self.pattern
            .find(input)
            .map(|m| m.as_str().to_string())
            .ok_or(PipelineError::NoLinkFound)
    }
}
