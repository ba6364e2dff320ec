//! Prompt-leakage flagging
//!
//! Observations that echo internal instructions back are prefixed with a
//! redaction notice. The original text is retained for auditability.

/// Notice prepended to flagged observations.
pub const REDACTION_NOTICE: &str = "[filtered] Possible echo of internal instructions detected.";

/// Default indicator vocabulary (English and Korean).
const LEAKAGE_TERMS: &[&str] = &[
    "prompt",
    "instruction",
    "example",
    "rule",
    "format",
    "output format",
    "프롬프트",
    "지침",
    "예시",
    "규칙",
    "형식",
    "답변 형식",
];

/// Post-processing applied to every raw observation before it is recorded.
pub trait LeakageFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn sanitize(&self, observation: String) -> String;
}

/// Case-insensitive substring match against a fixed vocabulary.
pub struct KeywordLeakageFilter {
    vocabulary: Vec<String>,
}

impl KeywordLeakageFilter {
    pub fn new() -> Self {
        Self::with_vocabulary(LEAKAGE_TERMS.iter().copied())
    }

    pub fn with_vocabulary<'a>(terms: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            vocabulary: terms.into_iter().map(str::to_lowercase).collect(),
        }
    }

    /// First indicator term found in the observation, if any.
    pub fn matched_term(&self, observation: &str) -> Option<&str> {
        let lowered = observation.to_lowercase();
        self.vocabulary
            .iter()
            .find(|term| lowered.contains(term.as_str()))
            .map(String::as_str)
    }
}

impl Default for KeywordLeakageFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl LeakageFilter for KeywordLeakageFilter {
    fn name(&self) -> &'static str {
        "keyword_leakage_filter"
    }

    fn sanitize(&self, observation: String) -> String {
        match self.matched_term(&observation) {
            Some(_) => format!("{}\n\n{}", REDACTION_NOTICE, observation),
            None => observation,
        }
    }
}
