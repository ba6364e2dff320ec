//! Subject resolution
//!
//! Maps a free-form query to the company it is about, using a static
//! catalog of display names, aliases and listing codes.

use crate::models::Subject;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

struct CatalogEntry {
    name: &'static str,
    code: &'static str,
    aliases: &'static [&'static str],
}

/// First match wins, so longer names precede their prefixes.
const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        name: "삼성전자",
        code: "005930",
        aliases: &["samsung electronics", "samsung"],
    },
    CatalogEntry {
        name: "SK하이닉스",
        code: "000660",
        aliases: &["sk hynix", "hynix"],
    },
    CatalogEntry {
        name: "LG에너지솔루션",
        code: "373220",
        aliases: &["lg energy solution"],
    },
    CatalogEntry {
        name: "LG전자",
        code: "066570",
        aliases: &["lg electronics"],
    },
    CatalogEntry {
        name: "현대차",
        code: "005380",
        aliases: &["현대자동차", "hyundai motor", "hyundai"],
    },
    CatalogEntry {
        name: "기아",
        code: "000270",
        aliases: &["kia"],
    },
    CatalogEntry {
        name: "NAVER",
        code: "035420",
        aliases: &["네이버", "naver"],
    },
    CatalogEntry {
        name: "카카오",
        code: "035720",
        aliases: &["kakao"],
    },
    CatalogEntry {
        name: "셀트리온",
        code: "068270",
        aliases: &["celltrion"],
    },
    CatalogEntry {
        name: "POSCO홀딩스",
        code: "005490",
        aliases: &["포스코", "posco"],
    },
];

const DEFAULT_SUBJECT: usize = 0;

/// ASCII terms must stand alone ("kia" never matches inside "nokia");
/// Hangul terms match as substrings so attached particles still resolve.
enum TermMatcher {
    Word(Regex),
    Substring(String),
}

impl TermMatcher {
    fn new(term: &str) -> Self {
        let lowered = term.to_lowercase();
        if lowered.is_ascii() {
            let pattern = format!(
                r"(?:^|[^a-z0-9]){}(?:[^a-z0-9]|$)",
                regex::escape(&lowered)
            );
            if let Ok(re) = Regex::new(&pattern) {
                return TermMatcher::Word(re);
            }
        }
        TermMatcher::Substring(lowered)
    }

    fn matches(&self, lowered_query: &str) -> bool {
        match self {
            TermMatcher::Word(re) => re.is_match(lowered_query),
            TermMatcher::Substring(term) => lowered_query.contains(term.as_str()),
        }
    }
}

lazy_static! {
    /// Name and alias matchers, index-aligned with `CATALOG`.
    static ref MATCHERS: Vec<Vec<TermMatcher>> = CATALOG
        .iter()
        .map(|entry| {
            std::iter::once(entry.name)
                .chain(entry.aliases.iter().copied())
                .map(TermMatcher::new)
                .collect()
        })
        .collect();
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SubjectCatalog;

impl SubjectCatalog {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the subject of a query; falls back to the default subject
    /// when no name or alias appears in it.
    pub fn resolve(&self, query: &str) -> Subject {
        let lowered = query.to_lowercase();

        let found = CATALOG
            .iter()
            .zip(MATCHERS.iter())
            .find(|(_, matchers)| matchers.iter().any(|m| m.matches(&lowered)))
            .map(|(entry, _)| entry);

        match found {
            Some(entry) => Subject {
                name: entry.name.to_string(),
                code: entry.code.to_string(),
                defaulted: false,
            },
            None => {
                let entry = &CATALOG[DEFAULT_SUBJECT];
                warn!(
                    default = entry.name,
                    available = %self.names().join(", "),
                    "No known company in query, using default subject"
                );
                Subject {
                    name: entry.name.to_string(),
                    code: entry.code.to_string(),
                    defaulted: true,
                }
            }
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        CATALOG.iter().map(|e| e.name).collect()
    }

    pub fn subjects(&self) -> Vec<Subject> {
        CATALOG
            .iter()
            .map(|e| Subject {
                name: e.name.to_string(),
                code: e.code.to_string(),
                defaulted: false,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_korean_name() {
        let subject = SubjectCatalog::new().resolve("SK하이닉스 주가 전망 알려줘");
        assert_eq!(subject.code, "000660");
        assert!(!subject.defaulted);
    }

    #[test]
    fn test_resolves_alias_case_insensitively() {
        let subject = SubjectCatalog::new().resolve("How is KAKAO doing lately?");
        assert_eq!(subject.name, "카카오");
    }

    #[test]
    fn test_longer_name_wins_over_prefix() {
        let subject = SubjectCatalog::new().resolve("LG에너지솔루션 분석");
        assert_eq!(subject.code, "373220");
    }

    #[test]
    fn test_unknown_query_uses_default() {
        let subject = SubjectCatalog::new().resolve("what about the market?");
        assert_eq!(subject.name, "삼성전자");
        assert_eq!(subject.code, "005930");
        assert!(subject.defaulted);
    }

    #[test]
    fn test_ascii_alias_needs_word_boundary() {
        let catalog = SubjectCatalog::new();

        let subject = catalog.resolve("What is the outlook for Nokia?");
        assert!(subject.defaulted);
        assert_eq!(subject.code, "005930");

        assert_eq!(catalog.resolve("Is Kia a buy?").code, "000270");
        assert_eq!(catalog.resolve("kia, hyundai").code, "005380");
        assert_eq!(catalog.resolve("samsung전자 실적").code, "005930");
        assert!(!catalog.resolve("samsung전자 실적").defaulted);
    }
}
