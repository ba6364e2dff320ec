//! Persisted session records and the pure policies over them
//!
//! Retention, recall similarity and ordering suggestions are computed here so
//! every backend applies them identically.

use crate::models::ToolId;
use crate::policy::score_text;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// What the loop hands to session memory when a session finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub query: String,
    pub tools_used: Vec<ToolId>,
    pub final_answer: String,
    pub subject_name: String,
    pub execution_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub record_id: Uuid,
    pub query: String,
    pub tools_used: Vec<ToolId>,
    pub final_answer: String,
    pub subject_name: String,
    pub execution_verified: bool,
    /// Answer quality in [0, 10], scored at persistence time.
    pub quality_score: f32,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn from_summary(summary: SessionSummary) -> Self {
        let quality_score = score_answer(&summary.final_answer, summary.execution_verified);

        Self {
            record_id: Uuid::new_v4(),
            query: summary.query,
            tools_used: summary.tools_used,
            final_answer: summary.final_answer,
            subject_name: summary.subject_name,
            execution_verified: summary.execution_verified,
            quality_score,
            created_at: Utc::now(),
        }
    }

    fn tools_path(&self) -> String {
        self.tools_used
            .iter()
            .map(ToolId::as_str)
            .collect::<Vec<_>>()
            .join(" → ")
    }
}

/// Answers from unverified sessions are capped below verified ones.
pub fn score_answer(answer: &str, execution_verified: bool) -> f32 {
    let score = score_text(answer);
    if execution_verified {
        score
    } else {
        score.min(5.0)
    }
}

/// Ids to drop so that at most `max_sessions` remain: the `keep_best`
/// highest-quality records are always kept, the rest of the room goes to the
/// most recent records.
pub fn records_to_evict(records: &[SessionRecord], max_sessions: usize, keep_best: usize) -> Vec<Uuid> {
    if records.len() <= max_sessions {
        return Vec::new();
    }

    let mut by_quality: Vec<&SessionRecord> = records.iter().collect();
    by_quality.sort_by(|a, b| {
        b.quality_score
            .total_cmp(&a.quality_score)
            .then(b.created_at.cmp(&a.created_at))
    });
    let mut keep: HashSet<Uuid> = by_quality
        .iter()
        .take(keep_best.min(max_sessions))
        .map(|r| r.record_id)
        .collect();

    let mut by_recency: Vec<&SessionRecord> = records.iter().collect();
    by_recency.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    for record in by_recency {
        if keep.len() >= max_sessions {
            break;
        }
        keep.insert(record.record_id);
    }

    records
        .iter()
        .filter(|r| !keep.contains(&r.record_id))
        .map(|r| r.record_id)
        .collect()
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard overlap of query tokens, plus a bonus when the record's subject
/// is named in the query.
pub fn similarity(query: &str, record: &SessionRecord) -> f32 {
    let a = tokens(query);
    let b = tokens(&record.query);

    let union = a.union(&b).count();
    let jaccard = if union == 0 {
        0.0
    } else {
        a.intersection(&b).count() as f32 / union as f32
    };

    let subject_bonus = if !record.subject_name.is_empty()
        && query.to_lowercase().contains(&record.subject_name.to_lowercase())
    {
        0.5
    } else {
        0.0
    };

    jaccard + subject_bonus
}

/// Records most similar to `query`, best first; zero-similarity records are
/// never returned.
pub fn rank_similar(query: &str, records: &[SessionRecord], top_k: usize) -> Vec<SessionRecord> {
    let mut scored: Vec<(f32, &SessionRecord)> = records
        .iter()
        .map(|r| (similarity(query, r), r))
        .filter(|(score, _)| *score > 0.0)
        .collect();

    scored.sort_by(|(sa, ra), (sb, rb)| {
        sb.total_cmp(sa).then(rb.created_at.cmp(&ra.created_at))
    });

    scored
        .into_iter()
        .take(top_k)
        .map(|(_, r)| r.clone())
        .collect()
}

/// Best verified tool ordering for a subject, else the best overall.
pub fn suggest_ordering(subject_name: &str, records: &[SessionRecord]) -> Option<String> {
    let best = |subject: Option<&str>| {
        records
            .iter()
            .filter(|r| r.execution_verified && !r.tools_used.is_empty())
            .filter(|r| subject.map_or(true, |s| r.subject_name == s))
            .max_by(|a, b| a.quality_score.total_cmp(&b.quality_score))
    };

    if let Some(record) = best(Some(subject_name)) {
        return Some(format!(
            "{} best pattern: {} (quality {:.1}/10)",
            subject_name,
            record.tools_path(),
            record.quality_score
        ));
    }

    best(None).map(|record| {
        format!(
            "Overall best pattern: {} (quality {:.1}/10)",
            record.tools_path(),
            record.quality_score
        )
    })
}

/// One line per record, most recent first.
pub fn describe_patterns(records: &[SessionRecord]) -> String {
    if records.is_empty() {
        return "No previous sessions".to_string();
    }

    let mut sorted: Vec<&SessionRecord> = records.iter().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    sorted
        .iter()
        .map(|r| {
            format!(
                "- {} | {} | {} | {}",
                r.subject_name,
                r.tools_path(),
                if r.execution_verified { "verified" } else { "unverified" },
                r.query
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(query: &str, subject: &str, quality: f32, verified: bool, age_minutes: i64) -> SessionRecord {
        SessionRecord {
            record_id: Uuid::new_v4(),
            query: query.to_string(),
            tools_used: ToolId::PRIMARY.to_vec(),
            final_answer: "answer".to_string(),
            subject_name: subject.to_string(),
            execution_verified: verified,
            quality_score: quality,
            created_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    #[test]
    fn test_no_eviction_under_capacity() {
        let records = vec![record("a", "x", 1.0, true, 1), record("b", "x", 2.0, true, 2)];
        assert!(records_to_evict(&records, 5, 2).is_empty());
    }

    #[test]
    fn test_eviction_keeps_best_and_recent() {
        let best_old = record("best", "x", 9.5, true, 100);
        let second_old = record("second", "x", 9.0, true, 90);
        let recent: Vec<SessionRecord> = (0..5)
            .map(|i| record("recent", "x", 3.0, true, i))
            .collect();
        let oldest_recent = recent[4].record_id;
        let second_oldest_recent = recent[3].record_id;

        let mut records = vec![best_old.clone(), second_old.clone()];
        records.extend(recent);

        let evicted = records_to_evict(&records, 5, 2);
        assert_eq!(evicted.len(), 2);
        assert!(!evicted.contains(&best_old.record_id));
        assert!(!evicted.contains(&second_old.record_id));
        assert!(evicted.contains(&oldest_recent));
        assert!(evicted.contains(&second_oldest_recent));
    }

    #[test]
    fn test_rank_similar_filters_unrelated() {
        let records = vec![
            record("삼성전자 주가 전망", "삼성전자", 7.0, true, 1),
            record("weather tomorrow", "", 7.0, true, 2),
        ];
        let ranked = rank_similar("삼성전자 실적 전망", &records, 3);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].query, "삼성전자 주가 전망");
    }

    #[test]
    fn test_suggest_ordering_prefers_subject() {
        let records = vec![
            record("a", "카카오", 9.0, true, 1),
            record("b", "삼성전자", 6.0, true, 2),
            record("c", "삼성전자", 8.0, false, 3),
        ];

        let hint = suggest_ordering("삼성전자", &records).unwrap();
        assert!(hint.starts_with("삼성전자 best pattern:"));
        assert!(hint.contains("discourse-analysis → research-analysis → price-analysis"));
        assert!(hint.contains("6.0/10"));

        let overall = suggest_ordering("NAVER", &records).unwrap();
        assert!(overall.starts_with("Overall best pattern:"));
        assert!(overall.contains("9.0/10"));
    }

    #[test]
    fn test_suggest_ordering_needs_verified_sessions() {
        let records = vec![record("a", "삼성전자", 9.0, false, 1)];
        assert!(suggest_ordering("삼성전자", &records).is_none());
    }

    #[test]
    fn test_unverified_answers_are_capped() {
        let answer = "Overall positive.\n- sentiment 55/100\n- 3 reports\n- neutral price trend over 2 months";
        assert!(score_answer(answer, true) > 5.0);
        assert_eq!(score_answer(answer, false), 5.0);
    }
}
