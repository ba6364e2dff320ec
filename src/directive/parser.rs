//! Directive parsing
//!
//! Turns free-form generator output into a typed [`Decision`]. Nothing the
//! generator writes reaches the loop except through this grammar:
//!
//! ```text
//! Action: <tool id>
//! Action Input: <argument>
//! ...
//! Final Answer: <payload>
//! ```
//!
//! Markdown emphasis around the keywords is tolerated. Keywords only count
//! at the start of a line.

use crate::ledger::REQUIRED_PRIMARY_TOOLS;
use crate::models::ToolId;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref ACTION_LINE: Regex =
        Regex::new(r"(?i)^\s*\**\s*action\s*\**\s*:\s*\**\s*(.*?)\s*\**\s*$").unwrap();
    static ref ACTION_INPUT_LINE: Regex =
        Regex::new(r"(?i)^\s*\**\s*action\s+input\s*\**\s*:\s*\**\s*(.*?)\s*\**\s*$").unwrap();
    static ref TERMINAL_MARKER: Regex =
        Regex::new(r"(?im)^\s*\**\s*final\s+answer\s*\**\s*:\s*\**").unwrap();
}

/// What the raw text contains, before session invariants are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDirective {
    /// First well-formed `Action:` / `Action Input:` pair.
    pub action: Option<(String, String)>,
    /// Text after the first terminal marker, trimmed. `None` when absent or empty.
    pub terminal: Option<String>,
    /// Text preceding the terminal marker (the whole text when absent).
    pub preamble: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Action { tool: ToolId, argument: String },
    /// Well-formed action naming a tool outside the closed set.
    UnrecognizedAction { name: String },
    /// Terminal answer with the completion predicate satisfied.
    Terminal { payload: String },
    /// Terminal answer before every primary tool ran; rewritten into a
    /// continuation directive and never surfaced to the caller.
    PrematureTerminal { completed: usize, continuation: String },
    Unparseable,
}

impl Decision {
    /// Short label for traces and logs.
    pub fn label(&self) -> String {
        match self {
            Decision::Action { tool, .. } => format!("action {}", tool),
            Decision::UnrecognizedAction { name } => format!("unrecognized action '{}'", name),
            Decision::Terminal { .. } => "terminal".to_string(),
            Decision::PrematureTerminal { completed, .. } => {
                format!("premature terminal ({}/{})", completed, REQUIRED_PRIMARY_TOOLS)
            }
            Decision::Unparseable => "unparseable".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectiveParser;

impl DirectiveParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, raw: &str) -> ParsedDirective {
        let (preamble, terminal) = match TERMINAL_MARKER.find(raw) {
            Some(m) => {
                let payload = raw[m.end()..].trim();
                (
                    raw[..m.start()].to_string(),
                    (!payload.is_empty()).then(|| payload.to_string()),
                )
            }
            None => (raw.to_string(), None),
        };

        let mut pending: Option<String> = None;
        let mut action = None;

        for line in raw.lines() {
            if let Some(caps) = ACTION_INPUT_LINE.captures(line) {
                if let Some(name) = pending.take() {
                    action = Some((name, caps[1].trim().to_string()));
                    break;
                }
            } else if let Some(caps) = ACTION_LINE.captures(line) {
                pending = Some(caps[1].trim().to_string());
            }
        }

        ParsedDirective {
            action,
            terminal,
            preamble,
        }
    }

    /// Parse `raw` and apply the completion predicate.
    ///
    /// A terminal marker takes precedence over an action in the same reply.
    pub fn decide(&self, raw: &str, completed_primary: usize) -> Decision {
        let parsed = self.parse(raw);

        if let Some(payload) = parsed.terminal {
            if completed_primary >= REQUIRED_PRIMARY_TOOLS {
                return Decision::Terminal { payload };
            }
            return Decision::PrematureTerminal {
                completed: completed_primary,
                continuation: continuation_directive(&parsed.preamble, completed_primary),
            };
        }

        match parsed.action {
            Some((name, argument)) => match name.parse::<ToolId>() {
                Ok(tool) => Decision::Action { tool, argument },
                Err(name) => Decision::UnrecognizedAction { name },
            },
            None => Decision::Unparseable,
        }
    }
}

/// Strip the terminal segment and append a thought forcing another tool call.
fn continuation_directive(preamble: &str, completed_primary: usize) -> String {
    let kept = preamble.trim();
    let thought = format!(
        "Thought: Only {}/{} primary tools have been executed. The next tool must run before answering.",
        completed_primary, REQUIRED_PRIMARY_TOOLS
    );

    if kept.is_empty() {
        thought
    } else {
        format!("{}\n{}", kept, thought)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_pair_is_parsed() {
        let parser = DirectiveParser::new();
        let raw = "Thought: start with sentiment\nAction: discourse-analysis\nAction Input: 삼성전자 여론";

        assert_eq!(
            parser.decide(raw, 0),
            Decision::Action {
                tool: ToolId::DiscourseAnalysis,
                argument: "삼성전자 여론".to_string(),
            }
        );
    }

    #[test]
    fn test_markdown_emphasis_and_legacy_names() {
        let parser = DirectiveParser::new();
        let raw = "**Action:** ResearchRAGTool\n**Action Input:** analyst view";

        assert_eq!(
            parser.decide(raw, 1),
            Decision::Action {
                tool: ToolId::ResearchAnalysis,
                argument: "analyst view".to_string(),
            }
        );
    }

    #[test]
    fn test_action_without_input_is_unparseable() {
        let parser = DirectiveParser::new();
        assert_eq!(parser.decide("Action: price-analysis", 0), Decision::Unparseable);
        assert_eq!(parser.decide("I am not sure what to do.", 0), Decision::Unparseable);
    }

    #[test]
    fn test_first_well_formed_pair_wins() {
        let parser = DirectiveParser::new();
        let raw = "Action: discourse-analysis\nAction: price-analysis\nAction Input: q1\nAction: research-analysis\nAction Input: q2";

        let parsed = parser.parse(raw);
        assert_eq!(
            parsed.action,
            Some(("price-analysis".to_string(), "q1".to_string()))
        );
    }

    #[test]
    fn test_empty_input_is_kept_empty() {
        let parser = DirectiveParser::new();
        assert_eq!(
            parser.decide("Action: price-analysis\nAction Input:", 0),
            Decision::Action {
                tool: ToolId::PriceAnalysis,
                argument: String::new(),
            }
        );
    }

    #[test]
    fn test_unknown_tool_is_unrecognized() {
        let parser = DirectiveParser::new();
        assert_eq!(
            parser.decide("Action: weather-lookup\nAction Input: seoul", 0),
            Decision::UnrecognizedAction {
                name: "weather-lookup".to_string(),
            }
        );
    }

    #[test]
    fn test_terminal_accepted_when_complete() {
        let parser = DirectiveParser::new();
        let raw = "Thought: all tools ran\nFinal Answer:  Neutral outlook overall. ";

        assert_eq!(
            parser.decide(raw, 3),
            Decision::Terminal {
                payload: "Neutral outlook overall.".to_string(),
            }
        );
    }

    #[test]
    fn test_premature_terminal_is_rewritten() {
        let parser = DirectiveParser::new();
        let raw = "Thought: enough\nAction: price-analysis\nAction Input: q\nFinal Answer: Buy.";

        match parser.decide(raw, 1) {
            Decision::PrematureTerminal {
                completed,
                continuation,
            } => {
                assert_eq!(completed, 1);
                assert!(!continuation.contains("Final Answer"));
                assert!(!continuation.contains("Buy."));
                assert!(continuation.starts_with("Thought: enough"));
                assert!(continuation.contains("Only 1/3 primary tools"));
            }
            other => panic!("expected premature terminal, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_terminal_payload_is_ignored() {
        let parser = DirectiveParser::new();
        assert_eq!(parser.decide("Final Answer:   ", 3), Decision::Unparseable);
    }

    #[test]
    fn test_terminal_marker_is_case_insensitive() {
        let parser = DirectiveParser::new();
        assert_eq!(
            parser.decide("**final answer:** done", 3),
            Decision::Terminal {
                payload: "done".to_string(),
            }
        );
    }

    #[test]
    fn test_marker_inside_a_thought_is_not_terminal() {
        let parser = DirectiveParser::new();
        let raw = "Thought: before the final answer: I still need sentiment\nAction: discourse-analysis\nAction Input: q";

        assert_eq!(
            parser.decide(raw, 0),
            Decision::Action {
                tool: ToolId::DiscourseAnalysis,
                argument: "q".to_string(),
            }
        );
    }
}
