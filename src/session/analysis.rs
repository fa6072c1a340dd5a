//! Turn a finished scoping session into a [`ScopeAnalysis`].
//!
//! The session's `structured_output` is the source of truth. When Devin did not
//! fill it in, [`legacy`] scrapes the last agent message on a best-effort basis.

use serde::{Deserialize, Serialize};

use super::models::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    StructuredOutput,
    MessageText,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeAnalysis {
    pub scope: String,
    pub confidence_score: Option<u8>,
    pub full_analysis: String,
    pub source: AnalysisSource,
}

/// Extract an analysis from a session snapshot, or `None` when there is
/// nothing to work with (no structured output and no agent messages).
pub fn extract_analysis(session: &Session) -> Option<ScopeAnalysis> {
    let full_text = session
        .last_agent_message()
        .map(|m| m.message.trim().to_string())
        .unwrap_or_default();

    if let Some(analysis) = session
        .structured_output
        .as_ref()
        .and_then(|output| from_structured(output, &full_text))
    {
        return Some(analysis);
    }

    if full_text.is_empty() {
        return None;
    }
    Some(legacy::decode(&full_text))
}

fn from_structured(output: &serde_json::Value, full_text: &str) -> Option<ScopeAnalysis> {
    let obj = output.as_object()?;
    let scope = ["scope", "technical_scope", "summary"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
        .map(|s| s.trim().to_string());
    let confidence_score = ["confidence_score", "confidence"]
        .iter()
        .find_map(|k| obj.get(*k))
        .and_then(confidence_from_value);

    if scope.is_none() && confidence_score.is_none() {
        return None;
    }

    let full_analysis = ["full_analysis", "analysis"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| full_text.to_string());

    Some(ScopeAnalysis {
        scope: scope.unwrap_or_default(),
        confidence_score,
        full_analysis,
        source: AnalysisSource::StructuredOutput,
    })
}

fn confidence_from_value(value: &serde_json::Value) -> Option<u8> {
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64()?.round() as i64,
        serde_json::Value::String(s) => s.split('/').next()?.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    valid_score(n)
}

fn valid_score(n: i64) -> Option<u8> {
    (1..=10).contains(&n).then_some(n as u8)
}

/// Regex scraping of free-text agent output. Only used when the session has no
/// usable structured output.
pub mod legacy {
    use std::sync::LazyLock;

    use regex::Regex;

    use super::{AnalysisSource, ScopeAnalysis, valid_score};

    static CONFIDENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)confidence(?:\s+score)?[*_]*\s*[:\-]?[*_]*\s*(?:of\s+)?(\d{1,2})(?:\s*/\s*10)?")
            .unwrap()
    });

    static SCOPE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)technical\s+scope[*_]*\s*:?[*_]*\s*(.+?)(?:\n\s*\n|\n\s*\d+\.\s|\n\s*#|\z)")
            .unwrap()
    });

    pub fn confidence_score(text: &str) -> Option<u8> {
        CONFIDENCE_REGEX
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .and_then(valid_score)
    }

    /// The "Technical Scope" section, or the first paragraph when there is none.
    pub fn scope(text: &str) -> String {
        if let Some(section) = SCOPE_REGEX
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
        {
            return section.to_string();
        }
        text.trim()
            .split("\n\n")
            .next()
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    pub fn decode(text: &str) -> ScopeAnalysis {
        ScopeAnalysis {
            scope: scope(text),
            confidence_score: confidence_score(text),
            full_analysis: text.to_string(),
            source: AnalysisSource::MessageText,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::models::{SessionId, SessionStatus, agent_message, user_message};

    const REPORT: &str = "Here is my analysis.

1. **Technical Scope**: The CLI argument parser and the config loader.
2. **Implementation Approach**: Add a new flag and thread it through.
3. **Complexity Assessment**: Low.
6. **Confidence Score**: 8/10";

    fn finished(messages: Vec<crate::session::models::SessionMessage>) -> Session {
        Session::new(SessionId::new("s"), SessionStatus::Finished).with_messages(messages)
    }

    #[test]
    fn test_structured_output_wins_over_text() {
        let session = finished(vec![agent_message(REPORT)]).with_structured_output(serde_json::json!({
            "scope": "Only the config loader.",
            "confidence_score": 6
        }));
        let analysis = extract_analysis(&session).unwrap();
        assert_eq!(analysis.source, AnalysisSource::StructuredOutput);
        assert_eq!(analysis.scope, "Only the config loader.");
        assert_eq!(analysis.confidence_score, Some(6));
        assert_eq!(analysis.full_analysis, REPORT);
    }

    #[test]
    fn test_structured_confidence_accepts_strings() {
        let session = finished(vec![]).with_structured_output(serde_json::json!({
            "confidence": "9/10",
            "analysis": "All good"
        }));
        let analysis = extract_analysis(&session).unwrap();
        assert_eq!(analysis.confidence_score, Some(9));
        assert_eq!(analysis.full_analysis, "All good");
        assert_eq!(analysis.scope, "");
    }

    #[test]
    fn test_unusable_structured_output_falls_back_to_text() {
        let session = finished(vec![agent_message(REPORT), user_message("thanks")])
            .with_structured_output(serde_json::json!({"unrelated": true}));
        let analysis = extract_analysis(&session).unwrap();
        assert_eq!(analysis.source, AnalysisSource::MessageText);
        assert_eq!(analysis.scope, "The CLI argument parser and the config loader.");
        assert_eq!(analysis.confidence_score, Some(8));
    }

    #[test]
    fn test_no_output_and_no_agent_messages_is_none() {
        let session = finished(vec![user_message("please scope")]);
        assert!(extract_analysis(&session).is_none());
    }

    #[test]
    fn test_out_of_range_confidence_is_dropped() {
        assert_eq!(legacy::confidence_score("Confidence Score: 42"), None);
        assert_eq!(legacy::confidence_score("Confidence: 0/10"), None);
        assert_eq!(legacy::confidence_score("confidence of 7"), Some(7));
        assert_eq!(legacy::confidence_score("no score here"), None);
        assert_eq!(confidence_from_value(&serde_json::json!(11)), None);
        assert_eq!(confidence_from_value(&serde_json::json!(7.6)), Some(8));
    }

    #[test]
    fn test_legacy_scope_falls_back_to_first_paragraph() {
        let text = "The change touches the renderer only.\n\nMore details follow.";
        assert_eq!(legacy::scope(text), "The change touches the renderer only.");
    }

    #[test]
    fn test_legacy_scope_plain_heading() {
        let text = "Technical scope: storage layer\n\nConfidence: 5";
        assert_eq!(legacy::scope(text), "storage layer");
        assert_eq!(legacy::confidence_score(text), Some(5));
    }
}
