//! Coercion of loosely-structured LLM output into strict records.
//!
//! The reviewer is asked for JSON, but what comes back is whatever the model
//! felt like writing: fenced code blocks, `// comments`, numbers as strings,
//! missing sections. Everything here is schema-driven coercion over a generic
//! `serde_json::Value` tree; every field has a default, so validation itself
//! never fails.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_FEEDBACK_TEXT: &str = "No detailed feedback available";
pub const DEFAULT_VOCAL_FEEDBACK_TEXT: &str = "No vocal feedback";
pub const DEFAULT_VOCAL_SUGGESTION: &str = "Speak clearly and confidently.";
pub const DEFAULT_METRIC_SCORE: f64 = 5.0;
pub const DEFAULT_FILLER_WORDS: f64 = 0.0;

pub const DEFAULT_SUMMARY_SCORE: f64 = 50.0;
pub const DEFAULT_SUMMARY_OVERVIEW: &str =
    "Good performance with room for improvement in technical details.";
pub const DEFAULT_SUMMARY_STRENGTH: &str = "Clear communication";
pub const DEFAULT_SUMMARY_RECOMMENDATION: &str = "Provide more specific examples.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetrics {
    pub clarity: f64,
    pub technical_accuracy: f64,
    pub communication: f64,
}

impl Default for ResponseMetrics {
    fn default() -> Self {
        Self {
            clarity: DEFAULT_METRIC_SCORE,
            technical_accuracy: DEFAULT_METRIC_SCORE,
            communication: DEFAULT_METRIC_SCORE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocalMetrics {
    pub pace: f64,
    pub confidence: f64,
    pub filler_words: f64,
}

impl Default for VocalMetrics {
    fn default() -> Self {
        Self {
            pace: DEFAULT_METRIC_SCORE,
            confidence: DEFAULT_METRIC_SCORE,
            filler_words: DEFAULT_FILLER_WORDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocalFeedback {
    pub vocal_feedback: String,
    pub vocal_metrics: VocalMetrics,
    pub vocal_suggestions: Vec<String>,
}

impl Default for VocalFeedback {
    fn default() -> Self {
        Self {
            vocal_feedback: DEFAULT_VOCAL_FEEDBACK_TEXT.to_string(),
            vocal_metrics: VocalMetrics::default(),
            vocal_suggestions: vec![DEFAULT_VOCAL_SUGGESTION.to_string()],
        }
    }
}

/// Per-turn evaluation of one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub feedback: String,
    pub metrics: ResponseMetrics,
    pub vocal_feedback: VocalFeedback,
}

impl Default for Feedback {
    fn default() -> Self {
        Self {
            feedback: DEFAULT_FEEDBACK_TEXT.to_string(),
            metrics: ResponseMetrics::default(),
            vocal_feedback: VocalFeedback::default(),
        }
    }
}

/// End-of-session report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub score: f64,
    pub overview: String,
    pub strengths: Vec<String>,
    #[serde(alias = "improvements")]
    pub recommendations: Vec<String>,
}

impl Default for Summary {
    fn default() -> Self {
        Self {
            score: DEFAULT_SUMMARY_SCORE,
            overview: DEFAULT_SUMMARY_OVERVIEW.to_string(),
            strengths: vec![DEFAULT_SUMMARY_STRENGTH.to_string()],
            recommendations: vec![DEFAULT_SUMMARY_RECOMMENDATION.to_string()],
        }
    }
}

/// Coerces an arbitrary JSON value into a `Feedback` record.
///
/// Anything that is not an object yields the default record. Inside an
/// object, each field falls back to its default independently.
pub fn validate_feedback(raw: &Value) -> Feedback {
    let defaults = Feedback::default();
    if !raw.is_object() {
        return defaults;
    }

    let metrics = raw.get("metrics");
    let vocal = raw.get("vocal_feedback");

    // Some models flatten `vocal_feedback` into a plain sentence.
    let (vocal_text, vocal_metrics, vocal_suggestions) = match vocal {
        Some(Value::Object(_)) => (
            vocal.and_then(|v| v.get("vocal_feedback")),
            vocal.and_then(|v| v.get("vocal_metrics")),
            vocal.and_then(|v| v.get("vocal_suggestions")),
        ),
        Some(text @ Value::String(_)) => (Some(text), None, None),
        _ => (None, None, None),
    };

    Feedback {
        feedback: coerce_string(raw.get("feedback"), &defaults.feedback),
        metrics: ResponseMetrics {
            clarity: coerce_f64(field(metrics, "clarity"), defaults.metrics.clarity),
            technical_accuracy: coerce_f64(
                field(metrics, "technical_accuracy"),
                defaults.metrics.technical_accuracy,
            ),
            communication: coerce_f64(
                field(metrics, "communication"),
                defaults.metrics.communication,
            ),
        },
        vocal_feedback: VocalFeedback {
            vocal_feedback: coerce_string(vocal_text, &defaults.vocal_feedback.vocal_feedback),
            vocal_metrics: VocalMetrics {
                pace: coerce_f64(
                    field(vocal_metrics, "pace"),
                    defaults.vocal_feedback.vocal_metrics.pace,
                ),
                confidence: coerce_f64(
                    field(vocal_metrics, "confidence"),
                    defaults.vocal_feedback.vocal_metrics.confidence,
                ),
                filler_words: coerce_f64(
                    field(vocal_metrics, "filler_words"),
                    defaults.vocal_feedback.vocal_metrics.filler_words,
                ),
            },
            vocal_suggestions: coerce_string_list(
                vocal_suggestions,
                &defaults.vocal_feedback.vocal_suggestions,
            ),
        },
    }
}

/// Coerces an arbitrary JSON value into a `Summary` record.
///
/// The score is clamped into `0..=100`. `improvements` is accepted as an
/// alias for `recommendations`.
pub fn validate_summary(raw: &Value) -> Summary {
    let defaults = Summary::default();
    if !raw.is_object() {
        return defaults;
    }

    let recommendations = raw.get("recommendations").or_else(|| raw.get("improvements"));

    Summary {
        score: coerce_f64(raw.get("score"), defaults.score).clamp(0.0, 100.0),
        overview: coerce_string(raw.get("overview"), &defaults.overview),
        strengths: coerce_string_list(raw.get("strengths"), &defaults.strengths),
        recommendations: coerce_string_list(recommendations, &defaults.recommendations),
    }
}

/// Parses raw LLM text as JSON after removing Markdown fences.
///
/// If the fence-stripped text does not parse, comment syntax is removed and
/// parsing is tried once more.
pub fn parse_llm_json(raw: &str) -> Result<Value> {
    let unfenced = strip_markdown_json(raw);
    match serde_json::from_str(&unfenced) {
        Ok(value) => Ok(value),
        Err(_) => {
            let uncommented = strip_json_comments(&unfenced);
            serde_json::from_str(&uncommented).with_context(|| {
                format!(
                    "LLM output is not valid JSON: {}",
                    truncate_for_log(&uncommented, 200)
                )
            })
        }
    }
}

/// Removes a surrounding Markdown code fence (with or without a language tag).
pub fn strip_markdown_json(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let after_open = match trimmed.find('\n') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed.trim_start_matches('`'),
    };
    let cleaned = after_open.trim_end();
    cleaned
        .strip_suffix("```")
        .unwrap_or(cleaned)
        .trim()
        .to_string()
}

/// Removes `/* block */` and `// line` comments outside string literals.
pub fn strip_json_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        let next = chars.peek().copied();
        match (c, next) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                // The newline itself is kept.
                while chars.next_if(|&n| n != '\n').is_some() {}
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            _ => out.push(c),
        }
    }

    out.trim().to_string()
}

pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}...")
}

fn field<'a>(parent: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    parent.and_then(|p| p.get(key))
}

/// Numbers pass through; numeric strings are parsed; everything else defaults.
fn coerce_f64(value: Option<&Value>, default: f64) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(default)
}

fn coerce_string(value: Option<&Value>, default: &str) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => default.to_string(),
        Some(other) => other.to_string(),
    }
}

fn coerce_string_list(value: Option<&Value>, default: &[String]) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => default.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_object_yields_default_feedback() {
        let feedback = validate_feedback(&json!({}));

        assert_eq!(feedback, Feedback::default());
        assert_eq!(feedback.feedback, "No detailed feedback available");
        assert_eq!(feedback.metrics.clarity, 5.0);
        assert_eq!(feedback.metrics.technical_accuracy, 5.0);
        assert_eq!(feedback.metrics.communication, 5.0);
        assert_eq!(feedback.vocal_feedback.vocal_metrics.pace, 5.0);
        assert_eq!(feedback.vocal_feedback.vocal_metrics.confidence, 5.0);
        assert_eq!(feedback.vocal_feedback.vocal_metrics.filler_words, 0.0);
        assert_eq!(feedback.vocal_feedback.vocal_suggestions.len(), 1);
    }

    #[test]
    fn non_object_input_yields_default_feedback() {
        assert_eq!(validate_feedback(&json!([1, 2, 3])), Feedback::default());
        assert_eq!(validate_feedback(&json!("great answer")), Feedback::default());
        assert_eq!(validate_feedback(&Value::Null), Feedback::default());
    }

    #[test]
    fn validating_well_formed_feedback_is_identity() {
        let original = Feedback {
            feedback: "Solid structure, but name the trade-offs.".to_string(),
            metrics: ResponseMetrics {
                clarity: 7.5,
                technical_accuracy: 8.0,
                communication: 6.25,
            },
            vocal_feedback: VocalFeedback {
                vocal_feedback: "Steady pace.".to_string(),
                vocal_metrics: VocalMetrics {
                    pace: 6.0,
                    confidence: 7.0,
                    filler_words: 3.0,
                },
                vocal_suggestions: vec!["Pause before answering".to_string()],
            },
        };

        let value = serde_json::to_value(&original).unwrap();
        let once = validate_feedback(&value);
        let twice = validate_feedback(&serde_json::to_value(&once).unwrap());

        assert_eq!(once, original);
        assert_eq!(twice, original);
    }

    #[test]
    fn metrics_are_coerced_field_by_field() {
        let raw = json!({
            "feedback": "ok",
            "metrics": { "clarity": "8", "technical_accuracy": "high", "communication": null },
            "vocal_feedback": {
                "vocal_feedback": "fine",
                "vocal_metrics": { "pace": 9, "filler_words": " 2 " },
                "vocal_suggestions": ["Slow down", 42]
            }
        });

        let feedback = validate_feedback(&raw);

        assert_eq!(feedback.metrics.clarity, 8.0);
        assert_eq!(feedback.metrics.technical_accuracy, 5.0);
        assert_eq!(feedback.metrics.communication, 5.0);
        assert_eq!(feedback.vocal_feedback.vocal_metrics.pace, 9.0);
        assert_eq!(feedback.vocal_feedback.vocal_metrics.confidence, 5.0);
        assert_eq!(feedback.vocal_feedback.vocal_metrics.filler_words, 2.0);
        assert_eq!(
            feedback.vocal_feedback.vocal_suggestions,
            vec!["Slow down".to_string(), "42".to_string()]
        );
    }

    #[test]
    fn string_vocal_feedback_is_kept_as_text() {
        let raw = json!({ "vocal_feedback": "Too many pauses", "vocal_suggestions": "nope" });

        let feedback = validate_feedback(&raw);

        assert_eq!(feedback.vocal_feedback.vocal_feedback, "Too many pauses");
        assert_eq!(feedback.vocal_feedback.vocal_metrics, VocalMetrics::default());
        assert_eq!(
            feedback.vocal_feedback.vocal_suggestions,
            vec![DEFAULT_VOCAL_SUGGESTION.to_string()]
        );
    }

    #[test]
    fn summary_score_is_clamped_and_aliases_accepted() {
        let raw = json!({
            "score": "140",
            "overview": "Strong candidate",
            "strengths": ["Depth"],
            "improvements": ["Be concise"]
        });

        let summary = validate_summary(&raw);

        assert_eq!(summary.score, 100.0);
        assert_eq!(summary.overview, "Strong candidate");
        assert_eq!(summary.strengths, vec!["Depth".to_string()]);
        assert_eq!(summary.recommendations, vec!["Be concise".to_string()]);
        assert_eq!(validate_summary(&json!(null)), Summary::default());
    }

    #[test]
    fn parses_fenced_and_commented_json() {
        let raw = "```json\n{\n  \"metrics\": {\n    \"clarity\": 7,  // Numeric value between 0-10\n    \"communication\": 6 /* estimate */\n  },\n  \"link\": \"https://example.com\"\n}\n```";

        let value = parse_llm_json(raw).unwrap();

        assert_eq!(value["metrics"]["clarity"], json!(7));
        assert_eq!(value["metrics"]["communication"], json!(6));
        assert_eq!(value["link"], json!("https://example.com"));
    }

    #[test]
    fn comment_markers_inside_strings_are_kept() {
        let raw = "{\"feedback\": \"use a // b\", // note\n \"quote\": \"say \\\"/* hi */\\\"\", \"x\": 1 /* end */}";

        let value = parse_llm_json(raw).unwrap();

        assert_eq!(value["feedback"], json!("use a // b"));
        assert_eq!(value["quote"], json!("say \"/* hi */\""));
        assert_eq!(value["x"], json!(1));
    }

    #[test]
    fn rejects_prose() {
        assert!(parse_llm_json("Sure! Here is your feedback: great job.").is_err());
    }

    #[test]
    fn strip_markdown_leaves_plain_json_alone() {
        assert_eq!(strip_markdown_json("  {\"a\": 1} "), "{\"a\": 1}");
        assert_eq!(strip_markdown_json("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }
}
