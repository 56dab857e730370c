use anyhow::{Context, Result};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

pub const ANALYZE_RESPONSE: &str = "analyze_response";
pub const SUMMARY_REPORT: &str = "summary_report";
pub const EXTRACT_SKILLS: &str = "extract_skills";
pub const TAILOR_QUESTIONS: &str = "tailor_questions";

const DEFAULT_ANALYZE_RESPONSE: &str = r#"Analyze the candidate's response to the interview question and provide feedback in valid JSON format.
Question: {question}
Response: {response}
Audio Features: {audio_features}

Return a single JSON object with the following structure:
{
    "feedback": "Detailed feedback on the response content and quality",
    "metrics": {
        "clarity": 7,
        "technical_accuracy": 8,
        "communication": 6
    },
    "vocal_feedback": {
        "vocal_feedback": "Feedback on vocal delivery based on audio features",
        "vocal_metrics": {
            "pace": 6,
            "confidence": 7,
            "filler_words": 3
        },
        "vocal_suggestions": ["Speak more slowly", "Reduce filler words"]
    }
}

Important:
- Metrics are numbers between 0 and 10, filler_words is a count
- All metric values must be numbers, not strings
- Return only the raw JSON without Markdown formatting
- If audio features are empty, use default scores of 5
"#;

const DEFAULT_SUMMARY_REPORT: &str = r#"Generate a summary report for the mock interview described by this session.
Session: {session}

Return a JSON object:
{
    "score": 75,
    "overview": "Summary of performance",
    "strengths": ["Strength 1", "Strength 2"],
    "recommendations": ["Recommendation 1", "Recommendation 2"]
}
The score is a number between 0 and 100. Return only the raw JSON.
"#;

const DEFAULT_EXTRACT_SKILLS: &str = r#"Extract skills, tools, and technologies from the resume.
Resume: {resume}

Return valid JSON:
{ "skills": [], "tools": [], "technologies": [] }
Avoid Markdown code blocks. Return empty lists if no data is found.
"#;

const DEFAULT_TAILOR_QUESTIONS: &str = r#"Generate 3-5 interview questions based on resume data, interview type, and level.
Resume data: {resume_data}
Interview type: {interview_type}
Level: {level}

Return valid JSON:
{ "questions": [] }
Avoid Markdown code blocks. Return an empty list if no questions are generated.
"#;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder regex is valid"));

/// The prompt templates handed to the reviewer, keyed by purpose.
#[derive(Debug, Clone)]
pub struct PromptSet {
    templates: HashMap<String, String>,
}

impl Default for PromptSet {
    fn default() -> Self {
        let templates = [
            (ANALYZE_RESPONSE, DEFAULT_ANALYZE_RESPONSE),
            (SUMMARY_REPORT, DEFAULT_SUMMARY_REPORT),
            (EXTRACT_SKILLS, DEFAULT_EXTRACT_SKILLS),
            (TAILOR_QUESTIONS, DEFAULT_TAILOR_QUESTIONS),
        ]
        .into_iter()
        .map(|(key, template)| (key.to_string(), template.to_string()))
        .collect();
        Self { templates }
    }
}

impl PromptSet {
    /// Replaces default templates with same-named overrides.
    ///
    /// Keys that do not name a known template are ignored.
    pub fn with_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        for (key, template) in overrides {
            if let Some(slot) = self.templates.get_mut(&key) {
                tracing::info!("Using prompt override for '{key}'");
                *slot = template;
            } else {
                tracing::debug!("Ignoring unknown prompt override '{key}'");
            }
        }
        self
    }

    pub fn template(&self, key: &str) -> Option<&str> {
        self.templates.get(key).map(String::as_str)
    }

    /// Fills `{name}` placeholders in one pass, so substituted values are
    /// never re-expanded. Unknown placeholders and literal JSON braces are
    /// left untouched.
    pub fn render(&self, key: &str, values: &[(&str, &str)]) -> Result<String> {
        let template = self
            .template(key)
            .with_context(|| format!("Missing prompt template '{key}'"))?;

        let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| {
            values
                .iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        });
        Ok(rendered.into_owned())
    }
}

/// Loads every `.md` file in `dir_path`, keyed by file stem.
pub fn load_prompt_overrides(dir_path: &Path) -> Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();

    for entry in fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read prompts directory: {}", dir_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem for prompt file")?
                .to_string();

            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;

            prompts.insert(prompt_key, content);
        }
    }

    Ok(prompts)
}
