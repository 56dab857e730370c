use crate::retry::RetryPolicy;
use crate::reviewer::Reviewer;
use crate::session_state::ResumeData;
use crate::validator::{parse_llm_json, strip_json_comments, strip_markdown_json, truncate_for_log};
use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock, Mutex};

/// Resumes are cut to this many characters before prompting.
pub const MAX_RESUME_CHARS: usize = 4000;
/// Shorter resumes are not worth an LLM call.
pub const MIN_RESUME_CHARS: usize = 10;

const SKILL_KEYS: [&str; 3] = ["skills", "tools", "technologies"];

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("quoted string pattern is valid"));

/// Skills assumed for a resume too short to analyze.
pub fn default_resume_data() -> ResumeData {
    ResumeData {
        skills: to_strings(&["Python", "JavaScript", "SQL"]),
        tools: to_strings(&["Django", "React", "Flutter"]),
        technologies: to_strings(&["RESTful APIs", "AI"]),
    }
}

fn fallback_resume_data(partial_skills: Vec<String>) -> ResumeData {
    let skills = if partial_skills.is_empty() {
        to_strings(&[
            "Python",
            "JavaScript",
            "SQL",
            "Machine Learning",
            "Data Preprocessing",
        ])
    } else {
        partial_skills
    };
    ResumeData {
        skills,
        tools: to_strings(&["Flutter", "React Native", "Pandas", "Scikit-learn", "Power BI"]),
        technologies: to_strings(&["RESTful APIs", "AI", "Data Visualization"]),
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Removes carriage returns and blank lines, then truncates.
pub fn normalize_resume(text: &str) -> String {
    let joined = text
        .replace('\r', "")
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    joined.trim().chars().take(MAX_RESUME_CHARS).collect()
}

/// Caps a submitted resume at `MAX_RESUME_CHARS` characters.
pub fn clip_resume(text: &str) -> String {
    let text = text.trim();
    let length = text.chars().count();
    if length > MAX_RESUME_CHARS {
        tracing::warn!("Resume text too long ({length} chars), truncating to {MAX_RESUME_CHARS}");
        text.chars().take(MAX_RESUME_CHARS).collect()
    } else {
        text.to_string()
    }
}

/// Extracts skills from a resume and builds questions around them.
pub struct ResumeAgent {
    reviewer: Arc<dyn Reviewer>,
    policy: RetryPolicy,
}

impl ResumeAgent {
    pub fn new(reviewer: Arc<dyn Reviewer>) -> Self {
        Self::with_policy(reviewer, RetryPolicy::RESUME)
    }

    pub fn with_policy(reviewer: Arc<dyn Reviewer>, policy: RetryPolicy) -> Self {
        Self { reviewer, policy }
    }

    /// Never fails: exhaustion yields fixed fallback lists, seeded with any
    /// quoted strings from the last reply that also appear in the resume.
    pub async fn extract_skills(&self, resume_text: &str) -> ResumeData {
        if resume_text.trim().chars().count() < MIN_RESUME_CHARS {
            tracing::warn!("Resume text is too short or empty, using default skills");
            return default_resume_data();
        }

        let resume = normalize_resume(resume_text);
        tracing::debug!("Sanitized resume: {}", truncate_for_log(&resume, 200));

        let resume_ref = resume.as_str();
        let reviewer = &self.reviewer;
        let last_raw = Mutex::new(String::new());
        let last_raw_ref = &last_raw;

        let result = self
            .policy
            .run("Skill extraction", |attempt| async move {
                let raw = reviewer.extract_skills(resume_ref).await?;
                tracing::debug!(
                    "Attempt {attempt} - raw skills: {}",
                    truncate_for_log(&raw, 500)
                );
                if let Ok(mut slot) = last_raw_ref.lock() {
                    slot.clone_from(&raw);
                }
                parse_resume_data(&raw)
            })
            .await;

        match result {
            Ok(data) => {
                tracing::debug!("Extracted skills: {data:?}");
                data
            }
            Err(e) => {
                tracing::error!("Skill extraction exhausted, using fallback skills: {e:#}");
                let raw = last_raw.into_inner().unwrap_or_default();
                fallback_resume_data(partial_skills(&raw, &resume))
            }
        }
    }

    /// On exhaustion, falls back to three template questions built from the
    /// first skill, tool and technology. Errors only when one of those lists
    /// is empty and the fallback cannot be built.
    pub async fn tailor_questions(
        &self,
        resume_data: &ResumeData,
        interview_type: &str,
        level: &str,
    ) -> Result<Vec<String>> {
        let data_json =
            serde_json::to_string(resume_data).context("Failed to serialize resume data")?;
        let data_ref = data_json.as_str();
        let reviewer = &self.reviewer;

        let result = self
            .policy
            .run("Question tailoring", |attempt| async move {
                let raw = reviewer
                    .tailor_questions(data_ref, interview_type, level)
                    .await?;
                tracing::debug!(
                    "Attempt {attempt} - raw questions: {}",
                    truncate_for_log(&raw, 500)
                );
                parse_questions(&raw)
            })
            .await;

        match result {
            Ok(questions) => {
                tracing::debug!("Tailored questions: {questions:?}");
                Ok(questions)
            }
            Err(e) => {
                tracing::error!("Question tailoring exhausted, using template questions: {e:#}");
                template_questions(resume_data, interview_type)
            }
        }
    }
}

fn parse_resume_data(raw: &str) -> Result<ResumeData> {
    let value = parse_llm_json(raw)?;
    let Some(object) = value.as_object() else {
        bail!("LLM response is not a JSON object");
    };
    if let Some(missing) = SKILL_KEYS.iter().find(|key| !object.contains_key(**key)) {
        bail!("LLM response is missing '{missing}'");
    }

    // A present key with the wrong shape becomes an empty list.
    let list = |key: &str| -> Vec<String> {
        match object.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => {
                tracing::warn!("Invalid {key} format, using an empty list");
                Vec::new()
            }
        }
    };

    Ok(ResumeData {
        skills: list("skills"),
        tools: list("tools"),
        technologies: list("technologies"),
    })
}

fn parse_questions(raw: &str) -> Result<Vec<String>> {
    let value = parse_llm_json(raw)?;
    let questions = value
        .get("questions")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("LLM response has no 'questions' list"))?;
    Ok(questions
        .iter()
        .filter_map(|q| q.as_str())
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .collect())
}

/// Quoted strings in `raw` that also occur in the resume, excluding the
/// expected JSON keys.
fn partial_skills(raw: &str, resume: &str) -> Vec<String> {
    let cleaned = strip_json_comments(&strip_markdown_json(raw));
    let haystack = resume.to_lowercase();
    let mut found: Vec<String> = Vec::new();

    for caps in QUOTED.captures_iter(&cleaned) {
        let candidate = caps[1].trim();
        if candidate.is_empty() || SKILL_KEYS.contains(&candidate) {
            continue;
        }
        if haystack.contains(&candidate.to_lowercase())
            && !found.iter().any(|f| f.eq_ignore_ascii_case(candidate))
        {
            found.push(candidate.to_string());
        }
    }
    if !found.is_empty() {
        tracing::debug!("Partial skills recovered: {found:?}");
    }
    found
}

fn template_questions(resume_data: &ResumeData, interview_type: &str) -> Result<Vec<String>> {
    let skill = resume_data.skills.first().context("No skills to build questions from")?;
    let tool = resume_data.tools.first().context("No tools to build questions from")?;
    let technology = resume_data
        .technologies
        .first()
        .context("No technologies to build questions from")?;
    let kind = interview_type.replace('_', " ");

    Ok(vec![
        format!("Explain how you used {skill} in a project."),
        format!("Describe your experience with {tool} in {kind} development."),
        format!("How do you approach learning a new technology like {technology}?"),
    ])
}
