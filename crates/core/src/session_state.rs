use crate::analysis::AudioFeatures;
use crate::validator::{Feedback, Summary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which question pool a turn draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Intro,
    Technical,
    Behavioral,
    Closing,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Intro => "intro",
            Phase::Technical => "technical",
            Phase::Behavioral => "behavioral",
            Phase::Closing => "closing",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub phase: Phase,
    pub question: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub text: String,
    pub audio_features: AudioFeatures,
    /// Whole seconds between the start of the wait and the answer.
    pub processing_time: u64,
    pub timestamp: DateTime<Utc>,
}

/// Skills pulled out of the candidate's resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeData {
    pub skills: Vec<String>,
    pub tools: Vec<String>,
    pub technologies: Vec<String>,
}

/// Running per-metric score sequences, one element appended per turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub clarity: Vec<f64>,
    pub technical_accuracy: Vec<f64>,
    pub communication: Vec<f64>,
    pub confidence: Vec<f64>,
    pub pace: Vec<f64>,
    pub filler_words: Vec<f64>,
}

impl SessionMetrics {
    /// Appends each of the six scores of one validated feedback record.
    pub fn record(&mut self, feedback: &Feedback) {
        let vocal = &feedback.vocal_feedback.vocal_metrics;
        self.clarity.push(feedback.metrics.clarity);
        self.technical_accuracy.push(feedback.metrics.technical_accuracy);
        self.communication.push(feedback.metrics.communication);
        self.confidence.push(vocal.confidence);
        self.pace.push(vocal.pace);
        self.filler_words.push(vocal.filler_words);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Named views over all six sequences, in a fixed order.
    pub fn series(&self) -> [(&'static str, &[f64]); 6] {
        [
            ("clarity", self.clarity.as_slice()),
            ("technical_accuracy", self.technical_accuracy.as_slice()),
            ("communication", self.communication.as_slice()),
            ("confidence", self.confidence.as_slice()),
            ("pace", self.pace.as_slice()),
            ("filler_words", self.filler_words.as_slice()),
        ]
    }

    pub fn average(values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}

/// One interview attempt, owned exclusively by the run driving it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub interview_id: String,
    pub user_id: String,
    pub interview_type: String,
    pub level: String,
    pub current_phase: Phase,
    pub current_question: String,
    pub question_history: Vec<QuestionRecord>,
    pub user_responses: Vec<ResponseRecord>,
    pub feedback: Vec<Feedback>,
    pub metrics: SessionMetrics,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub resume_text: Option<String>,
    pub resume_data: Option<ResumeData>,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        interview_type: impl Into<String>,
        level: impl Into<String>,
    ) -> Self {
        let short_id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            interview_id: format!("mock_{}", &short_id[..8]),
            user_id: user_id.into(),
            interview_type: normalize_interview_type(&interview_type.into()),
            level: level.into().trim().to_lowercase(),
            current_phase: Phase::Intro,
            current_question: String::new(),
            question_history: vec![],
            user_responses: vec![],
            feedback: vec![],
            metrics: SessionMetrics::default(),
            start_time: None,
            end_time: None,
            resume_text: None,
            resume_data: None,
        }
    }

    pub fn with_resume(mut self, resume_text: impl Into<String>) -> Self {
        let text = resume_text.into();
        self.resume_text = if text.trim().is_empty() {
            None
        } else {
            Some(text)
        };
        self
    }

    /// Number of completed question/answer/feedback cycles.
    pub fn completed_turns(&self) -> usize {
        self.feedback.len()
    }

    pub fn count_phase(&self, phase: Phase) -> usize {
        self.question_history
            .iter()
            .filter(|q| q.phase == phase)
            .count()
    }

    /// Zips history, responses and feedback into transcript entries.
    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.question_history
            .iter()
            .zip(&self.user_responses)
            .zip(&self.feedback)
            .map(|((question, response), feedback)| TranscriptEntry {
                question: question.question.clone(),
                phase: question.phase,
                response: response.text.clone(),
                feedback: feedback.clone(),
            })
            .collect()
    }

    /// Builds the persisted record for a closed session.
    pub fn to_record(&self, summary: Summary) -> InterviewRecord {
        let end_time = self.end_time.unwrap_or_else(Utc::now);
        InterviewRecord {
            interview_id: self.interview_id.clone(),
            user_id: self.user_id.clone(),
            interview_type: self.interview_type.clone(),
            level: self.level.clone(),
            start_time: self.start_time.unwrap_or(end_time),
            end_time,
            questions: self.transcript(),
            metrics: self.metrics.clone(),
            resume_data: self.resume_data.clone(),
            summary,
        }
    }
}

/// `"Software Engineer"` and `"software_engineer"` name the same bank.
pub fn normalize_interview_type(raw: &str) -> String {
    let normalized = raw.trim().to_lowercase().replace(' ', "_");
    if normalized.is_empty() {
        "software_engineer".to_string()
    } else {
        normalized
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub question: String,
    pub phase: Phase,
    pub response: String,
    pub feedback: Feedback,
}

/// A finished interview as handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewRecord {
    pub interview_id: String,
    pub user_id: String,
    pub interview_type: String,
    pub level: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub questions: Vec<TranscriptEntry>,
    #[serde(default)]
    pub metrics: SessionMetrics,
    #[serde(default)]
    pub resume_data: Option<ResumeData>,
    pub summary: Summary,
}

/// The listing view of a stored interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewOverview {
    pub interview_id: String,
    pub interview_type: String,
    pub level: String,
    pub start_time: DateTime<Utc>,
    pub score: f64,
}

impl From<&InterviewRecord> for InterviewOverview {
    fn from(record: &InterviewRecord) -> Self {
        Self {
            interview_id: record.interview_id.clone(),
            interview_type: record.interview_type.clone(),
            level: record.level.clone(),
            start_time: record.start_time,
            score: record.summary.score,
        }
    }
}
