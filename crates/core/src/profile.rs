use crate::session_state::InterviewRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One past interview as remembered on a user's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewHistory {
    pub interview_id: String,
    pub date: DateTime<Utc>,
    pub interview_type: String,
    pub score: f64,
    pub feedback_summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub target_roles: Vec<String>,
    #[serde(default)]
    pub current_level: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub interview_history: Vec<InterviewHistory>,
    #[serde(default)]
    pub preferences: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            name: String::new(),
            email: String::new(),
            target_roles: vec![],
            current_level: String::new(),
            skills: vec![],
            interview_history: vec![],
            preferences: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A profile for a client that never identified itself.
    pub fn anonymous(user_id: impl Into<String>) -> Self {
        let mut profile = Self::new(user_id);
        profile.name = "Anonymous".to_string();
        profile
    }

    /// Records a finished interview and folds in any resume skills not
    /// already on the profile.
    pub fn update_after_interview(&mut self, record: &InterviewRecord) {
        self.interview_history.push(InterviewHistory {
            interview_id: record.interview_id.clone(),
            date: record.end_time,
            interview_type: record.interview_type.clone(),
            score: record.summary.score,
            feedback_summary: record.summary.overview.clone(),
        });

        if let Some(resume) = &record.resume_data {
            for skill in &resume.skills {
                if !self.skills.iter().any(|s| s.eq_ignore_ascii_case(skill)) {
                    self.skills.push(skill.clone());
                }
            }
        }
        if self.current_level.is_empty() {
            self.current_level = record.level.clone();
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_state::{ResumeData, Session};
    use crate::validator::Summary;

    #[test]
    fn update_appends_history_and_merges_skills() {
        let mut profile = UserProfile::new("user_1");
        profile.skills = vec!["rust".to_string()];

        let mut session = Session::new("user_1", "software_engineer", "senior");
        session.resume_data = Some(ResumeData {
            skills: vec!["Rust".to_string(), "Go".to_string()],
            ..ResumeData::default()
        });
        let record = session.to_record(Summary {
            score: 82.0,
            overview: "Strong system design answers.".to_string(),
            ..Summary::default()
        });

        profile.update_after_interview(&record);

        assert_eq!(profile.interview_history.len(), 1);
        let entry = &profile.interview_history[0];
        assert_eq!(entry.interview_id, record.interview_id);
        assert_eq!(entry.score, 82.0);
        assert_eq!(entry.feedback_summary, "Strong system design answers.");
        assert_eq!(profile.skills, vec!["rust", "Go"]);
        assert_eq!(profile.current_level, "senior");
        assert!(profile.updated_at >= profile.created_at);
    }
}
