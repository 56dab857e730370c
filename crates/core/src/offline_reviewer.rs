use crate::reviewer::Reviewer;
use anyhow::Result;
use async_trait::async_trait;

/// A simulated `Reviewer` that never leaves the process.
///
/// It returns plausible, hard-coded JSON so the coach can run end to end
/// without an API key. Feedback scores track the length of the answer so a
/// missed turn scores lower than a real one.
pub struct OfflineReviewer;

#[async_trait]
impl Reviewer for OfflineReviewer {
    async fn analyze_response(
        &self,
        _question: &str,
        response: &str,
        _audio_features: &str,
    ) -> Result<String> {
        let words = response.split_whitespace().count();
        let (score, remark) = match words {
            0..=5 => (4, "The answer is very short. Expand on your reasoning."),
            6..=40 => (6, "A reasonable answer. Add a concrete example to strengthen it."),
            _ => (8, "A detailed answer with good structure."),
        };
        let feedback = serde_json::json!({
            "feedback": remark,
            "metrics": {
                "clarity": score,
                "technical_accuracy": score,
                "communication": score
            },
            "vocal_feedback": {
                "vocal_feedback": "Delivery was steady.",
                "vocal_metrics": { "pace": 5, "confidence": 6, "filler_words": 0 },
                "vocal_suggestions": ["Keep a steady pace."]
            }
        });
        Ok(feedback.to_string())
    }

    async fn generate_summary(&self, _session_json: &str) -> Result<String> {
        Ok(r#"{
            "score": 70,
            "overview": "Solid practice session. Answers were clear, with room for more depth on technical topics.",
            "strengths": ["Clear communication", "Structured answers"],
            "recommendations": ["Quantify the impact of your work", "Prepare more concrete examples"]
        }"#
        .to_string())
    }

    async fn extract_skills(&self, _resume: &str) -> Result<String> {
        Ok(r#"{"skills": ["Problem Solving"], "tools": ["Git"], "technologies": ["REST APIs"]}"#
            .to_string())
    }

    async fn tailor_questions(
        &self,
        resume_data: &str,
        _interview_type: &str,
        _level: &str,
    ) -> Result<String> {
        // Ask about whatever skill comes first in the extracted data.
        let first_skill = serde_json::from_str::<serde_json::Value>(resume_data)
            .ok()
            .and_then(|v| v["skills"][0].as_str().map(str::to_string))
            .unwrap_or_else(|| "your main skill".to_string());
        let questions = serde_json::json!({
            "questions": [format!("Tell me about a project where you relied on {first_skill}.")]
        });
        Ok(questions.to_string())
    }
}
