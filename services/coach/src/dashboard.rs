//! Plain-text rendering of interview events for the terminal.

use interview_core::Command;
use interview_core::session_state::{InterviewOverview, InterviewRecord};
use interview_core::validator::{Feedback, Summary};
use std::fmt::Write;

const RULE_WIDTH: usize = 64;

/// Renders one coach command, or `None` for commands with nothing to show.
pub fn render_command(command: &Command) -> Option<String> {
    match command {
        Command::SpeakText(text) => Some(format!("\nCoach: {text}")),
        Command::AskQuestion { phase, question } => Some(format!(
            "\n[{}] Question: {question}\n(type your answer and press Enter)",
            phase.as_str()
        )),
        Command::ResponseHeard(_) => None,
        Command::Feedback(feedback) => Some(render_feedback(feedback)),
        Command::Summary(summary) => Some(render_summary(summary)),
        Command::Error(message) => Some(format!("\nError: {message}")),
    }
}

fn rule() -> String {
    "-".repeat(RULE_WIDTH)
}

/// The per-turn metric table.
pub fn render_feedback(feedback: &Feedback) -> String {
    let metrics = &feedback.metrics;
    let vocal = &feedback.vocal_feedback.vocal_metrics;
    let mut out = String::new();

    let _ = writeln!(out, "\nFeedback\n{}", rule());
    let _ = writeln!(out, "{:<22}{:>6}", "Metric", "Score");
    let rows = [
        ("Clarity", metrics.clarity),
        ("Technical accuracy", metrics.technical_accuracy),
        ("Communication", metrics.communication),
        ("Pace", vocal.pace),
        ("Confidence", vocal.confidence),
        ("Filler words", vocal.filler_words),
    ];
    for (name, score) in rows {
        let _ = writeln!(out, "{name:<22}{score:>6.1}");
    }
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "{}", feedback.feedback);
    for suggestion in &feedback.vocal_feedback.vocal_suggestions {
        let _ = writeln!(out, "  * {suggestion}");
    }
    out
}

fn bullets(out: &mut String, title: &str, items: &[String], empty: &str) {
    let _ = writeln!(out, "{title}:");
    if items.is_empty() {
        let _ = writeln!(out, "  {empty}");
    }
    for item in items {
        let _ = writeln!(out, "  - {item}");
    }
}

/// The end-of-session report, score shown as a percentage.
pub fn render_summary(summary: &Summary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\nInterview Summary Report\n{}", rule());
    let _ = writeln!(out, "Overall Score: {:.0}%", summary.score);
    let _ = writeln!(out, "{}", summary.overview);
    bullets(&mut out, "Strengths", &summary.strengths, "None identified");
    bullets(
        &mut out,
        "Recommendations",
        &summary.recommendations,
        "None provided",
    );
    let _ = writeln!(out, "{}", rule());
    out
}

/// One line per stored interview.
pub fn render_history(user_id: &str, overviews: &[InterviewOverview]) -> String {
    if overviews.is_empty() {
        return format!("No interviews found for {user_id}.");
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<16}{:<20}{:<10}{:<18}{:>6}",
        "Interview", "Type", "Level", "Started", "Score"
    );
    for overview in overviews {
        let _ = writeln!(
            out,
            "{:<16}{:<20}{:<10}{:<18}{:>5.0}%",
            overview.interview_id,
            overview.interview_type,
            overview.level,
            overview.start_time.format("%Y-%m-%d %H:%M"),
            overview.score
        );
    }
    out
}

/// The full transcript of a stored interview followed by its summary.
pub fn render_record(record: &InterviewRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Interview {} ({}, {}) for {}",
        record.interview_id, record.interview_type, record.level, record.user_id
    );
    let _ = writeln!(
        out,
        "{} to {}",
        record.start_time.format("%Y-%m-%d %H:%M:%S"),
        record.end_time.format("%H:%M:%S")
    );
    for (i, entry) in record.questions.iter().enumerate() {
        let _ = writeln!(out, "\n{}. [{}] {}", i + 1, entry.phase.as_str(), entry.question);
        let _ = writeln!(out, "   Answer: {}", entry.response);
        let _ = writeln!(out, "   Feedback: {}", entry.feedback.feedback);
    }
    out.push_str(&render_summary(&record.summary));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_core::session_state::{Phase, Session};

    #[test]
    fn response_echo_is_not_rendered() {
        assert!(render_command(&Command::ResponseHeard("hi".to_string())).is_none());

        let question = render_command(&Command::AskQuestion {
            phase: Phase::Technical,
            question: "What is ownership?".to_string(),
        })
        .unwrap();
        assert!(question.contains("[technical] Question: What is ownership?"));
    }

    #[test]
    fn feedback_table_lists_every_metric() {
        let text = render_feedback(&Feedback::default());

        for name in ["Clarity", "Technical accuracy", "Communication", "Pace", "Confidence", "Filler words"] {
            assert!(text.contains(name), "missing {name}");
        }
        assert!(text.contains("5.0"));
        assert!(text.contains("Speak clearly and confidently."));
    }

    #[test]
    fn summary_shows_score_as_percentage() {
        let summary = Summary {
            score: 72.6,
            overview: "Solid answers.".to_string(),
            strengths: vec!["Structure".to_string()],
            recommendations: vec![],
        };
        let text = render_summary(&summary);

        assert!(text.contains("Overall Score: 73%"));
        assert!(text.contains("  - Structure"));
        assert!(text.contains("None provided"));
    }

    #[test]
    fn history_and_record_views() {
        assert_eq!(render_history("user_1", &[]), "No interviews found for user_1.");

        let record = Session::new("user_1", "software_engineer", "mid").to_record(Summary::default());
        let overview = InterviewOverview::from(&record);
        let listing = render_history("user_1", &[overview]);
        assert!(listing.contains(&record.interview_id));
        assert!(listing.contains("50%"));

        let full = render_record(&record);
        assert!(full.starts_with(&format!("Interview {}", record.interview_id)));
        assert!(full.contains("Interview Summary Report"));
    }
}
