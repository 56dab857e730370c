//! The interview phase machine.
//!
//! A session moves through `Init -> ResumeAnalysis -> AskIntro -> Evaluate`
//! and then loops between one of the ask steps and `Evaluate` until the
//! phase quotas are met, finishing with `Closing -> Terminal`. Which ask
//! step follows an evaluation is re-derived from the question history on
//! every turn; there are no separate counters.

use crate::Command;
use crate::acquisition::{ResponseAcquirer, ResponseSource};
use crate::analysis::AudioFeatures;
use crate::feedback::FeedbackAgent;
use crate::profile::UserProfile;
use crate::question_bank::QuestionBank;
use crate::resume::ResumeAgent;
use crate::reviewer::Reviewer;
use crate::session_state::{
    InterviewRecord, Phase, QuestionRecord, ResponseRecord, ResumeData, Session,
};
use crate::store::InterviewStore;
use anyhow::{Context, Result};
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const TURN_BUDGET: Duration = Duration::from_secs(60);

pub const INTRO_QUESTIONS: usize = 2;
pub const TECHNICAL_QUESTIONS: usize = 3;
pub const BEHAVIORAL_QUESTIONS: usize = 2;

pub const NO_RESPONSE_TEXT: &str = "No response provided within time limit";
pub const NO_RESPONSE_NOTICE: &str =
    "I didn't hear your response. Let's move to the next question.";
pub const RESUME_FAILURE_NOTICE: &str =
    "Unable to process resume, proceeding with default questions.";
pub const CLOSING_MESSAGE: &str = "We've reached the end of our session. Thank you for your time!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Init,
    ResumeAnalysis,
    AskIntro,
    AskTechnical,
    AskBehavioral,
    Evaluate,
    Closing,
    Terminal,
}

impl Step {
    fn ask(phase: Phase) -> Step {
        match phase {
            Phase::Intro => Step::AskIntro,
            Phase::Technical => Step::AskTechnical,
            Phase::Behavioral => Step::AskBehavioral,
            Phase::Closing => Step::Closing,
        }
    }
}

/// Decides which phase the next turn belongs to, from the history alone.
pub fn next_phase(history: &[QuestionRecord]) -> Phase {
    let count = |phase: Phase| history.iter().filter(|q| q.phase == phase).count();

    if count(Phase::Intro) < INTRO_QUESTIONS {
        Phase::Intro
    } else if count(Phase::Technical) < TECHNICAL_QUESTIONS {
        Phase::Technical
    } else if count(Phase::Behavioral) < BEHAVIORAL_QUESTIONS {
        Phase::Behavioral
    } else {
        Phase::Closing
    }
}

pub fn welcome_message(session: &Session) -> String {
    format!(
        "Welcome to your {} mock interview. I'll be your AI coach today. \
         This session is for {} level. Let's begin with some introductory questions.",
        session.interview_type.replace('_', " "),
        session.level
    )
}

/// Drives one session from welcome to summary.
///
/// A coach owns its copy of the question bank, so create one per session.
pub struct InterviewCoach {
    feedback_agent: FeedbackAgent,
    resume_agent: ResumeAgent,
    bank: QuestionBank,
    store: Arc<dyn InterviewStore>,
    rng: StdRng,
    turn_budget: Duration,
    finished: Option<InterviewRecord>,
}

impl InterviewCoach {
    pub fn new(
        reviewer: Arc<dyn Reviewer>,
        bank: QuestionBank,
        store: Arc<dyn InterviewStore>,
    ) -> Self {
        Self {
            feedback_agent: FeedbackAgent::new(reviewer.clone()),
            resume_agent: ResumeAgent::new(reviewer),
            bank,
            store,
            rng: StdRng::from_os_rng(),
            turn_budget: TURN_BUDGET,
            finished: None,
        }
    }

    /// Seeds question selection so a run is reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_turn_budget(mut self, budget: Duration) -> Self {
        self.turn_budget = budget;
        self
    }

    /// Runs the whole interview.
    ///
    /// Returns the persisted record, or `None` when a step failed. A failure
    /// is reported once as `Command::Error` and nothing is persisted.
    pub async fn run(
        &mut self,
        session: &mut Session,
        acquirer: &mut ResponseAcquirer,
        command_tx: &mpsc::Sender<Command>,
    ) -> Option<InterviewRecord> {
        tracing::info!(
            "Starting interview {} ({}, {}) for {}",
            session.interview_id,
            session.interview_type,
            session.level,
            session.user_id
        );

        let mut step = Step::Init;
        while step != Step::Terminal {
            match self.step(step, session, acquirer, command_tx).await {
                Ok(next) => {
                    tracing::debug!("{step:?} -> {next:?}");
                    step = next;
                }
                Err(e) => {
                    tracing::error!(
                        "Interview {} failed during {step:?}: {e:#}",
                        session.interview_id
                    );
                    if command_tx.send(Command::Error(e.to_string())).await.is_err() {
                        tracing::debug!("Transport gone, error not delivered");
                    }
                    return None;
                }
            }
        }

        self.finished.take()
    }

    /// Executes one step and returns the step that follows it.
    pub async fn step(
        &mut self,
        step: Step,
        session: &mut Session,
        acquirer: &mut ResponseAcquirer,
        command_tx: &mpsc::Sender<Command>,
    ) -> Result<Step> {
        match step {
            Step::Init => self.initialize(session, command_tx).await,
            Step::ResumeAnalysis => self.analyze_resume(session, command_tx).await,
            Step::AskIntro => self.ask(Phase::Intro, session, acquirer, command_tx).await,
            Step::AskTechnical => {
                self.ask(Phase::Technical, session, acquirer, command_tx)
                    .await
            }
            Step::AskBehavioral => {
                self.ask(Phase::Behavioral, session, acquirer, command_tx)
                    .await
            }
            Step::Evaluate => self.evaluate(session, acquirer, command_tx).await,
            Step::Closing => self.close(session, command_tx).await,
            Step::Terminal => Ok(Step::Terminal),
        }
    }

    async fn initialize(
        &mut self,
        session: &mut Session,
        command_tx: &mpsc::Sender<Command>,
    ) -> Result<Step> {
        session.start_time = Some(Utc::now());
        session.end_time = None;
        session.current_question.clear();
        session.question_history.clear();
        session.user_responses.clear();
        session.feedback.clear();
        session.metrics.clear();

        emit(command_tx, Command::SpeakText(welcome_message(session))).await?;
        Ok(Step::ResumeAnalysis)
    }

    async fn analyze_resume(
        &mut self,
        session: &mut Session,
        command_tx: &mpsc::Sender<Command>,
    ) -> Result<Step> {
        let Some(resume) = session.resume_text.clone() else {
            return Ok(Step::AskIntro);
        };

        let resume_data = self.resume_agent.extract_skills(&resume).await;
        match self
            .resume_agent
            .tailor_questions(&resume_data, &session.interview_type, &session.level)
            .await
        {
            Ok(questions) => {
                tracing::info!("Adding {} resume-based questions", questions.len());
                self.bank
                    .merge_tailored(&session.interview_type, &session.level, questions);
                session.resume_data = Some(resume_data);
            }
            Err(e) => {
                tracing::error!("Failed to process resume: {e:#}");
                session.resume_data = Some(ResumeData::default());
                emit(command_tx, Command::SpeakText(RESUME_FAILURE_NOTICE.to_string())).await?;
            }
        }
        Ok(Step::AskIntro)
    }

    async fn ask(
        &mut self,
        phase: Phase,
        session: &mut Session,
        acquirer: &mut ResponseAcquirer,
        command_tx: &mpsc::Sender<Command>,
    ) -> Result<Step> {
        let question =
            self.bank
                .choose(&session.interview_type, phase, &session.level, &mut self.rng);

        session.current_question = question.clone();
        session.current_phase = phase;
        session.question_history.push(QuestionRecord {
            phase,
            question: question.clone(),
            time: Utc::now(),
        });

        acquirer.discard_pending();
        emit(command_tx, Command::AskQuestion { phase, question }).await?;
        Ok(Step::Evaluate)
    }

    async fn evaluate(
        &mut self,
        session: &mut Session,
        acquirer: &mut ResponseAcquirer,
        command_tx: &mpsc::Sender<Command>,
    ) -> Result<Step> {
        let started = Instant::now();
        let response = acquirer.wait_for_response(self.turn_budget).await;

        let (text, audio_features) = match response {
            Some(response) => {
                emit(command_tx, Command::ResponseHeard(response.text.clone())).await?;
                let features = match response.source {
                    ResponseSource::Voice => AudioFeatures::from_transcript(&response.text),
                    ResponseSource::Text => AudioFeatures::neutral(),
                };
                (response.text, features)
            }
            None => {
                tracing::warn!("Response timeout reached");
                emit(command_tx, Command::SpeakText(NO_RESPONSE_NOTICE.to_string())).await?;
                (NO_RESPONSE_TEXT.to_string(), AudioFeatures::neutral())
            }
        };
        let processing_time = started.elapsed().as_secs();
        tracing::debug!("Response processing time: {processing_time} seconds");

        let feedback = self
            .feedback_agent
            .analyze_response(&session.current_question, &text, &audio_features)
            .await;

        session.user_responses.push(ResponseRecord {
            text,
            audio_features,
            processing_time,
            timestamp: Utc::now(),
        });
        session.metrics.record(&feedback);
        session.feedback.push(feedback.clone());

        emit(command_tx, Command::Feedback(feedback)).await?;
        Ok(Step::ask(next_phase(&session.question_history)))
    }

    async fn close(
        &mut self,
        session: &mut Session,
        command_tx: &mpsc::Sender<Command>,
    ) -> Result<Step> {
        session.end_time = Some(Utc::now());
        session.current_phase = Phase::Closing;
        emit(command_tx, Command::SpeakText(CLOSING_MESSAGE.to_string())).await?;

        let summary = self.feedback_agent.generate_summary(session).await;
        let record = session.to_record(summary.clone());
        self.persist(&record).await;
        self.finished = Some(record);

        emit(command_tx, Command::Summary(summary)).await?;
        tracing::info!("Interview {} complete", session.interview_id);
        Ok(Step::Terminal)
    }

    /// Best-effort: failures are logged and never fail the session.
    async fn persist(&self, record: &InterviewRecord) {
        if let Err(e) = self.store.save_interview(record).await {
            tracing::error!("Failed to save interview {}: {e}", record.interview_id);
            return;
        }

        let profile = match self.store.load_profile(&record.user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::error!("Failed to load profile {}: {e}", record.user_id);
                return;
            }
        };
        let mut profile = profile.unwrap_or_else(|| UserProfile::new(record.user_id.clone()));
        profile.update_after_interview(record);
        if let Err(e) = self.store.save_profile(&profile).await {
            tracing::error!("Failed to update profile {}: {e}", record.user_id);
        }
    }
}

async fn emit(command_tx: &mpsc::Sender<Command>, command: Command) -> Result<()> {
    command_tx
        .send(command)
        .await
        .ok()
        .context("The transport stopped receiving interview events")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::TextResponder;
    use crate::reviewer::MockReviewer;
    use crate::store::FileInterviewStore;
    use crate::validator::DEFAULT_SUMMARY_SCORE;
    use anyhow::anyhow;
    use tempfile::TempDir;

    const FEEDBACK_JSON: &str = r#"{
        "feedback": "Clear and concise.",
        "metrics": {"clarity": 8, "technical_accuracy": 7, "communication": 9},
        "vocal_feedback": {
            "vocal_feedback": "Steady.",
            "vocal_metrics": {"pace": 6, "confidence": 7, "filler_words": 1},
            "vocal_suggestions": ["Pause before key points."]
        }
    }"#;

    fn history(intro: usize, technical: usize, behavioral: usize) -> Vec<QuestionRecord> {
        [
            (Phase::Intro, intro),
            (Phase::Technical, technical),
            (Phase::Behavioral, behavioral),
        ]
        .into_iter()
        .flat_map(|(phase, n)| {
            (0..n).map(move |_| QuestionRecord {
                phase,
                question: "q".to_string(),
                time: Utc::now(),
            })
        })
        .collect()
    }

    fn answering_reviewer() -> MockReviewer {
        let mut mock_reviewer = MockReviewer::new();
        mock_reviewer
            .expect_analyze_response()
            .times(7)
            .returning(|_, _, _| Box::pin(async { Ok(FEEDBACK_JSON.to_string()) }));
        mock_reviewer
            .expect_generate_summary()
            .times(1)
            .returning(|_| {
                Box::pin(async {
                    Ok(r#"{"score": 78, "overview": "Well done.", "strengths": ["Clarity"], "recommendations": ["Depth"]}"#.to_string())
                })
            });
        mock_reviewer
    }

    /// Answers every question it sees and collects all commands.
    fn spawn_candidate(
        mut command_rx: mpsc::Receiver<Command>,
        responder: Option<TextResponder>,
    ) -> tokio::task::JoinHandle<Vec<Command>> {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(command) = command_rx.recv().await {
                if let (Command::AskQuestion { question, .. }, Some(responder)) =
                    (&command, &responder)
                {
                    responder
                        .submit(format!("My answer to: {question}"))
                        .await
                        .unwrap();
                }
                seen.push(command);
            }
            seen
        })
    }

    #[test]
    fn phase_predicate_follows_quotas() {
        assert_eq!(next_phase(&history(0, 0, 0)), Phase::Intro);
        assert_eq!(next_phase(&history(1, 0, 0)), Phase::Intro);
        assert_eq!(next_phase(&history(2, 0, 0)), Phase::Technical);
        assert_eq!(next_phase(&history(2, 2, 0)), Phase::Technical);
        assert_eq!(next_phase(&history(2, 3, 0)), Phase::Behavioral);
        assert_eq!(next_phase(&history(2, 3, 2)), Phase::Closing);
    }

    #[tokio::test]
    async fn full_interview_runs_seven_turns_and_persists() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(FileInterviewStore::new(tmp.path()));
        let mut coach = InterviewCoach::new(
            Arc::new(answering_reviewer()),
            QuestionBank::builtin(),
            store.clone(),
        )
        .with_seed(11);

        let mut session = Session::new("user_1", "software_engineer", "mid");
        let (responder, mut acquirer) = ResponseAcquirer::channel(None);
        let (command_tx, command_rx) = mpsc::channel(8);
        let candidate = spawn_candidate(command_rx, Some(responder));

        let record = coach
            .run(&mut session, &mut acquirer, &command_tx)
            .await
            .expect("interview should complete");
        drop(command_tx);
        let commands = candidate.await.unwrap();

        assert_eq!(session.completed_turns(), 7);
        assert_eq!(session.question_history.len(), 7);
        assert_eq!(session.user_responses.len(), 7);
        for (name, series) in session.metrics.series() {
            assert_eq!(series.len(), 7, "{name}");
        }
        assert_eq!(session.metrics.clarity[0], 8.0);
        assert_eq!(session.metrics.filler_words[6], 1.0);

        let phases: Vec<Phase> = session.question_history.iter().map(|q| q.phase).collect();
        assert_eq!(
            phases,
            [
                Phase::Intro,
                Phase::Intro,
                Phase::Technical,
                Phase::Technical,
                Phase::Technical,
                Phase::Behavioral,
                Phase::Behavioral
            ]
        );
        assert!(session.user_responses[0].text.starts_with("My answer to: "));
        assert!(session.end_time.is_some());

        assert!(matches!(&commands[0], Command::SpeakText(t) if t.starts_with("Welcome to your software engineer mock interview")));
        assert!(matches!(commands.last(), Some(Command::Summary(s)) if s.score == 78.0));
        assert!(!commands.iter().any(|c| matches!(c, Command::Error(_))));

        assert_eq!(record.questions.len(), 7);
        let stored = store.load_interview(&record.interview_id).await.unwrap();
        assert_eq!(stored, Some(record));
        let profile = store.load_profile("user_1").await.unwrap().unwrap();
        assert_eq!(profile.interview_history.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_candidate_gets_sentinel_answers() {
        let tmp = TempDir::new().unwrap();
        let mut coach = InterviewCoach::new(
            Arc::new(answering_reviewer()),
            QuestionBank::builtin(),
            Arc::new(FileInterviewStore::new(tmp.path())),
        );

        let mut session = Session::new("user_1", "software_engineer", "junior");
        let (_responder, mut acquirer) = ResponseAcquirer::channel(None);
        let (command_tx, command_rx) = mpsc::channel(8);
        let candidate = spawn_candidate(command_rx, None);

        let started = Instant::now();
        coach
            .run(&mut session, &mut acquirer, &command_tx)
            .await
            .unwrap();
        drop(command_tx);
        let commands = candidate.await.unwrap();

        assert_eq!(started.elapsed(), TURN_BUDGET * 7);
        assert!(session.user_responses.iter().all(|r| r.text == NO_RESPONSE_TEXT));
        assert!(session.user_responses.iter().all(|r| r.processing_time == 60));
        let notices = commands
            .iter()
            .filter(|c| matches!(c, Command::SpeakText(t) if t == NO_RESPONSE_NOTICE))
            .count();
        assert_eq!(notices, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tailoring_apologizes_and_continues() {
        let mut mock_reviewer = answering_reviewer();
        mock_reviewer
            .expect_extract_skills()
            .times(1)
            .returning(|_| {
                Box::pin(async {
                    Ok(r#"{"skills": [], "tools": [], "technologies": []}"#.to_string())
                })
            });
        mock_reviewer
            .expect_tailor_questions()
            .times(5)
            .returning(|_, _, _| Box::pin(async { Err(anyhow!("upstream unavailable")) }));

        let tmp = TempDir::new().unwrap();
        let mut coach = InterviewCoach::new(
            Arc::new(mock_reviewer),
            QuestionBank::builtin(),
            Arc::new(FileInterviewStore::new(tmp.path())),
        );

        let mut session = Session::new("user_1", "software_engineer", "senior")
            .with_resume("Ten years of distributed systems work in Rust and C++.");
        let (responder, mut acquirer) = ResponseAcquirer::channel(None);
        let (command_tx, command_rx) = mpsc::channel(8);
        let candidate = spawn_candidate(command_rx, Some(responder));

        let record = coach.run(&mut session, &mut acquirer, &command_tx).await;
        drop(command_tx);
        let commands = candidate.await.unwrap();

        assert!(record.is_some());
        assert_eq!(session.resume_data, Some(ResumeData::default()));
        assert!(matches!(&commands[1], Command::SpeakText(t) if t == RESUME_FAILURE_NOTICE));
    }

    #[tokio::test]
    async fn tailored_questions_join_the_session_bank() {
        let mut mock_reviewer = MockReviewer::new();
        mock_reviewer
            .expect_extract_skills()
            .returning(|_| {
                Box::pin(async {
                    Ok(r#"{"skills": ["Rust"], "tools": ["Cargo"], "technologies": ["WebAssembly"]}"#.to_string())
                })
            });
        mock_reviewer
            .expect_tailor_questions()
            .returning(|_, _, _| {
                Box::pin(async { Ok(r#"{"questions": ["How did you ship Rust to WebAssembly?"]}"#.to_string()) })
            });

        let shared = QuestionBank::builtin();
        let tmp = TempDir::new().unwrap();
        let mut coach = InterviewCoach::new(
            Arc::new(mock_reviewer),
            shared.clone(),
            Arc::new(FileInterviewStore::new(tmp.path())),
        );
        let mut session = Session::new("user_1", "rust_engineer", "mid")
            .with_resume("Rust engineer shipping WebAssembly modules.");
        let (_responder, mut acquirer) = ResponseAcquirer::channel(None);
        let (command_tx, _command_rx) = mpsc::channel(8);

        let next = coach
            .step(Step::ResumeAnalysis, &mut session, &mut acquirer, &command_tx)
            .await
            .unwrap();
        assert_eq!(next, Step::AskIntro);
        assert_eq!(session.resume_data.as_ref().unwrap().skills, vec!["Rust"]);

        coach
            .step(Step::AskTechnical, &mut session, &mut acquirer, &command_tx)
            .await
            .unwrap();
        assert_eq!(session.current_question, "How did you ship Rust to WebAssembly?");
        assert!(!shared.contains("rust_engineer"));
    }

    #[tokio::test]
    async fn closed_transport_ends_the_run_without_persisting() {
        let mut mock_reviewer = MockReviewer::new();
        mock_reviewer.expect_generate_summary().never();

        let tmp = TempDir::new().unwrap();
        let store = Arc::new(FileInterviewStore::new(tmp.path()));
        let mut coach =
            InterviewCoach::new(Arc::new(mock_reviewer), QuestionBank::builtin(), store.clone());

        let mut session = Session::new("user_1", "software_engineer", "mid");
        let (_responder, mut acquirer) = ResponseAcquirer::channel(None);
        let (command_tx, command_rx) = mpsc::channel(8);
        drop(command_rx);

        assert!(coach.run(&mut session, &mut acquirer, &command_tx).await.is_none());
        assert!(session.feedback.is_empty());
        assert!(store.list_for_user("user_1").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn summary_failure_uses_default_summary() {
        let mut mock_reviewer = MockReviewer::new();
        mock_reviewer
            .expect_analyze_response()
            .returning(|_, _, _| Box::pin(async { Ok("not json".to_string()) }));
        mock_reviewer
            .expect_generate_summary()
            .times(3)
            .returning(|_| Box::pin(async { Err(anyhow!("timeout")) }));

        let tmp = TempDir::new().unwrap();
        let mut coach = InterviewCoach::new(
            Arc::new(mock_reviewer),
            QuestionBank::builtin(),
            Arc::new(FileInterviewStore::new(tmp.path())),
        )
        .with_turn_budget(Duration::from_secs(1));

        let mut session = Session::new("user_1", "software_engineer", "mid");
        let (_responder, mut acquirer) = ResponseAcquirer::channel(None);
        let (command_tx, command_rx) = mpsc::channel(8);
        let candidate = spawn_candidate(command_rx, None);

        let record = coach
            .run(&mut session, &mut acquirer, &command_tx)
            .await
            .unwrap();
        drop(command_tx);
        candidate.await.unwrap();

        assert_eq!(record.summary.score, DEFAULT_SUMMARY_SCORE);
        assert!(session.feedback.iter().all(|f| f.metrics.clarity == 5.0));
    }
}
