use interview_core::Command;
use interview_core::acquisition::ResponseAcquirer;
use interview_core::coach::{InterviewCoach, Step, next_phase};
use interview_core::offline_reviewer::OfflineReviewer;
use interview_core::question_bank::QuestionBank;
use interview_core::session_state::{Phase, Session};
use interview_core::store::{FileInterviewStore, InterviewStore};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

#[tokio::test]
async fn offline_interview_reaches_closing_after_seven_turns() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FileInterviewStore::new(tmp.path()));
    let mut coach = InterviewCoach::new(
        Arc::new(OfflineReviewer),
        QuestionBank::builtin(),
        store.clone(),
    )
    .with_seed(2024);

    let mut session = Session::new("candidate_42", "software_engineer", "mid").with_resume("");
    let (responder, mut acquirer) = ResponseAcquirer::channel(None);
    let (command_tx, mut command_rx) = mpsc::channel(32);

    // Plays the candidate: answers each question as soon as it is asked.
    let candidate = tokio::spawn(async move {
        let mut questions = 0;
        let mut summary = None;
        while let Some(command) = command_rx.recv().await {
            match command {
                Command::AskQuestion { question, .. } => {
                    questions += 1;
                    responder
                        .submit(format!(
                            "For '{question}' I would start from the requirements, \
                             explain the trade-offs I considered and give an example from my last project."
                        ))
                        .await
                        .unwrap();
                }
                Command::Summary(s) => summary = Some(s),
                Command::Error(e) => panic!("interview failed: {e}"),
                _ => {}
            }
        }
        (questions, summary)
    });

    // Step manually so the state after the seventh evaluation can be checked.
    let mut step = Step::Init;
    let mut evaluations = 0;
    while step != Step::Closing {
        step = coach
            .step(step, &mut session, &mut acquirer, &command_tx)
            .await
            .unwrap();
        if session.feedback.len() > evaluations {
            evaluations = session.feedback.len();
            assert_eq!(session.question_history.len(), evaluations);
            assert_eq!(session.user_responses.len(), evaluations);
            for (name, series) in session.metrics.series() {
                assert_eq!(series.len(), evaluations, "{name} out of step");
            }
        }
    }
    assert_eq!(evaluations, 7);
    assert_eq!(next_phase(&session.question_history), Phase::Closing);
    assert!(session.resume_data.is_none());

    let next = coach
        .step(Step::Closing, &mut session, &mut acquirer, &command_tx)
        .await
        .unwrap();
    assert_eq!(next, Step::Terminal);
    drop(command_tx);

    let (questions, summary) = candidate.await.unwrap();
    assert_eq!(questions, 7);
    let summary = summary.expect("a summary is emitted at closing");
    assert!((0.0..=100.0).contains(&summary.score));
    assert!(!summary.overview.is_empty());

    let history = store.list_for_user("candidate_42").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].interview_id, session.interview_id);

    let record = store
        .load_interview(&session.interview_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.questions.len(), 7);
    assert_eq!(record.summary, summary);
}
