pub mod acquisition;
pub mod analysis;
pub mod coach;
pub mod feedback;
pub mod offline_reviewer;
pub mod profile;
pub mod prompts;
pub mod question_bank;
pub mod resume;
pub mod retry;
pub mod reviewer;
pub mod session_state;
pub mod store;
pub mod validator;

use session_state::Phase;
use validator::{Feedback, Summary};

/// Represents the events the interview core (`InterviewCoach`) emits to the transport.
///
/// This enum decouples the phase machine's decisions from how the runtime
/// delivers them (console printing, WebSocket frames, speech synthesis).
/// Commands are delivered in emission order for a single session.
#[derive(Debug, Clone)]
pub enum Command {
    /// Conversational text from the coach: welcome, notices, closing remarks.
    SpeakText(String),
    /// A new interview question for the given phase.
    AskQuestion { phase: Phase, question: String },
    /// The answer that was captured for the current question.
    ResponseHeard(String),
    /// Validated feedback for the turn that just completed.
    Feedback(Feedback),
    /// The end-of-session report. No further commands follow it.
    Summary(Summary),
    /// A step failed; the run has ended without reaching closing.
    Error(String),
}
