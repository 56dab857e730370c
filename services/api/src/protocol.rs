//! JSON frames exchanged with browser clients.

use interview_core::Command;
use interview_core::session_state::Phase;
use interview_core::validator::{Feedback, Summary};
use serde::{Deserialize, Serialize};

pub const ACK_MESSAGE: &str = "Response received";

fn default_interview_type() -> String {
    "software_engineer".to_string()
}

fn default_level() -> String {
    "mid".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    StartInterview {
        #[serde(default = "default_interview_type")]
        interview_type: String,
        #[serde(default = "default_level")]
        level: String,
        #[serde(default)]
        resume_text: String,
    },
    Response {
        response: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Message { message: String },
    Question { question: String, phase: Phase },
    Feedback { feedback: Feedback },
    Summary { summary: Summary },
    Error { message: String },
    Ack { message: String },
}

impl ServerMessage {
    pub fn ack() -> Self {
        ServerMessage::Ack {
            message: ACK_MESSAGE.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// The frame for a coach command. The echo of a heard response has none.
    pub fn from_command(command: Command) -> Option<Self> {
        match command {
            Command::SpeakText(message) => Some(ServerMessage::Message { message }),
            Command::AskQuestion { phase, question } => {
                Some(ServerMessage::Question { question, phase })
            }
            Command::ResponseHeard(_) => None,
            Command::Feedback(feedback) => Some(ServerMessage::Feedback { feedback }),
            Command::Summary(summary) => Some(ServerMessage::Summary { summary }),
            Command::Error(message) => Some(ServerMessage::Error { message }),
        }
    }

    /// The summary is the last frame of an interview.
    pub fn ends_interview(&self) -> bool {
        matches!(self, ServerMessage::Summary { .. })
    }
}
