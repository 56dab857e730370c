use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Why a voice listen produced no answer.
///
/// `NoSpeech` and `Unintelligible` are ordinary outcomes of a quiet or noisy
/// turn. `Device` and `Transcription` are faults, but they still only take
/// the voice source out of the current race.
#[derive(Debug, Error)]
pub enum ListenError {
    #[error("no speech detected")]
    NoSpeech,
    #[error("speech could not be understood")]
    Unintelligible,
    #[error("audio device error: {0}")]
    Device(String),
    #[error("transcription failed: {0}")]
    Transcription(String),
}

/// A bounded speech-to-text listen.
///
/// Implementations must release their audio resources when the returned
/// future is dropped, since the losing branch of a race is dropped mid-listen.
#[async_trait]
pub trait VoiceListener: Send + Sync {
    async fn listen(&self, budget: Duration) -> Result<String, ListenError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Text,
    Voice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub text: String,
    pub source: ResponseSource,
}

/// The transport's handle for injecting typed answers.
#[derive(Debug, Clone)]
pub struct TextResponder {
    tx: mpsc::Sender<String>,
}

impl TextResponder {
    pub async fn submit(&self, text: impl Into<String>) -> Result<()> {
        self.tx
            .send(text.into())
            .await
            .map_err(|_| anyhow!("The interview is no longer accepting responses"))
    }

    /// Same as [`submit`](Self::submit), for threads outside the runtime.
    ///
    /// Panics if called from within an async context.
    pub fn blocking_submit(&self, text: impl Into<String>) -> Result<()> {
        self.tx
            .blocking_send(text.into())
            .map_err(|_| anyhow!("The interview is no longer accepting responses"))
    }
}

/// Races typed answers against an optional voice listener, one turn at a time.
pub struct ResponseAcquirer {
    text_rx: mpsc::Receiver<String>,
    voice: Option<Arc<dyn VoiceListener>>,
}

impl ResponseAcquirer {
    /// Creates the acquirer and the responder that feeds it.
    ///
    /// Pass `None` to run text-only.
    pub fn channel(voice: Option<Arc<dyn VoiceListener>>) -> (TextResponder, ResponseAcquirer) {
        let (tx, text_rx) = mpsc::channel(16);
        (TextResponder { tx }, ResponseAcquirer { text_rx, voice })
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice.is_some()
    }

    /// Drops answers that arrived while no question was open.
    ///
    /// Call before a question is delivered, so a late answer to the previous
    /// question cannot be taken for the new one.
    pub fn discard_pending(&mut self) {
        while let Ok(stale) = self.text_rx.try_recv() {
            tracing::debug!("Discarding response submitted between turns: {stale}");
        }
    }

    /// Returns the first answer from either source, or `None` once `budget`
    /// runs out.
    ///
    /// Blank answers are ignored. A voice listen that fails or hears nothing
    /// leaves the text source to finish the race alone. The losing branch is
    /// dropped as soon as a winner is known.
    pub async fn wait_for_response(&mut self, budget: Duration) -> Option<Response> {
        let text_rx = &mut self.text_rx;
        let text = async move {
            loop {
                match text_rx.recv().await {
                    Some(text) if !text.trim().is_empty() => return text.trim().to_string(),
                    Some(_) => tracing::debug!("Ignoring blank response"),
                    None => {
                        tracing::debug!("Response channel closed, waiting on other sources");
                        return std::future::pending().await;
                    }
                }
            }
        };

        let voice = self.voice.clone();
        let spoken = async move {
            let Some(listener) = voice else {
                return std::future::pending().await;
            };
            match listener.listen(budget).await {
                Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
                Ok(_) => {
                    tracing::debug!("Voice listen returned an empty transcript");
                    std::future::pending().await
                }
                Err(e @ (ListenError::NoSpeech | ListenError::Unintelligible)) => {
                    tracing::debug!("No voice answer: {e}");
                    std::future::pending().await
                }
                Err(e) => {
                    tracing::warn!("Voice listen failed: {e}");
                    std::future::pending().await
                }
            }
        };

        let race = async {
            tokio::select! {
                text = text => Response { text, source: ResponseSource::Text },
                text = spoken => Response { text, source: ResponseSource::Voice },
            }
        };

        match tokio::time::timeout(budget, race).await {
            Ok(response) => {
                tracing::debug!("Received {:?} response: {}", response.source, response.text);
                Some(response)
            }
            Err(_) => {
                tracing::info!("No response within {}s", budget.as_secs());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::{Instant, sleep};

    const BUDGET: Duration = Duration::from_secs(60);

    /// Stands in for an open microphone stream.
    struct StreamGuard(Arc<AtomicBool>);

    impl Drop for StreamGuard {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    struct ScriptedListener {
        delay: Duration,
        reply: Option<&'static str>,
        released: Arc<AtomicBool>,
    }

    impl ScriptedListener {
        fn new(delay: Duration, reply: Option<&'static str>) -> (Arc<Self>, Arc<AtomicBool>) {
            let released = Arc::new(AtomicBool::new(false));
            let listener = Arc::new(Self {
                delay,
                reply,
                released: released.clone(),
            });
            (listener, released)
        }
    }

    #[async_trait]
    impl VoiceListener for ScriptedListener {
        async fn listen(&self, _budget: Duration) -> Result<String, ListenError> {
            let _stream = StreamGuard(self.released.clone());
            sleep(self.delay).await;
            self.reply
                .map(str::to_string)
                .ok_or(ListenError::NoSpeech)
        }
    }

    fn submit_after(responder: TextResponder, delay: Duration, text: &'static str) {
        tokio::spawn(async move {
            sleep(delay).await;
            responder.submit(text).await.unwrap();
        });
    }

    #[tokio::test(start_paused = true)]
    async fn typed_answer_wins_and_voice_is_released() {
        let (listener, released) = ScriptedListener::new(Duration::from_secs(3600), None);
        let (responder, mut acquirer) = ResponseAcquirer::channel(Some(listener));
        submit_after(responder, Duration::from_secs(2), "I would use a hash map.");

        let started = Instant::now();
        let response = acquirer.wait_for_response(BUDGET).await.unwrap();

        assert_eq!(response.text, "I would use a hash map.");
        assert_eq!(response.source, ResponseSource::Text);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert!(released.load(Ordering::SeqCst), "voice stream should be closed");
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_within_budget_is_none() {
        let (listener, _released) = ScriptedListener::new(Duration::from_secs(3600), None);
        let (_responder, mut acquirer) = ResponseAcquirer::channel(Some(listener));

        let started = Instant::now();
        assert_eq!(acquirer.wait_for_response(BUDGET).await, None);
        assert_eq!(started.elapsed(), BUDGET);
    }

    #[tokio::test(start_paused = true)]
    async fn no_speech_does_not_end_the_race() {
        let (listener, _released) = ScriptedListener::new(Duration::from_secs(1), None);
        let (responder, mut acquirer) = ResponseAcquirer::channel(Some(listener));
        submit_after(responder, Duration::from_secs(5), "typed later");

        let response = acquirer.wait_for_response(BUDGET).await.unwrap();
        assert_eq!(response.text, "typed later");
    }

    #[tokio::test(start_paused = true)]
    async fn spoken_answer_wins() {
        let (listener, _released) =
            ScriptedListener::new(Duration::from_secs(3), Some(" I led the migration. "));
        let (responder, mut acquirer) = ResponseAcquirer::channel(Some(listener));
        submit_after(responder, Duration::from_secs(10), "too late");

        let response = acquirer.wait_for_response(BUDGET).await.unwrap();
        assert_eq!(response.text, "I led the migration.");
        assert_eq!(response.source, ResponseSource::Voice);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_and_blank_answers_are_ignored() {
        let (responder, mut acquirer) = ResponseAcquirer::channel(None);
        responder.submit("answer to the previous question").await.unwrap();
        acquirer.discard_pending();
        submit_after(responder.clone(), Duration::from_secs(1), "   ");
        submit_after(responder, Duration::from_secs(4), "fresh answer");

        let started = Instant::now();
        let response = acquirer.wait_for_response(BUDGET).await.unwrap();

        assert_eq!(response.text, "fresh answer");
        assert_eq!(started.elapsed(), Duration::from_secs(4));
        assert!(!acquirer.voice_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_responder_times_out() {
        let (responder, mut acquirer) = ResponseAcquirer::channel(None);
        drop(responder);

        assert_eq!(acquirer.wait_for_response(Duration::from_secs(5)).await, None);
    }
}
