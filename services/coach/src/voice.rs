//! Microphone answers: capture until the candidate pauses, then transcribe.
//!
//! The cpal stream lives on its own thread for the length of one listen. The
//! thread stops as soon as the listen future is dropped, which is what
//! happens when a typed answer wins the race.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use interview_core::acquisition::{ListenError, VoiceListener};
use interview_core::reviewer::ReviewerSettings;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// RMS level above which a chunk counts as speech.
pub const ENERGY_THRESHOLD: f32 = 0.01;
/// Silence after speech that ends the answer.
pub const PAUSE: Duration = Duration::from_secs(1);

const POLL: Duration = Duration::from_millis(100);

/// Tracks speech and trailing silence over a mono sample stream.
pub struct SpeechDetector {
    sample_rate: u32,
    samples: Vec<f32>,
    speaking: bool,
    silent_samples: usize,
}

impl SpeechDetector {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            samples: Vec::new(),
            speaking: false,
            silent_samples: 0,
        }
    }

    /// Feeds one chunk. Returns `true` once speech has been followed by a
    /// full pause.
    pub fn push(&mut self, chunk: &[f32]) -> bool {
        if chunk.is_empty() {
            return false;
        }

        if rms(chunk) >= ENERGY_THRESHOLD {
            self.speaking = true;
            self.silent_samples = 0;
        } else if self.speaking {
            self.silent_samples += chunk.len();
        }

        if self.speaking {
            self.samples.extend_from_slice(chunk);
        }
        self.speaking
            && self.silent_samples as f64 >= PAUSE.as_secs_f64() * self.sample_rate as f64
    }

    /// The recorded speech, or `None` if nobody spoke.
    pub fn finish(self) -> Option<Vec<f32>> {
        self.speaking.then_some(self.samples)
    }
}

fn rms(chunk: &[f32]) -> f32 {
    (chunk.iter().map(|s| s * s).sum::<f32>() / chunk.len() as f32).sqrt()
}

/// Encodes mono samples as a 16-bit PCM WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample((sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

struct Recording {
    samples: Vec<f32>,
    sample_rate: u32,
}

/// Stops the capture thread when dropped.
struct CaptureGuard(Arc<AtomicBool>);

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn device_error(e: impl std::fmt::Display) -> ListenError {
    ListenError::Device(e.to_string())
}

fn transcription_error(e: impl std::fmt::Display) -> ListenError {
    ListenError::Transcription(e.to_string())
}

fn default_input() -> Result<Device, ListenError> {
    let host = cpal::default_host();
    tracing::debug!("Host: {:?}", host.id());
    host.default_input_device()
        .ok_or_else(|| ListenError::Device("no default input device".to_string()))
}

/// Converts interleaved device samples to mono `f32`.
fn downmix<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: Sample,
    f32: cpal::FromSample<T>,
{
    if channels > 1 {
        data.chunks(channels)
            .map(|c| c.iter().map(|s| s.to_sample::<f32>()).sum::<f32>() / c.len() as f32)
            .collect()
    } else {
        data.iter().map(|s| s.to_sample::<f32>()).collect()
    }
}

fn input_stream<T>(
    device: &Device,
    config: &StreamConfig,
    tx: std::sync::mpsc::Sender<Vec<f32>>,
) -> Result<Stream, ListenError>
where
    T: SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let channels = config.channels as usize;
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // The receiver is gone once capture has finished.
                let _ = tx.send(downmix(data, channels));
            },
            move |err| tracing::error!("An error occurred on input stream: {}", err),
            None,
        )
        .map_err(device_error)
}

/// Records from the default input until a pause, `budget`, or `stop`.
fn capture(budget: Duration, stop: Arc<AtomicBool>) -> Result<Recording, ListenError> {
    let device = default_input()?;
    let supported = device.default_input_config().map_err(device_error)?;
    let sample_format = supported.sample_format();
    let sample_rate = supported.sample_rate().0;
    let config: StreamConfig = supported.into();
    tracing::debug!("Input stream config: {:?} ({:?})", &config, sample_format);

    let (tx, rx) = std::sync::mpsc::channel::<Vec<f32>>();
    let stream = match sample_format {
        SampleFormat::F32 => input_stream::<f32>(&device, &config, tx)?,
        SampleFormat::I16 => input_stream::<i16>(&device, &config, tx)?,
        SampleFormat::U16 => input_stream::<u16>(&device, &config, tx)?,
        other => {
            return Err(ListenError::Device(format!(
                "unsupported input sample format {other:?}"
            )));
        }
    };
    stream.play().map_err(device_error)?;

    let mut detector = SpeechDetector::new(sample_rate);
    let deadline = Instant::now() + budget;
    while !stop.load(Ordering::SeqCst) && Instant::now() < deadline {
        match rx.recv_timeout(POLL) {
            Ok(chunk) => {
                if detector.push(&chunk) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ListenError::Device("input stream ended".to_string()));
            }
        }
    }
    drop(stream);

    detector
        .finish()
        .map(|samples| Recording {
            samples,
            sample_rate,
        })
        .ok_or(ListenError::NoSpeech)
}

/// Listens on the default microphone and transcribes through an
/// OpenAI-compatible `/audio/transcriptions` endpoint.
pub struct MicrophoneListener {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl MicrophoneListener {
    pub fn new(settings: ReviewerSettings, model: impl Into<String>) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            client,
            api_key: settings.api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    async fn transcribe(&self, recording: Recording) -> Result<String, ListenError> {
        let wav = encode_wav(&recording.samples, recording.sample_rate).map_err(transcription_error)?;
        let part = Part::bytes(wav)
            .file_name("answer.wav")
            .mime_str("audio/wav")
            .map_err(transcription_error)?;
        let form = Form::new().text("model", self.model.clone()).part("file", part);

        let body: serde_json::Value = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(transcription_error)?
            .error_for_status()
            .map_err(transcription_error)?
            .json()
            .await
            .map_err(transcription_error)?;

        let text = body
            .get("text")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .trim();
        if text.is_empty() {
            return Err(ListenError::Unintelligible);
        }
        tracing::info!("Candidate said: \"{}\"", text);
        Ok(text.to_string())
    }
}

#[async_trait]
impl VoiceListener for MicrophoneListener {
    async fn listen(&self, budget: Duration) -> Result<String, ListenError> {
        let stop = Arc::new(AtomicBool::new(false));
        let _guard = CaptureGuard(stop.clone());
        let (tx, rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("microphone".to_string())
            .spawn(move || {
                let _ = tx.send(capture(budget, stop));
            })
            .map_err(device_error)?;

        let recording = rx
            .await
            .map_err(|_| ListenError::Device("capture thread exited".to_string()))??;
        self.transcribe(recording).await
    }
}
