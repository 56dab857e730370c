use serde::{Deserialize, Serialize};

const FILLER_WORDS: &[&str] = &["um", "uh", "ah", "er", "like"];
const FILLER_PHRASES: &[(&str, &str)] = &[("you", "know"), ("i", "mean")];

/// Rough delivery estimates for one answer.
///
/// Only answers that were actually spoken get real estimates; typed answers
/// and missed turns carry neutral values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub word_count: usize,
    pub filler_words: usize,
    pub pace: f64,
    pub confidence: f64,
    pub estimated_tone: String,
}

impl AudioFeatures {
    pub fn neutral() -> Self {
        Self {
            word_count: 0,
            filler_words: 0,
            pace: 5.0,
            confidence: 5.0,
            estimated_tone: "neutral".to_string(),
        }
    }

    /// Estimates delivery features from a transcribed answer.
    pub fn from_transcript(text: &str) -> Self {
        let words: Vec<String> = text
            .split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|w| !w.is_empty())
            .collect();

        let single = words
            .iter()
            .filter(|w| FILLER_WORDS.contains(&w.as_str()))
            .count();
        let phrases = words
            .windows(2)
            .filter(|pair| {
                FILLER_PHRASES
                    .iter()
                    .any(|(a, b)| pair[0] == *a && pair[1] == *b)
            })
            .count();
        let filler_words = single + phrases;
        let word_count = words.len();

        let pace = ((word_count as f64 / 10.0) * 6.0).floor().clamp(1.0, 10.0);
        let confidence = (10.0 - filler_words as f64 * 2.0).clamp(1.0, 10.0);

        Self {
            word_count,
            filler_words,
            pace,
            confidence,
            estimated_tone: "neutral".to_string(),
        }
    }
}

impl Default for AudioFeatures {
    fn default() -> Self {
        Self::neutral()
    }
}
