use crate::session_state::Phase;
use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const BUILTIN_TYPE: &str = "software_engineer";

/// Question pools for one interview type.
///
/// Technical questions are split by level (`junior`, `mid`, `senior`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterviewBank {
    #[serde(default)]
    pub intro: Vec<String>,
    #[serde(default)]
    pub technical: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub behavioral: Vec<String>,
}

impl InterviewBank {
    /// The pool a question for `phase` is drawn from. Closing has none.
    pub fn pool(&self, phase: Phase, level: &str) -> Option<&[String]> {
        match phase {
            Phase::Intro => Some(self.intro.as_slice()),
            Phase::Technical => self.technical.get(level).map(Vec::as_slice),
            Phase::Behavioral => Some(self.behavioral.as_slice()),
            Phase::Closing => None,
        }
    }
}

/// The fixed question asked when no registered pool can supply one.
pub fn generic_question(phase: Phase) -> &'static str {
    match phase {
        Phase::Intro => "Tell me about yourself.",
        Phase::Technical => "Explain a technical concept.",
        Phase::Behavioral => "Describe a challenging situation.",
        Phase::Closing => "Is there anything you would like to ask me?",
    }
}

/// Interview type -> question pools.
///
/// Each session works on its own clone, so tailored questions merged in for
/// one candidate never leak into the shared bank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionBank {
    banks: HashMap<String, InterviewBank>,
}

impl QuestionBank {
    /// The bank that ships with the coach.
    pub fn builtin() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let software_engineer = InterviewBank {
            intro: strings(&[
                "Tell me about yourself.",
                "Why do you want to work in software engineering?",
            ]),
            technical: HashMap::from([
                (
                    "junior".to_string(),
                    strings(&["What is a list in Python?", "Explain APIs."]),
                ),
                (
                    "mid".to_string(),
                    strings(&[
                        "Explain the difference between a list and a tuple in Python.",
                        "How would you optimize a slow SQL query?",
                    ]),
                ),
                (
                    "senior".to_string(),
                    strings(&[
                        "Design a scalable microservices architecture.",
                        "Explain the CAP theorem.",
                    ]),
                ),
            ]),
            behavioral: strings(&[
                "Describe a time you faced a challenging bug.",
                "Tell me about a team project.",
            ]),
        };

        let mut bank = Self::default();
        bank.insert(BUILTIN_TYPE, software_engineer);
        bank
    }

    /// The built-in bank plus every `*.json` file in `dir`, keyed by file stem.
    ///
    /// A missing directory yields just the built-in bank. Files that cannot
    /// be read or parsed are skipped with a warning.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut bank = Self::builtin();
        if !dir.is_dir() {
            tracing::info!(
                "Question bank directory {} not found, using built-in questions",
                dir.display()
            );
            return Ok(bank);
        }

        for entry in fs::read_dir(dir)
            .with_context(|| format!("Failed to read question bank directory: {}", dir.display()))?
        {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match Self::read_bank_file(&path) {
                Ok(interview_bank) => {
                    tracing::debug!("Loaded question bank: {stem}");
                    bank.insert(stem, interview_bank);
                }
                Err(e) => tracing::warn!("Failed to load question bank {}: {e:#}", path.display()),
            }
        }

        Ok(bank)
    }

    fn read_bank_file(path: &Path) -> Result<InterviewBank> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
    }

    pub fn insert(&mut self, interview_type: &str, bank: InterviewBank) {
        self.banks.insert(interview_type.to_string(), bank);
    }

    pub fn contains(&self, interview_type: &str) -> bool {
        self.banks.contains_key(interview_type)
    }

    pub fn get(&self, interview_type: &str) -> Option<&InterviewBank> {
        self.banks.get(interview_type)
    }

    pub fn interview_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.banks.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Picks one question uniformly at random for the given phase.
    ///
    /// Falls back to [`generic_question`] when the type is not registered or
    /// the pool for this phase and level is missing or empty.
    pub fn choose<R: Rng + ?Sized>(
        &self,
        interview_type: &str,
        phase: Phase,
        level: &str,
        rng: &mut R,
    ) -> String {
        let pool = self
            .banks
            .get(interview_type)
            .and_then(|bank| bank.pool(phase, level))
            .filter(|pool| !pool.is_empty());

        match pool {
            Some(pool) => pool[rng.random_range(0..pool.len())].clone(),
            None => {
                tracing::debug!(
                    "No {phase} questions for {interview_type}/{level}, using generic question"
                );
                generic_question(phase).to_string()
            }
        }
    }

    /// Adds resume-tailored questions to the technical pool for `level`.
    ///
    /// An unregistered type gets a minimal bank of its own.
    pub fn merge_tailored(&mut self, interview_type: &str, level: &str, questions: Vec<String>) {
        let bank = self
            .banks
            .entry(interview_type.to_string())
            .or_insert_with(|| InterviewBank {
                intro: vec![generic_question(Phase::Intro).to_string()],
                technical: HashMap::new(),
                behavioral: vec!["Describe a challenging situation you faced at work.".to_string()],
            });
        bank.technical
            .entry(level.to_string())
            .or_default()
            .extend(questions);
    }
}
