//! Tutoring curriculum
//!
//! The curriculum is either the fixed five-unit list or, when configured,
//! synthesized by the backend as JSON. A synthesized curriculum that does not
//! parse into exactly five usable units is replaced by the fixed one.

use crate::state_machine::state::Unit;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of units in every curriculum
pub const UNIT_COUNT: usize = 5;

/// The only topic currently offered
pub const TOPIC: &str = "Prompt Engineering";

/// How the curriculum is produced once the learner states their level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurriculumPolicy {
    /// Always the hardcoded five units
    #[default]
    Fixed,
    /// Ask the backend, fall back to the hardcoded units on parse failure
    Synthesized,
}

impl fmt::Display for CurriculumPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CurriculumPolicy::Fixed => "fixed",
            CurriculumPolicy::Synthesized => "synthesized",
        })
    }
}

impl FromStr for CurriculumPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(CurriculumPolicy::Fixed),
            "synthesized" | "generated" => Ok(CurriculumPolicy::Synthesized),
            other => Err(format!("unknown curriculum policy '{other}'")),
        }
    }
}

/// The hardcoded Prompt Engineering curriculum
pub fn fixed_curriculum() -> Vec<Unit> {
    vec![
        Unit::new(
            "Introduction to Prompt Engineering",
            "Understanding the fundamentals of prompt engineering and its importance",
            "Welcome to your prompt engineering learning journey! We'll start with the basics.",
        ),
        Unit::new(
            "Writing Effective Prompts",
            "Learn techniques for writing clear and specific prompts",
            "Now we'll learn how to write prompts that get the results you want.",
        ),
        Unit::new(
            "Using Context in Prompts",
            "Master the use of context to improve response quality",
            "We'll dive deep into how to use context to make your prompts more accurate.",
        ),
        Unit::new(
            "Advanced Prompt Engineering Techniques",
            "Learn advanced techniques like Chain of Thought",
            "Time to learn the advanced techniques that experts use.",
        ),
        Unit::new(
            "Practical Applications and Projects",
            "Apply what you've learned to real-world projects",
            "We'll conclude by applying everything you've learned to practical projects.",
        ),
    ]
}

#[derive(Debug, Error, PartialEq)]
pub enum CurriculumError {
    #[error("no JSON array found in backend output")]
    NoJsonArray,
    #[error("curriculum JSON did not parse: {0}")]
    Json(String),
    #[error("expected 5 units, got {0}")]
    WrongUnitCount(usize),
    #[error("unit {0} is missing a title or objective")]
    IncompleteUnit(usize),
}

#[derive(Debug, Deserialize)]
struct RawUnit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    objective: String,
    #[serde(default, alias = "welcome", alias = "intro")]
    intro_text: String,
}

/// Parse a synthesized curriculum.
///
/// Accepts a bare JSON array, or an array surrounded by prose or a fenced
/// code block (the first `[` to the last `]`).
pub fn parse_curriculum(output: &str) -> Result<Vec<Unit>, CurriculumError> {
    let start = output.find('[').ok_or(CurriculumError::NoJsonArray)?;
    let end = output.rfind(']').ok_or(CurriculumError::NoJsonArray)?;
    if end < start {
        return Err(CurriculumError::NoJsonArray);
    }

    let array = output.get(start..=end).ok_or(CurriculumError::NoJsonArray)?;
    let raw: Vec<RawUnit> =
        serde_json::from_str(array).map_err(|e| CurriculumError::Json(e.to_string()))?;

    if raw.len() != UNIT_COUNT {
        return Err(CurriculumError::WrongUnitCount(raw.len()));
    }

    raw.into_iter()
        .enumerate()
        .map(|(i, unit)| {
            let title = unit.title.trim();
            let objective = unit.objective.trim();
            if title.is_empty() || objective.is_empty() {
                return Err(CurriculumError::IncompleteUnit(i));
            }
            Ok(Unit::new(title, objective, unit.intro_text.trim()))
        })
        .collect()
}

/// Parse a synthesized curriculum, substituting the fixed one on failure.
/// The error is returned alongside so the caller can report the fallback.
pub fn resolve_synthesized(output: &str) -> (Vec<Unit>, Option<CurriculumError>) {
    match parse_curriculum(output) {
        Ok(units) => (units, None),
        Err(e) => (fixed_curriculum(), Some(e)),
    }
}
