//! Engagement score formula.
//!
//! Version `length-completion/v1`:
//!
//! ```text
//! C     = clamp(completion_rate_percent / 100, 0.01, 0.99)
//! T     = main-story hours
//! score = 400 * (T / (T + 10)) * C^1.3
//! ```
//!
//! Longer games and more widely finished campaigns score higher. Missing
//! inputs are replaced by fixed defaults (50% completion, 10 hours) and every
//! substitution is written to the notes. Any change to the constants below
//! must come with a new `METHOD` tag so stored scores stay interpretable.

/// Formula version stored with every score.
pub const METHOD: &str = "length-completion/v1";

const SCALE: f64 = 400.0;
const LENGTH_HALF_POINT_HOURS: f64 = 10.0;
const LENGTH_EXPONENT: f64 = 1.0;
const COMPLETION_EXPONENT: f64 = 1.3;
const MIN_COMPLETION: f64 = 0.01;
const MAX_COMPLETION: f64 = 0.99;

pub const DEFAULT_COMPLETION_PERCENT: f64 = 50.0;
pub const DEFAULT_MAIN_STORY_HOURS: f64 = 10.0;

/// What the scorer knows about the main-story completion achievement.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionSignal {
    Identified {
        name: String,
        completion_rate: Option<f64>,
    },
    NotIdentified {
        reason: String,
    },
    /// Classification failed, so the answer is unknown rather than "none".
    Unavailable {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreInputs {
    pub completion: CompletionSignal,
    pub main_story_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub score: f64,
    pub method: &'static str,
    /// One entry per defaulted input. Empty when every input was present.
    pub notes: Vec<String>,
}

impl ScoreOutcome {
    pub fn notes_text(&self) -> Option<String> {
        if self.notes.is_empty() {
            None
        } else {
            Some(self.notes.join("; "))
        }
    }
}

fn completion_fraction(completion: &CompletionSignal, notes: &mut Vec<String>) -> f64 {
    let default_note = format!("used default completion rate {}%", DEFAULT_COMPLETION_PERCENT);
    let percent = match completion {
        CompletionSignal::Identified {
            completion_rate: Some(rate),
            ..
        } if rate.is_finite() => *rate,
        CompletionSignal::Identified { name, .. } => {
            notes.push(format!("completion rate missing for '{}'; {}", name, default_note));
            DEFAULT_COMPLETION_PERCENT
        }
        CompletionSignal::NotIdentified { reason } => {
            notes.push(format!(
                "main-story completion achievement not identified ({}); {}",
                reason, default_note
            ));
            DEFAULT_COMPLETION_PERCENT
        }
        CompletionSignal::Unavailable { reason } => {
            notes.push(format!(
                "main-story completion achievement unavailable ({}); {}",
                reason, default_note
            ));
            DEFAULT_COMPLETION_PERCENT
        }
    };
    (percent / 100.0).clamp(MIN_COMPLETION, MAX_COMPLETION)
}

fn main_story_hours(hours: Option<f64>, notes: &mut Vec<String>) -> f64 {
    match hours {
        Some(h) if h.is_finite() && h > 0.0 => h,
        Some(h) => {
            notes.push(format!(
                "main-story time invalid ({}); used default {}h",
                h, DEFAULT_MAIN_STORY_HOURS
            ));
            DEFAULT_MAIN_STORY_HOURS
        }
        None => {
            notes.push(format!(
                "main-story time not found; used default {}h",
                DEFAULT_MAIN_STORY_HOURS
            ));
            DEFAULT_MAIN_STORY_HOURS
        }
    }
}

pub fn score(inputs: &ScoreInputs) -> ScoreOutcome {
    let mut notes = Vec::new();
    let completion = completion_fraction(&inputs.completion, &mut notes);
    let hours = main_story_hours(inputs.main_story_hours, &mut notes);

    let length_factor = (hours / (hours + LENGTH_HALF_POINT_HOURS)).powf(LENGTH_EXPONENT);
    let completion_factor = completion.powf(COMPLETION_EXPONENT);

    ScoreOutcome {
        score: SCALE * length_factor * completion_factor,
        method: METHOD,
        notes,
    }
}
