use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest time a single question may be allotted.
pub const MIN_QUESTION_SECONDS: u32 = 30;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuestionError {
    #[error("Invalid option letter: {0:?}")]
    InvalidLetter(String),
    #[error("Question {id} has no text for option {letter}")]
    MissingOption { id: String, letter: OptionLetter },
    #[error("Question {0} has an empty prompt")]
    EmptyPrompt(String),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OptionLetter {
    A,
    B,
    C,
    D,
}

impl OptionLetter {
    pub const ALL: [OptionLetter; 4] = [OptionLetter::A, OptionLetter::B, OptionLetter::C, OptionLetter::D];

    pub fn index(self) -> usize {
        match self {
            OptionLetter::A => 0,
            OptionLetter::B => 1,
            OptionLetter::C => 2,
            OptionLetter::D => 3,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            OptionLetter::A => 'A',
            OptionLetter::B => 'B',
            OptionLetter::C => 'C',
            OptionLetter::D => 'D',
        }
    }
}

impl fmt::Display for OptionLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for OptionLetter {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(OptionLetter::A),
            "B" => Ok(OptionLetter::B),
            "C" => Ok(OptionLetter::C),
            "D" => Ok(OptionLetter::D),
            _ => Err(QuestionError::InvalidLetter(s.to_string())),
        }
    }
}

/// A multiple-choice question as used during a session. Never mutated once loaded.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub options: [String; 4],
    pub correct: OptionLetter,
    pub subject: String,
    pub duration_secs: u32,
}

impl Question {
    pub fn option(&self, letter: OptionLetter) -> &str {
        &self.options[letter.index()]
    }

    pub fn is_correct(&self, answer: Option<OptionLetter>) -> bool {
        answer == Some(self.correct)
    }
}

/// Question bank row, shaped the way the backend stores it.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QuestionRecord {
    pub id: String,
    pub question: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,
    pub correct_option: String,
    pub subject: String,
    #[serde(default)]
    pub discipline: Option<String>,
    /// The bank's `timing` column. Missing timings fall back to the minimum.
    #[serde(default, alias = "timing")]
    pub timing_minutes: f64,
}

impl TryFrom<QuestionRecord> for Question {
    type Error = QuestionError;

    fn try_from(record: QuestionRecord) -> Result<Self, Self::Error> {
        if record.question.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt(record.id));
        }

        let correct = record.correct_option.parse::<OptionLetter>()?;
        let options = [record.option_a, record.option_b, record.option_c, record.option_d];

        for letter in OptionLetter::ALL {
            if options[letter.index()].trim().is_empty() {
                return Err(QuestionError::MissingOption { id: record.id, letter });
            }
        }

        Ok(Question {
            id: record.id,
            prompt: record.question,
            options,
            correct,
            subject: record.subject.trim().to_string(),
            duration_secs: duration_from_minutes(record.timing_minutes),
        })
    }
}

/// Converts the bank's per-question timing (minutes) to whole seconds,
/// rounding down and never going below [`MIN_QUESTION_SECONDS`].
pub fn duration_from_minutes(minutes: f64) -> u32 {
    if !minutes.is_finite() || minutes <= 0.0 {
        return MIN_QUESTION_SECONDS;
    }

    let seconds = (minutes * 60.0).floor().min(u32::MAX as f64) as u32;
    seconds.max(MIN_QUESTION_SECONDS)
}

pub fn total_duration(questions: &[Question]) -> u64 {
    questions.iter().map(|q| q.duration_secs as u64).sum()
}

/// Turns bank rows into a session question set. Rows that fail conversion are
/// skipped; a non-empty `subcategories` list keeps only matching subjects.
pub fn build_question_set(records: Vec<QuestionRecord>, subcategories: &[String]) -> Vec<Question> {
    records
        .into_iter()
        .filter_map(|record| {
            let id = record.id.clone();
            match Question::try_from(record) {
                Ok(question) => Some(question),
                Err(e) => {
                    warn!("⚠️ Skipping malformed question {}: {}", id, e);
                    None
                }
            }
        })
        .filter(|q| {
            subcategories.is_empty()
                || subcategories.iter().any(|s| s.trim().eq_ignore_ascii_case(&q.subject))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, subject: &str, correct: &str, minutes: f64) -> QuestionRecord {
        QuestionRecord {
            id: id.to_string(),
            question: format!("Prompt {}", id),
            option_a: "one".to_string(),
            option_b: "two".to_string(),
            option_c: "three".to_string(),
            option_d: "four".to_string(),
            correct_option: correct.to_string(),
            subject: subject.to_string(),
            discipline: Some("engineering".to_string()),
            timing_minutes: minutes,
        }
    }

    #[test]
    fn test_duration_floors_at_thirty_seconds() {
        assert_eq!(duration_from_minutes(0.25), 30);
        assert_eq!(duration_from_minutes(0.0), 30);
        assert_eq!(duration_from_minutes(-3.0), 30);
        assert_eq!(duration_from_minutes(f64::NAN), 30);
        assert_eq!(duration_from_minutes(1.0), 60);
        assert_eq!(duration_from_minutes(1.51), 90);
    }

    #[test]
    fn test_letter_parsing_is_case_insensitive() {
        assert_eq!(" c ".parse::<OptionLetter>().unwrap(), OptionLetter::C);
        assert_eq!("a".parse::<OptionLetter>().unwrap(), OptionLetter::A);
        assert!("E".parse::<OptionLetter>().is_err());
        assert!("AB".parse::<OptionLetter>().is_err());
    }

    #[test]
    fn test_build_question_set_skips_malformed_and_filters_subjects() {
        let mut missing_option = record("q3", "Physics", "A", 1.0);
        missing_option.option_c = "  ".to_string();

        let records = vec![
            record("q1", "Physics", "b", 2.0),
            record("q2", "Chemistry", "Z", 1.0),
            missing_option,
            record("q4", "Maths", "D", 0.1),
        ];

        let all = build_question_set(records.clone(), &[]);
        assert_eq!(all.iter().map(|q| q.id.as_str()).collect::<Vec<_>>(), vec!["q1", "q4"]);
        assert_eq!(all[0].correct, OptionLetter::B);
        assert_eq!(all[1].duration_secs, 30);

        let physics = build_question_set(records, &["physics".to_string()]);
        assert_eq!(physics.len(), 1);
        assert_eq!(physics[0].id, "q1");
        assert_eq!(total_duration(&physics), 120);
    }
}
