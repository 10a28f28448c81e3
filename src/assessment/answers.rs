use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{OptionLetter, Question};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Question index {index} is out of range (question count: {len})")]
pub struct SlotOutOfRange {
    pub index: usize,
    pub len: usize,
}

/// One answer slot per question, indexed by question position.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AnswerLog {
    slots: Vec<Option<OptionLetter>>,
}

impl AnswerLog {
    pub fn new(question_count: usize) -> Self {
        Self {
            slots: vec![None; question_count],
        }
    }

    pub fn from_slots(slots: Vec<Option<OptionLetter>>) -> Self {
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Records (or overwrites) a selection. Returns the previous selection.
    pub fn select(&mut self, index: usize, letter: OptionLetter) -> Result<Option<OptionLetter>, SlotOutOfRange> {
        let len = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or(SlotOutOfRange { index, len })?;
        Ok(slot.replace(letter))
    }

    pub fn get(&self, index: usize) -> Option<OptionLetter> {
        self.slots.get(index).copied().flatten()
    }

    pub fn answered_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn slots(&self) -> &[Option<OptionLetter>] {
        &self.slots
    }
}

/// Correct-answer tally per subject, in order of first appearance.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SubjectScores {
    pub scores: IndexMap<String, u32>,
    /// Reserved for attempts ended by a proctoring violation.
    pub terminated: bool,
}

impl SubjectScores {
    pub fn for_questions(questions: &[Question]) -> Self {
        let mut scores = IndexMap::new();
        for question in questions {
            scores.entry(question.subject.clone()).or_insert(0);
        }
        Self {
            scores,
            terminated: false,
        }
    }

    pub fn record_correct(&mut self, subject: &str) {
        *self.scores.entry(subject.to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, subject: &str) -> u32 {
        self.scores.get(subject).copied().unwrap_or(0)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ScoreCard {
    pub score: u32,
    pub question_count: u32,
    pub subject_scores: SubjectScores,
}

/// Scores every slot against its question's key. Unanswered and missing
/// slots count as incorrect.
pub fn score_answers(questions: &[Question], answers: &AnswerLog) -> ScoreCard {
    let mut subject_scores = SubjectScores::for_questions(questions);
    let mut score = 0;

    for (index, question) in questions.iter().enumerate() {
        if question.is_correct(answers.get(index)) {
            score += 1;
            subject_scores.record_correct(&question.subject);
        }
    }

    ScoreCard {
        score,
        question_count: questions.len() as u32,
        subject_scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, subject: &str, correct: OptionLetter) -> Question {
        Question {
            id: id.to_string(),
            prompt: format!("Prompt {}", id),
            options: ["w".into(), "x".into(), "y".into(), "z".into()],
            correct,
            subject: subject.to_string(),
            duration_secs: 60,
        }
    }

    #[test]
    fn test_score_counts_only_matching_slots() {
        let questions = vec![
            question("1", "Algebra", OptionLetter::A),
            question("2", "Geometry", OptionLetter::B),
            question("3", "Algebra", OptionLetter::C),
            question("4", "Geometry", OptionLetter::D),
            question("5", "Statistics", OptionLetter::A),
        ];
        let answers = AnswerLog::from_slots(vec![
            Some(OptionLetter::A),
            Some(OptionLetter::C),
            None,
            Some(OptionLetter::D),
            None,
        ]);

        let card = score_answers(&questions, &answers);
        assert_eq!(card.score, 2);
        assert_eq!(card.question_count, 5);
        assert_eq!(card.subject_scores.get("Algebra"), 1);
        assert_eq!(card.subject_scores.get("Geometry"), 1);
        assert_eq!(card.subject_scores.get("Statistics"), 0);
        assert_eq!(
            card.subject_scores.scores.keys().collect::<Vec<_>>(),
            vec!["Algebra", "Geometry", "Statistics"]
        );
    }

    #[test]
    fn test_short_answer_log_counts_missing_slots_as_wrong() {
        let questions = vec![question("1", "Algebra", OptionLetter::A), question("2", "Algebra", OptionLetter::A)];
        let card = score_answers(&questions, &AnswerLog::from_slots(vec![Some(OptionLetter::A)]));
        assert_eq!(card.score, 1);
    }

    #[test]
    fn test_select_overwrites_and_rejects_out_of_range() {
        let mut log = AnswerLog::new(2);
        assert_eq!(log.select(0, OptionLetter::B).unwrap(), None);
        assert_eq!(log.select(0, OptionLetter::D).unwrap(), Some(OptionLetter::B));
        assert_eq!(log.get(0), Some(OptionLetter::D));
        assert_eq!(log.answered_count(), 1);
        assert_eq!(log.select(2, OptionLetter::A), Err(SlotOutOfRange { index: 2, len: 2 }));
    }

    #[test]
    fn test_subject_scores_json_shape() {
        let mut scores = SubjectScores::for_questions(&[question("1", "Algebra", OptionLetter::A)]);
        scores.record_correct("Algebra");
        let json: serde_json::Value = serde_json::from_str(&scores.to_json().unwrap()).unwrap();
        assert_eq!(json["scores"]["Algebra"], 1);
        assert_eq!(json["terminated"], false);
    }
}
