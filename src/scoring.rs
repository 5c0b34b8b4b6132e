// src/scoring.rs
//
// Pure scoring rules for the assessment engine. The asymmetry is
// intentional instructional design and must not be "fixed": single-choice
// and true/false are all-or-nothing on exact match, multiple-choice earns
// partial credit with a penalty for wrong selections.

use std::collections::HashSet;

/// An answer counts as correct once it earns at least this share of the
/// question's points.
pub const CORRECT_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

impl QuestionType {
    pub fn parse(s: &str) -> Option<QuestionType> {
        match s {
            "single_choice" => Some(QuestionType::SingleChoice),
            "multiple_choice" => Some(QuestionType::MultipleChoice),
            "true_false" => Some(QuestionType::TrueFalse),
            "short_answer" => Some(QuestionType::ShortAnswer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::ShortAnswer => "short_answer",
        }
    }

    /// Auto-gradable from selected choices.
    pub fn is_objective(&self) -> bool {
        !matches!(self, QuestionType::ShortAnswer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Graded {
    pub score: f64,
    pub is_correct: bool,
}

/// Scores an objective selection against the question's correct-choice set.
///
/// * single_choice / true_false: full points iff the selection matches the
///   correct set exactly, otherwise zero.
/// * multiple_choice: `max(0, |S∩C|/|C| − |S\C|/|C|) × points`, correct
///   once the score reaches half the points. An empty correct set is
///   degenerate quiz data and scores zero.
pub fn score_selection(
    question_type: QuestionType,
    points: i32,
    correct: &HashSet<i64>,
    selected: &HashSet<i64>,
) -> Graded {
    let points = points as f64;
    match question_type {
        QuestionType::SingleChoice | QuestionType::TrueFalse => {
            let is_correct = !correct.is_empty() && selected == correct;
            Graded {
                score: if is_correct { points } else { 0.0 },
                is_correct,
            }
        }
        QuestionType::MultipleChoice => {
            if correct.is_empty() {
                return Graded {
                    score: 0.0,
                    is_correct: false,
                };
            }
            let correct_selected = selected.intersection(correct).count() as f64;
            let incorrect_selected = selected.difference(correct).count() as f64;
            let total = correct.len() as f64;
            let fraction = (correct_selected / total - incorrect_selected / total).max(0.0);
            let score = points * fraction;
            Graded {
                score,
                is_correct: score >= points * CORRECT_THRESHOLD,
            }
        }
        QuestionType::ShortAnswer => Graded {
            score: 0.0,
            is_correct: false,
        },
    }
}

/// Applies a manual grade to a short answer: clamps the raw score into
/// [0, points] and derives is_correct from the half-points threshold.
pub fn grade_manual(points: i32, raw_score: f64) -> Graded {
    let points = points as f64;
    let score = raw_score.clamp(0.0, points);
    Graded {
        score,
        is_correct: score >= points * CORRECT_THRESHOLD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[i64]) -> HashSet<i64> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_single_choice_exact_match() {
        let correct = set(&[1]);

        let g = score_selection(QuestionType::SingleChoice, 10, &correct, &set(&[1]));
        assert_eq!(g.score, 10.0);
        assert!(g.is_correct);

        let g = score_selection(QuestionType::SingleChoice, 10, &correct, &set(&[2]));
        assert_eq!(g.score, 0.0);
        assert!(!g.is_correct);
    }

    #[test]
    fn test_single_choice_overselection_fails() {
        // Selecting the right choice plus a wrong one is not an exact match.
        let correct = set(&[1]);
        let g = score_selection(QuestionType::SingleChoice, 10, &correct, &set(&[1, 2]));
        assert_eq!(g.score, 0.0);
        assert!(!g.is_correct);
    }

    #[test]
    fn test_true_false_binary() {
        let correct = set(&[7]);
        let g = score_selection(QuestionType::TrueFalse, 5, &correct, &set(&[7]));
        assert_eq!(g.score, 5.0);
        assert!(g.is_correct);

        let g = score_selection(QuestionType::TrueFalse, 5, &correct, &set(&[8]));
        assert_eq!(g.score, 0.0);
    }

    #[test]
    fn test_multiple_choice_partial_credit() {
        // correct = {A, B, C}, selecting {A, B}: 2/3 of the points, correct.
        let correct = set(&[1, 2, 3]);
        let g = score_selection(QuestionType::MultipleChoice, 10, &correct, &set(&[1, 2]));
        assert!((g.score - 10.0 * 2.0 / 3.0).abs() < 1e-9);
        assert!(g.is_correct);
    }

    #[test]
    fn test_multiple_choice_penalty_cancels_out() {
        // {A, D}: one right, one wrong, fraction max(0, 1/3 - 1/3) = 0.
        let correct = set(&[1, 2, 3]);
        let g = score_selection(QuestionType::MultipleChoice, 10, &correct, &set(&[1, 4]));
        assert_eq!(g.score, 0.0);
        assert!(!g.is_correct);
    }

    #[test]
    fn test_multiple_choice_penalty_never_negative() {
        let correct = set(&[1, 2]);
        let g = score_selection(
            QuestionType::MultipleChoice,
            10,
            &correct,
            &set(&[3, 4, 5]),
        );
        assert_eq!(g.score, 0.0);
    }

    #[test]
    fn test_multiple_choice_exact_full_points() {
        let correct = set(&[1, 2, 3]);
        let g = score_selection(QuestionType::MultipleChoice, 9, &correct, &set(&[1, 2, 3]));
        assert_eq!(g.score, 9.0);
        assert!(g.is_correct);
    }

    #[test]
    fn test_multiple_choice_empty_correct_set() {
        let g = score_selection(QuestionType::MultipleChoice, 10, &set(&[]), &set(&[1]));
        assert_eq!(g.score, 0.0);
        assert!(!g.is_correct);
    }

    #[test]
    fn test_multiple_choice_threshold_boundary() {
        // correct = {A, B}, selecting {A}: exactly half the points -> correct.
        let correct = set(&[1, 2]);
        let g = score_selection(QuestionType::MultipleChoice, 10, &correct, &set(&[1]));
        assert_eq!(g.score, 5.0);
        assert!(g.is_correct);
    }

    #[test]
    fn test_short_answer_starts_unscored() {
        let g = score_selection(QuestionType::ShortAnswer, 10, &set(&[]), &set(&[]));
        assert_eq!(g.score, 0.0);
        assert!(!g.is_correct);
    }

    #[test]
    fn test_grade_manual_clamps() {
        assert_eq!(grade_manual(10, 15.0).score, 10.0);
        assert_eq!(grade_manual(10, -3.0).score, 0.0);
        assert_eq!(grade_manual(10, 7.5).score, 7.5);
    }

    #[test]
    fn test_grade_manual_threshold() {
        assert!(grade_manual(10, 5.0).is_correct);
        assert!(!grade_manual(10, 4.9).is_correct);
        assert!(grade_manual(10, 10.0).is_correct);
        assert!(!grade_manual(10, 0.0).is_correct);
    }

    #[test]
    fn test_question_type_parse_round_trip() {
        for s in ["single_choice", "multiple_choice", "true_false", "short_answer"] {
            assert_eq!(QuestionType::parse(s).unwrap().as_str(), s);
        }
        assert!(QuestionType::parse("essay").is_none());
    }
}
