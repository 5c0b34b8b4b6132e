// src/stats.rs
//
// Quiz statistics assembly. Handlers fetch flat rows and hand them to
// `build_statistics`; everything here is pure so the aggregation rules
// (zero-denominator handling in particular) are unit-testable without a
// database. Every ratio with a possibly-zero denominator yields 0.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::collections::HashMap;

pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_TIMED_OUT: &str = "timed_out";

/// One attempt row, as fetched for aggregation.
#[derive(Debug, FromRow)]
pub struct AttemptStatRow {
    pub status: String,
    pub score: f64,
    pub passed: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
pub struct QuestionStatRow {
    pub id: i64,
    pub question_text: String,
    pub question_type: String,
    pub points: i32,
}

/// Per-question answer tallies among completed attempts.
#[derive(Debug, FromRow)]
pub struct AnswerCountRow {
    pub question_id: i64,
    pub total: i64,
    pub correct: i64,
}

/// Per-choice selection tallies among completed attempts.
#[derive(Debug, FromRow)]
pub struct ChoiceStatRow {
    pub id: i64,
    pub question_id: i64,
    pub choice_text: String,
    pub is_correct: bool,
    pub selection_count: i64,
}

/// Fixed score buckets: half-open below 100, closed at the top.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScoreDistribution {
    #[serde(rename = "0-20")]
    pub from_0_to_20: i64,
    #[serde(rename = "20-40")]
    pub from_20_to_40: i64,
    #[serde(rename = "40-60")]
    pub from_40_to_60: i64,
    #[serde(rename = "60-80")]
    pub from_60_to_80: i64,
    #[serde(rename = "80-100")]
    pub from_80_to_100: i64,
}

impl ScoreDistribution {
    fn add(&mut self, score: f64) {
        if score < 20.0 {
            self.from_0_to_20 += 1;
        } else if score < 40.0 {
            self.from_20_to_40 += 1;
        } else if score < 60.0 {
            self.from_40_to_60 += 1;
        } else if score < 80.0 {
            self.from_60_to_80 += 1;
        } else {
            self.from_80_to_100 += 1;
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChoiceStats {
    pub id: i64,
    pub text: String,
    pub is_correct: bool,
    pub selection_count: i64,
    pub selection_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct QuestionStats {
    pub id: i64,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: String,
    pub points: i32,
    pub total_answers: i64,
    pub correct_answers: i64,
    pub correct_rate: f64,
    pub choices: Vec<ChoiceStats>,
}

#[derive(Debug, Serialize)]
pub struct QuizStatistics {
    pub quiz_id: i64,
    pub quiz_title: String,
    pub total_attempts: i64,
    pub completed_attempts: i64,
    pub passed_attempts: i64,
    /// Percentage of completed attempts that passed.
    pub pass_rate: f64,
    /// Mean score over completed attempts, rounded to 2 decimal places.
    pub average_score: f64,
    /// Counted over all attempts, like the per-range tallies upstream.
    pub score_distribution: ScoreDistribution,
    /// Mean of (end_time - start_time) in seconds over completed attempts.
    pub average_completion_time: f64,
    pub questions: Vec<QuestionStats>,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn percent(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        round2(numerator as f64 / denominator as f64 * 100.0)
    }
}

pub fn build_statistics(
    quiz_id: i64,
    quiz_title: String,
    attempts: &[AttemptStatRow],
    questions: &[QuestionStatRow],
    answer_counts: &[AnswerCountRow],
    choices: &[ChoiceStatRow],
) -> QuizStatistics {
    let total_attempts = attempts.len() as i64;
    let completed: Vec<&AttemptStatRow> = attempts
        .iter()
        .filter(|a| a.status == STATUS_COMPLETED)
        .collect();
    let completed_attempts = completed.len() as i64;
    let passed_attempts = attempts.iter().filter(|a| a.passed).count() as i64;

    let average_score = if completed.is_empty() {
        0.0
    } else {
        round2(completed.iter().map(|a| a.score).sum::<f64>() / completed.len() as f64)
    };

    let mut score_distribution = ScoreDistribution::default();
    for attempt in attempts {
        score_distribution.add(attempt.score);
    }

    let timed: Vec<f64> = completed
        .iter()
        .filter_map(|a| a.end_time.map(|end| (end - a.start_time).num_milliseconds() as f64 / 1000.0))
        .collect();
    let average_completion_time = if timed.is_empty() {
        0.0
    } else {
        round2(timed.iter().sum::<f64>() / timed.len() as f64)
    };

    let counts: HashMap<i64, &AnswerCountRow> =
        answer_counts.iter().map(|c| (c.question_id, c)).collect();

    let question_stats = questions
        .iter()
        .map(|q| {
            let (total, correct) = counts
                .get(&q.id)
                .map(|c| (c.total, c.correct))
                .unwrap_or((0, 0));

            let objective = q.question_type != "short_answer";
            let choice_stats = if objective {
                choices
                    .iter()
                    .filter(|c| c.question_id == q.id)
                    .map(|c| ChoiceStats {
                        id: c.id,
                        text: c.choice_text.clone(),
                        is_correct: c.is_correct,
                        selection_count: c.selection_count,
                        selection_rate: percent(c.selection_count, total),
                    })
                    .collect()
            } else {
                Vec::new()
            };

            QuestionStats {
                id: q.id,
                text: q.question_text.clone(),
                question_type: q.question_type.clone(),
                points: q.points,
                total_answers: total,
                correct_answers: correct,
                correct_rate: percent(correct, total),
                choices: choice_stats,
            }
        })
        .collect();

    QuizStatistics {
        quiz_id,
        quiz_title,
        total_attempts,
        completed_attempts,
        passed_attempts,
        pass_rate: percent(passed_attempts, completed_attempts),
        average_score,
        score_distribution,
        average_completion_time,
        questions: question_stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn attempt(status: &str, score: f64, passed: bool, secs: Option<i64>) -> AttemptStatRow {
        let start = Utc::now();
        AttemptStatRow {
            status: status.to_string(),
            score,
            passed,
            start_time: start,
            end_time: secs.map(|s| start + TimeDelta::seconds(s)),
        }
    }

    #[test]
    fn test_empty_quiz_all_zero_no_nan() {
        let stats = build_statistics(1, "Quiz".into(), &[], &[], &[], &[]);
        assert_eq!(stats.total_attempts, 0);
        assert_eq!(stats.completed_attempts, 0);
        assert_eq!(stats.pass_rate, 0.0);
        assert_eq!(stats.average_score, 0.0);
        assert_eq!(stats.average_completion_time, 0.0);
        assert_eq!(stats.score_distribution, ScoreDistribution::default());
    }

    #[test]
    fn test_in_progress_attempts_excluded_from_averages() {
        let attempts = vec![
            attempt(STATUS_COMPLETED, 80.0, true, Some(120)),
            attempt(STATUS_COMPLETED, 40.0, false, Some(60)),
            attempt(STATUS_IN_PROGRESS, 0.0, false, None),
        ];
        let stats = build_statistics(1, "Quiz".into(), &attempts, &[], &[], &[]);
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.completed_attempts, 2);
        assert_eq!(stats.passed_attempts, 1);
        assert_eq!(stats.pass_rate, 50.0);
        assert_eq!(stats.average_score, 60.0);
        assert_eq!(stats.average_completion_time, 90.0);
        // Distribution covers all attempts, including the in-progress zero.
        assert_eq!(stats.score_distribution.from_0_to_20, 1);
        assert_eq!(stats.score_distribution.from_40_to_60, 1);
        assert_eq!(stats.score_distribution.from_80_to_100, 1);
    }

    #[test]
    fn test_distribution_bucket_edges() {
        let mut d = ScoreDistribution::default();
        for score in [0.0, 19.99, 20.0, 39.9, 40.0, 60.0, 79.9, 80.0, 100.0] {
            d.add(score);
        }
        assert_eq!(d.from_0_to_20, 2);
        assert_eq!(d.from_20_to_40, 2);
        assert_eq!(d.from_40_to_60, 1);
        assert_eq!(d.from_60_to_80, 2);
        assert_eq!(d.from_80_to_100, 2);
    }

    #[test]
    fn test_completion_time_skips_missing_end() {
        let attempts = vec![
            attempt(STATUS_COMPLETED, 50.0, false, Some(30)),
            attempt(STATUS_COMPLETED, 50.0, false, None),
        ];
        let stats = build_statistics(1, "Quiz".into(), &attempts, &[], &[], &[]);
        assert_eq!(stats.average_completion_time, 30.0);
    }

    #[test]
    fn test_question_and_choice_rates() {
        let questions = vec![
            QuestionStatRow {
                id: 1,
                question_text: "Q1".into(),
                question_type: "single_choice".into(),
                points: 10,
            },
            QuestionStatRow {
                id: 2,
                question_text: "Q2".into(),
                question_type: "short_answer".into(),
                points: 5,
            },
        ];
        let answer_counts = vec![AnswerCountRow {
            question_id: 1,
            total: 4,
            correct: 3,
        }];
        let choices = vec![
            ChoiceStatRow {
                id: 10,
                question_id: 1,
                choice_text: "A".into(),
                is_correct: true,
                selection_count: 3,
            },
            ChoiceStatRow {
                id: 11,
                question_id: 1,
                choice_text: "B".into(),
                is_correct: false,
                selection_count: 1,
            },
        ];
        let stats = build_statistics(1, "Quiz".into(), &[], &questions, &answer_counts, &choices);

        let q1 = &stats.questions[0];
        assert_eq!(q1.correct_rate, 75.0);
        assert_eq!(q1.choices.len(), 2);
        assert_eq!(q1.choices[0].selection_rate, 75.0);
        assert_eq!(q1.choices[1].selection_rate, 25.0);

        // Short answers carry no choice stats, and an unanswered question
        // divides by zero nowhere.
        let q2 = &stats.questions[1];
        assert_eq!(q2.total_answers, 0);
        assert_eq!(q2.correct_rate, 0.0);
        assert!(q2.choices.is_empty());
    }
}
