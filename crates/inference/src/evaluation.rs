//! Arithmetic scoring harness.
//!
//! Question files hold records of the form `<prompt>ANS<expected>` separated
//! by `"\nEND"`. Each prompt is completed by the model, the first number after
//! `=` in the completion is read back, and a squared relative error is summed
//! over all records.

use rand::Rng;
use tracing::{info, warn};

use crate::error::{InferenceError, Result};
use crate::generator::Generator;

pub const RECORD_SEPARATOR: &str = "\nEND";
pub const ANSWER_DELIMITER: &str = "ANS";
pub const STOP_SENTINEL: &str = "STOP";
/// Upper bound on the penalty charged for a single record.
pub const MAX_PENALTY: f64 = 50_000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct EvalRecord {
    /// Position of the record in the file, sentinel records included.
    pub index: usize,
    pub prompt: String,
    /// Raw answer field, kept for the generation budget.
    pub answer_field: String,
    pub expected: i64,
}

impl EvalRecord {
    /// Text fed to the model.
    pub fn model_input(&self) -> String {
        format!("\n{}", self.prompt)
    }

    /// Characters to generate: room for the echoed question and its answer.
    pub fn max_new_tokens(&self) -> usize {
        self.prompt.chars().count() + self.answer_field.chars().count() + 3
    }
}

pub fn parse_records(text: &str) -> Result<Vec<EvalRecord>> {
    let mut records = Vec::new();

    for (index, chunk) in text.split(RECORD_SEPARATOR).enumerate() {
        if chunk.trim().is_empty() {
            continue;
        }

        let mut parts = chunk.split(ANSWER_DELIMITER);
        let prompt = parts.next().unwrap_or_default();
        if prompt.trim() == STOP_SENTINEL {
            continue;
        }

        let answer_field = parts.next().ok_or_else(|| InferenceError::MalformedRecord {
            index,
            reason: format!("missing {} delimiter", ANSWER_DELIMITER),
        })?;
        let expected = answer_field
            .trim()
            .parse::<i64>()
            .map_err(|e| InferenceError::MalformedRecord {
                index,
                reason: format!("answer {:?} is not an integer: {}", answer_field.trim(), e),
            })?;

        records.push(EvalRecord {
            index,
            prompt: prompt.to_string(),
            answer_field: answer_field.to_string(),
            expected,
        });
    }

    Ok(records)
}

/// Number after the first `=`, ending at the next newline or `=`.
pub fn extract_answer(output: &str) -> Option<i64> {
    let (_, rest) = output.split_once('=')?;
    let line = rest.split('\n').next().unwrap_or_default();
    let field = line.split('=').next().unwrap_or_default();
    field.trim().parse().ok()
}

/// Squared error as a percentage of the squared expected value; absolute
/// squared error times 100 when the expected value is zero.
pub fn error_metric(expected: i64, actual: i64) -> f64 {
    let diff = (expected as f64 - actual as f64).powi(2);
    if expected == 0 {
        diff * 100.0
    } else {
        (diff / (expected as f64).powi(2)) * 100.0
    }
}

pub fn penalty(expected: i64, actual: i64) -> f64 {
    error_metric(expected, actual).min(MAX_PENALTY)
}

#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub index: usize,
    pub expected: i64,
    /// `None` when the completion held no readable answer.
    pub produced: Option<i64>,
    pub penalty: f64,
    pub output: String,
}

#[derive(Debug, Clone, Default)]
pub struct EvalReport {
    pub outcomes: Vec<RecordOutcome>,
    /// Sum of penalties; lower is better.
    pub score: f64,
}

pub struct Evaluator<'a> {
    generator: Generator<'a>,
}

impl<'a> Evaluator<'a> {
    pub fn new(generator: Generator<'a>) -> Self {
        Self { generator }
    }

    pub fn run<R: Rng + ?Sized>(&self, records: &[EvalRecord], rng: &mut R) -> Result<EvalReport> {
        let mut report = EvalReport::default();

        for record in records {
            let output = self
                .generator
                .complete(&record.model_input(), record.max_new_tokens(), rng)?;
            let outcome = score_output(record, output);

            report.score += outcome.penalty;
            match outcome.produced {
                Some(produced) => info!(
                    "record {} model score: {}, ans: {}, mod ans: {}",
                    record.index, report.score, record.expected, produced
                ),
                None => warn!(
                    "record {} model score: {}, ans: {}, no answer in {:?}",
                    record.index, report.score, record.expected, outcome.output
                ),
            }
            report.outcomes.push(outcome);
        }

        Ok(report)
    }
}

/// Score one completion against its record.
pub fn score_output(record: &EvalRecord, output: String) -> RecordOutcome {
    let produced = extract_answer(&output);
    let penalty = match produced {
        Some(actual) => penalty(record.expected, actual),
        None => MAX_PENALTY,
    };

    RecordOutcome {
        index: record.index,
        expected: record.expected,
        produced,
        penalty,
        output,
    }
}
