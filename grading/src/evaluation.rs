//! Evaluation record: schema, validation, and the derived total score.
//!
//! `score_total` is a closed-form function of the rubric, so it is never read
//! from model output. [`EvaluationResponse::new`] computes it; there is no other
//! way to build a record.
//!
//! ```text
//! score_total = clamp(round_half_even(100 * (c + m + a + s) / 40), 0, 100)
//! ```

use schemars::JsonSchema;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Placeholder `id` used when the model omits one.
pub const DEFAULT_EVALUATION_ID: &str = "run_demo";

/// Upper bound of every rubric sub-score.
pub const RUBRIC_MAX: i64 = 10;

/// Sum of all four sub-scores at their maximum.
const RUBRIC_TOTAL_MAX: u32 = 40;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("LLM output validation failed: {0}")]
    Invalid(String),

    #[error("LLM output validation failed: rubric.{field} = {value} is outside 0..=10")]
    OutOfRange { field: &'static str, value: i64 },
}

/// Four independently scored dimensions, each in `0..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
pub struct Rubric {
    #[schemars(range(min = 0, max = 10))]
    correctness: u8,
    #[schemars(range(min = 0, max = 10))]
    completeness: u8,
    #[schemars(range(min = 0, max = 10))]
    analysis_quality: u8,
    #[schemars(range(min = 0, max = 10))]
    structure: u8,
}

impl Rubric {
    /// Bounds-check each sub-score. Out-of-range values are rejected, not clamped.
    pub fn new(
        correctness: i64,
        completeness: i64,
        analysis_quality: i64,
        structure: i64,
    ) -> Result<Self, SchemaError> {
        Ok(Self {
            correctness: bounded("correctness", correctness)?,
            completeness: bounded("completeness", completeness)?,
            analysis_quality: bounded("analysis_quality", analysis_quality)?,
            structure: bounded("structure", structure)?,
        })
    }

    pub fn correctness(&self) -> u8 {
        self.correctness
    }

    pub fn completeness(&self) -> u8 {
        self.completeness
    }

    pub fn analysis_quality(&self) -> u8 {
        self.analysis_quality
    }

    pub fn structure(&self) -> u8 {
        self.structure
    }

    /// Sum of the four sub-scores (`0..=40`).
    pub fn total_points(&self) -> u32 {
        u32::from(self.correctness)
            + u32::from(self.completeness)
            + u32::from(self.analysis_quality)
            + u32::from(self.structure)
    }

    /// Percentage of the maximum rubric points, rounded half to even.
    pub fn score_total(&self) -> u8 {
        let scaled = self.total_points() * 100;
        let quotient = scaled / RUBRIC_TOTAL_MAX;
        let remainder = scaled % RUBRIC_TOTAL_MAX;

        let rounded = if remainder * 2 > RUBRIC_TOTAL_MAX
            || (remainder * 2 == RUBRIC_TOTAL_MAX && quotient % 2 == 1)
        {
            quotient + 1
        } else {
            quotient
        };

        // min(100) keeps the conversion lossless.
        rounded.min(100) as u8
    }
}

fn bounded(field: &'static str, value: i64) -> Result<u8, SchemaError> {
    if (0..=RUBRIC_MAX).contains(&value) {
        Ok(value as u8)
    } else {
        Err(SchemaError::OutOfRange { field, value })
    }
}

/// Validated, internally consistent evaluation of one notebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct EvaluationResponse {
    #[schemars(default = "default_id")]
    id: String,
    filename: String,
    /// Overall score as percentage of max rubric points (40).
    #[schemars(range(min = 0, max = 100))]
    score_total: u8,
    rubric: Rubric,
    /// Short machine-readable tags, e.g. `missing: data_description`.
    #[schemars(default)]
    issues: Vec<String>,
    /// Actionable feedback items for the student.
    #[schemars(default)]
    feedback: Vec<String>,
}

impl EvaluationResponse {
    /// Build a record; `score_total` is derived from `rubric`.
    pub fn new(
        id: impl Into<String>,
        filename: impl Into<String>,
        rubric: Rubric,
        issues: Vec<String>,
        feedback: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            score_total: rubric.score_total(),
            rubric,
            issues,
            feedback,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn score_total(&self) -> u8 {
        self.score_total
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    pub fn issues(&self) -> &[String] {
        &self.issues
    }

    pub fn feedback(&self) -> &[String] {
        &self.feedback
    }
}

impl TryFrom<Map<String, Value>> for EvaluationResponse {
    type Error = SchemaError;

    fn try_from(object: Map<String, Value>) -> Result<Self, Self::Error> {
        validate(object)
    }
}

fn default_id() -> String {
    DEFAULT_EVALUATION_ID.to_string()
}

/// Wire shape accepted from the model. Unknown fields (including any
/// `score_total`) are ignored.
#[derive(Debug, Deserialize)]
struct RawEvaluation {
    #[serde(default = "default_id")]
    id: String,
    filename: String,
    rubric: RawRubric,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    feedback: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawRubric {
    #[serde(deserialize_with = "integral")]
    correctness: i64,
    #[serde(deserialize_with = "integral")]
    completeness: i64,
    #[serde(deserialize_with = "integral")]
    analysis_quality: i64,
    #[serde(deserialize_with = "integral")]
    structure: i64,
}

/// Accept `8`, `8.0` and `"8"` as 8. Fractional numbers and non-numeric
/// strings are rejected; range is checked later by [`Rubric::new`].
fn integral<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => {
            if let Some(value) = number.as_i64() {
                return Ok(value);
            }
            match number.as_f64() {
                Some(value) if value.is_finite() && value.fract() == 0.0 => Ok(value as i64),
                _ => Err(de::Error::custom(format!(
                    "expected an integer, got {number}"
                ))),
            }
        }
        Value::String(text) => text.trim().parse::<i64>().map_err(|_| {
            de::Error::custom(format!("expected an integer, got string {text:?}"))
        }),
        other => Err(de::Error::custom(format!("expected an integer, got {other}"))),
    }
}

/// Validate a model-produced object into an [`EvaluationResponse`].
///
/// `filename` and `rubric` are required; `id`, `issues` and `feedback` fall
/// back to defaults when absent.
pub fn validate(object: Map<String, Value>) -> Result<EvaluationResponse, SchemaError> {
    let raw: RawEvaluation = serde_json::from_value(Value::Object(object))
        .map_err(|e| SchemaError::Invalid(e.to_string()))?;

    let rubric = Rubric::new(
        raw.rubric.correctness,
        raw.rubric.completeness,
        raw.rubric.analysis_quality,
        raw.rubric.structure,
    )?;

    Ok(EvaluationResponse::new(
        raw.id,
        raw.filename,
        rubric,
        raw.issues,
        raw.feedback,
    ))
}

/// JSON schema of [`EvaluationResponse`], attached to every grading request.
pub fn evaluation_schema() -> Value {
    serde_json::to_value(schemars::schema_for!(EvaluationResponse))
        .expect("evaluation schema should serialize")
}
