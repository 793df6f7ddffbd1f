use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;

/// Ordered `(lower bound inclusive, letter)` pairs, highest first.
pub const GRADE_BOUNDARIES: &[(f64, &str)] = &[
    (97.0, "A+"),
    (93.0, "A"),
    (90.0, "A-"),
    (87.0, "B+"),
    (83.0, "B"),
    (80.0, "B-"),
    (77.0, "C+"),
    (73.0, "C"),
    (70.0, "C-"),
    (67.0, "D+"),
    (65.0, "D"),
];

pub const FAILING_LETTER: &str = "F";

const TREND_THRESHOLD: f64 = 5.0;
const TREND_MIN_POINTS: usize = 3;
const WEIGHT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentCategory {
    pub id: String,
    pub name: String,
    pub percentage_weight: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub id: String,
    pub category_id: Option<String>,
    pub max_score: f64,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub assessment_id: String,
    pub student_id: String,
    pub raw_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAverage {
    pub category_id: String,
    pub category_name: String,
    pub weight: f64,
    pub average: f64,
    pub weighted_contribution: f64,
    pub assessment_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GradeStatus {
    Graded,
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalGradeResult {
    pub final_percentage: f64,
    pub letter_grade: &'static str,
    pub total_weight_used: f64,
    pub breakdown_by_category: Vec<CategoryAverage>,
    pub is_complete: bool,
    pub status: GradeStatus,
}

impl FinalGradeResult {
    pub fn no_data() -> Self {
        Self {
            final_percentage: 0.0,
            letter_grade: FAILING_LETTER,
            total_weight_used: 0.0,
            breakdown_by_category: Vec::new(),
            is_complete: false,
            status: GradeStatus::NoData,
        }
    }

    pub fn has_data(&self) -> bool {
        self.status == GradeStatus::Graded
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub improving: bool,
    pub consistent: bool,
    pub declining: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_third_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_third_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference: Option<f64>,
}

/// Contract violations by the caller. Missing data is never one of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GradeError {
    #[error("category {category_id} has weight {weight}, expected a value in (0, 100]")]
    InvalidWeight { category_id: String, weight: f64 },
    #[error("assessment {assessment_id} has max score {max_score}, expected a value above 0")]
    InvalidMaxScore { assessment_id: String, max_score: f64 },
    #[error(
        "score {raw_score} for assessment {assessment_id} is outside [0, {max_score}]"
    )]
    ScoreOutOfRange {
        assessment_id: String,
        student_id: String,
        raw_score: f64,
        max_score: f64,
    },
}

impl GradeError {
    pub fn details(&self) -> serde_json::Value {
        match self {
            GradeError::InvalidWeight {
                category_id,
                weight,
            } => json!({ "categoryId": category_id, "weight": weight }),
            GradeError::InvalidMaxScore {
                assessment_id,
                max_score,
            } => json!({ "assessmentId": assessment_id, "maxScore": max_score }),
            GradeError::ScoreOutOfRange {
                assessment_id,
                student_id,
                raw_score,
                max_score,
            } => json!({
                "assessmentId": assessment_id,
                "studentId": student_id,
                "rawScore": raw_score,
                "maxScore": max_score,
            }),
        }
    }
}

/// Half-up rounding to 2 decimals: `Int(100*x + 0.5) / 100`.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

pub fn letter_grade(percentage: f64) -> &'static str {
    GRADE_BOUNDARIES
        .iter()
        .find(|(lower, _)| percentage >= *lower)
        .map(|(_, letter)| *letter)
        .unwrap_or(FAILING_LETTER)
}

pub fn validate_weight(category_id: &str, weight: f64) -> Result<(), GradeError> {
    if weight > 0.0 && weight <= 100.0 {
        return Ok(());
    }
    Err(GradeError::InvalidWeight {
        category_id: category_id.to_string(),
        weight,
    })
}

pub fn validate_score(
    assessment: &Assessment,
    score: &ScoreRecord,
) -> Result<(), GradeError> {
    if !(assessment.max_score > 0.0 && assessment.max_score.is_finite()) {
        return Err(GradeError::InvalidMaxScore {
            assessment_id: assessment.id.clone(),
            max_score: assessment.max_score,
        });
    }
    let Some(raw) = score.raw_score else {
        return Ok(());
    };
    if raw >= 0.0 && raw <= assessment.max_score {
        return Ok(());
    }
    Err(GradeError::ScoreOutOfRange {
        assessment_id: assessment.id.clone(),
        student_id: score.student_id.clone(),
        raw_score: raw,
        max_score: assessment.max_score,
    })
}

fn validate_inputs(
    categories: &[AssessmentCategory],
    assessments_by_category: &HashMap<String, Vec<Assessment>>,
    scores_by_assessment: &HashMap<String, ScoreRecord>,
) -> Result<(), GradeError> {
    for c in categories {
        validate_weight(&c.id, c.percentage_weight)?;
    }
    for a in assessments_by_category.values().flatten() {
        match scores_by_assessment.get(&a.id) {
            Some(score) => validate_score(a, score)?,
            None if !(a.max_score > 0.0 && a.max_score.is_finite()) => {
                return Err(GradeError::InvalidMaxScore {
                    assessment_id: a.id.clone(),
                    max_score: a.max_score,
                });
            }
            None => {}
        }
    }
    Ok(())
}

pub fn compute_final_grade(
    categories: &[AssessmentCategory],
    assessments_by_category: &HashMap<String, Vec<Assessment>>,
    scores_by_assessment: &HashMap<String, ScoreRecord>,
) -> Result<FinalGradeResult, GradeError> {
    validate_inputs(categories, assessments_by_category, scores_by_assessment)?;

    let mut total_weight = 0.0_f64;
    let mut weighted_total = 0.0_f64;
    let mut breakdown: Vec<CategoryAverage> = Vec::new();

    for c in categories.iter().filter(|c| c.is_active) {
        let Some(assessments) = assessments_by_category.get(&c.id) else {
            continue;
        };

        let mut sum_percent = 0.0_f64;
        let mut count: usize = 0;
        for a in assessments {
            let raw = scores_by_assessment
                .get(&a.id)
                .and_then(|s| s.raw_score);
            let Some(raw) = raw else {
                continue;
            };
            sum_percent += raw * 100.0 / a.max_score;
            count += 1;
        }
        if count == 0 {
            continue;
        }

        let average = sum_percent / (count as f64);
        let contribution = average * c.percentage_weight / 100.0;
        total_weight += c.percentage_weight;
        weighted_total += contribution;

        breakdown.push(CategoryAverage {
            category_id: c.id.clone(),
            category_name: c.name.clone(),
            weight: c.percentage_weight,
            average: round_off_2_decimals(average),
            weighted_contribution: round_off_2_decimals(contribution),
            assessment_count: count,
        });
    }

    if total_weight <= 0.0 {
        return Ok(FinalGradeResult::no_data());
    }

    // Re-normalise against the weight actually graded, not against 100.
    let final_percentage = round_off_2_decimals(weighted_total * 100.0 / total_weight);

    Ok(FinalGradeResult {
        final_percentage,
        letter_grade: letter_grade(final_percentage),
        total_weight_used: total_weight,
        breakdown_by_category: breakdown,
        is_complete: (total_weight - 100.0).abs() < WEIGHT_EPSILON,
        status: GradeStatus::Graded,
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / (values.len() as f64)
}

pub fn compute_trend(percentages: &[f64]) -> Trend {
    if percentages.len() < TREND_MIN_POINTS {
        return Trend {
            improving: false,
            consistent: true,
            declining: false,
            first_third_mean: None,
            last_third_mean: None,
            difference: None,
        };
    }

    let n = percentages.len();
    let third = n / 3;
    let first = mean(&percentages[..third]);
    let last = mean(&percentages[n - third..]);
    let difference = last - first;

    let improving = difference > TREND_THRESHOLD;
    let declining = difference < -TREND_THRESHOLD;

    Trend {
        improving,
        consistent: !improving && !declining,
        declining,
        first_third_mean: Some(round_off_2_decimals(first)),
        last_third_mean: Some(round_off_2_decimals(last)),
        difference: Some(round_off_2_decimals(difference)),
    }
}
