use crate::grade::{self, Assessment, AssessmentCategory, FinalGradeResult, ScoreRecord, Trend};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn db(e: rusqlite::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }
}

impl From<grade::GradeError> for CalcError {
    fn from(e: grade::GradeError) -> Self {
        CalcError::new("invalid_input", e.to_string()).with_details(e.details())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub id: String,
    pub name: String,
    pub subject_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrolledStudent {
    pub id: String,
    pub display_name: String,
    pub student_no: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct ClassAssessment {
    pub assessment: Assessment,
    pub title: String,
    pub category_name: Option<String>,
}

/// Everything the grade engine needs for one class, scoped to that class.
#[derive(Debug, Clone)]
pub struct ClassGradebook {
    pub class: ClassInfo,
    pub students: Vec<EnrolledStudent>,
    pub categories: Vec<AssessmentCategory>,
    /// Ordered by date (undated last), then title.
    pub assessments: Vec<ClassAssessment>,
    score_by_pair: HashMap<(String, String), Option<f64>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGrade {
    pub student_id: String,
    pub display_name: String,
    pub active: bool,
    pub grade: FinalGradeResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassGrades {
    pub class: ClassInfo,
    pub students: Vec<StudentGrade>,
    /// Mean of final percentages over students that have any graded work.
    pub class_average: Option<f64>,
    pub graded_count: usize,
}

fn parse_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
}

impl ClassGradebook {
    pub fn load(conn: &Connection, class_id: &str) -> Result<Self, CalcError> {
        let class: Option<ClassInfo> = conn
            .query_row(
                "SELECT c.id, c.name, s.name
                 FROM classes c
                 LEFT JOIN subjects s ON s.id = c.subject_id
                 WHERE c.id = ?",
                [class_id],
                |r| {
                    Ok(ClassInfo {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        subject_name: r.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(CalcError::db)?;
        let Some(class) = class else {
            return Err(CalcError::new("not_found", "class not found"));
        };

        let mut students_stmt = conn
            .prepare(
                "SELECT s.id, s.last_name, s.first_name, s.student_no, s.active
                 FROM students s
                 JOIN enrollments e ON e.student_id = s.id
                 WHERE e.class_id = ?
                 ORDER BY s.last_name, s.first_name",
            )
            .map_err(CalcError::db)?;
        let students: Vec<EnrolledStudent> = students_stmt
            .query_map([class_id], |r| {
                let last: String = r.get(1)?;
                let first: String = r.get(2)?;
                Ok(EnrolledStudent {
                    id: r.get(0)?,
                    display_name: format!("{}, {}", last, first),
                    student_no: r.get(3)?,
                    active: r.get::<_, i64>(4)? != 0,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(CalcError::db)?;

        let mut categories_stmt = conn
            .prepare(
                "SELECT id, name, weight, is_active
                 FROM categories
                 WHERE class_id = ?
                 ORDER BY sort_order",
            )
            .map_err(CalcError::db)?;
        let categories: Vec<AssessmentCategory> = categories_stmt
            .query_map([class_id], |r| {
                Ok(AssessmentCategory {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    percentage_weight: r.get(2)?,
                    is_active: r.get::<_, i64>(3)? != 0,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(CalcError::db)?;

        let mut assessments_stmt = conn
            .prepare(
                "SELECT a.id, a.category_id, a.max_score, a.date, a.title, c.name
                 FROM assessments a
                 LEFT JOIN categories c ON c.id = a.category_id
                 WHERE a.class_id = ?
                 ORDER BY a.date IS NULL, a.date, a.title",
            )
            .map_err(CalcError::db)?;
        let assessments: Vec<ClassAssessment> = assessments_stmt
            .query_map([class_id], |r| {
                Ok(ClassAssessment {
                    assessment: Assessment {
                        id: r.get(0)?,
                        category_id: r.get(1)?,
                        max_score: r.get(2)?,
                        date: parse_date(r.get(3)?),
                    },
                    title: r.get(4)?,
                    category_name: r.get(5)?,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(CalcError::db)?;

        let mut scores_stmt = conn
            .prepare(
                "SELECT sc.assessment_id, sc.student_id, sc.raw_score
                 FROM scores sc
                 JOIN assessments a ON a.id = sc.assessment_id
                 WHERE a.class_id = ?",
            )
            .map_err(CalcError::db)?;
        let mut score_by_pair: HashMap<(String, String), Option<f64>> = HashMap::new();
        let rows = scores_stmt
            .query_map([class_id], |r| {
                let assessment_id: String = r.get(0)?;
                let student_id: String = r.get(1)?;
                let raw_score: Option<f64> = r.get(2)?;
                Ok((assessment_id, student_id, raw_score))
            })
            .map_err(CalcError::db)?;
        for row in rows {
            let (assessment_id, student_id, raw_score) = row.map_err(CalcError::db)?;
            score_by_pair.insert((assessment_id, student_id), raw_score);
        }

        debug!(
            class_id,
            students = students.len(),
            categories = categories.len(),
            assessments = assessments.len(),
            scores = score_by_pair.len(),
            "loaded class gradebook"
        );

        Ok(Self {
            class,
            students,
            categories,
            assessments,
            score_by_pair,
        })
    }

    pub fn student(&self, student_id: &str) -> Option<&EnrolledStudent> {
        self.students.iter().find(|s| s.id == student_id)
    }

    fn require_student(&self, student_id: &str) -> Result<&EnrolledStudent, CalcError> {
        self.student(student_id).ok_or_else(|| {
            CalcError::new("not_enrolled", "student is not enrolled in this class")
                .with_details(serde_json::json!({
                    "classId": self.class.id,
                    "studentId": student_id,
                }))
        })
    }

    pub fn raw_score(&self, assessment_id: &str, student_id: &str) -> Option<f64> {
        self.score_by_pair
            .get(&(assessment_id.to_string(), student_id.to_string()))
            .copied()
            .flatten()
    }

    pub fn assessments_by_category(&self) -> HashMap<String, Vec<Assessment>> {
        let mut out: HashMap<String, Vec<Assessment>> = HashMap::new();
        for a in &self.assessments {
            let Some(category_id) = a.assessment.category_id.as_ref() else {
                continue;
            };
            out.entry(category_id.clone())
                .or_default()
                .push(a.assessment.clone());
        }
        out
    }

    pub fn scores_for(&self, student_id: &str) -> HashMap<String, ScoreRecord> {
        self.assessments
            .iter()
            .map(|a| {
                let id = a.assessment.id.clone();
                let record = ScoreRecord {
                    assessment_id: id.clone(),
                    student_id: student_id.to_string(),
                    raw_score: self.raw_score(&id, student_id),
                };
                (id, record)
            })
            .collect()
    }

    pub fn grade_for(&self, student_id: &str) -> Result<FinalGradeResult, CalcError> {
        self.require_student(student_id)?;
        let result = grade::compute_final_grade(
            &self.categories,
            &self.assessments_by_category(),
            &self.scores_for(student_id),
        )?;
        Ok(result)
    }

    /// Unrounded mean of the student's scored percentages in one category.
    pub fn category_average(&self, student_id: &str, category_id: &str) -> Option<f64> {
        let (sum, n) = self
            .assessments
            .iter()
            .filter(|a| a.assessment.category_id.as_deref() == Some(category_id))
            .filter(|a| a.assessment.max_score > 0.0)
            .filter_map(|a| {
                self.raw_score(&a.assessment.id, student_id)
                    .map(|raw| raw * 100.0 / a.assessment.max_score)
            })
            .fold((0.0_f64, 0_usize), |(sum, n), p| (sum + p, n + 1));
        (n > 0).then(|| sum / (n as f64))
    }

    /// Mean over enrolled students of their category averages, rounded once.
    pub fn category_class_average(&self, category_id: &str) -> Option<f64> {
        let (sum, n) = self
            .students
            .iter()
            .filter_map(|s| self.category_average(&s.id, category_id))
            .fold((0.0_f64, 0_usize), |(sum, n), avg| (sum + avg, n + 1));
        (n > 0).then(|| grade::round_off_2_decimals(sum / (n as f64)))
    }

    /// Scored assessment percentages in date order, uncategorized included.
    pub fn percentages_for(&self, student_id: &str) -> Vec<f64> {
        self.assessments
            .iter()
            .filter(|a| a.assessment.max_score > 0.0)
            .filter_map(|a| {
                self.raw_score(&a.assessment.id, student_id)
                    .map(|raw| raw * 100.0 / a.assessment.max_score)
            })
            .collect()
    }

    pub fn trend_for(&self, student_id: &str) -> Result<(Trend, Vec<f64>), CalcError> {
        self.require_student(student_id)?;
        let percentages = self.percentages_for(student_id);
        Ok((grade::compute_trend(&percentages), percentages))
    }

    pub fn class_grades(&self) -> Result<ClassGrades, CalcError> {
        let by_category = self.assessments_by_category();
        let mut students: Vec<StudentGrade> = Vec::with_capacity(self.students.len());
        let mut sum = 0.0_f64;
        let mut graded_count: usize = 0;

        for s in &self.students {
            let result = grade::compute_final_grade(
                &self.categories,
                &by_category,
                &self.scores_for(&s.id),
            )
            .map_err(|e| {
                let mut err = CalcError::from(e);
                if let Some(d) = err.details.as_mut() {
                    d["studentId"] = serde_json::json!(s.id);
                }
                err
            })?;
            if result.has_data() {
                sum += result.final_percentage;
                graded_count += 1;
            }
            students.push(StudentGrade {
                student_id: s.id.clone(),
                display_name: s.display_name.clone(),
                active: s.active,
                grade: result,
            });
        }

        let class_average = if graded_count > 0 {
            Some(grade::round_off_2_decimals(sum / (graded_count as f64)))
        } else {
            None
        };

        Ok(ClassGrades {
            class: self.class.clone(),
            students,
            class_average,
            graded_count,
        })
    }
}

pub fn compute_student_grade(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
) -> Result<FinalGradeResult, CalcError> {
    ClassGradebook::load(conn, class_id)?.grade_for(student_id)
}

pub fn compute_student_trend(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
) -> Result<(Trend, Vec<f64>), CalcError> {
    ClassGradebook::load(conn, class_id)?.trend_for(student_id)
}

pub fn compute_class_grades(conn: &Connection, class_id: &str) -> Result<ClassGrades, CalcError> {
    ClassGradebook::load(conn, class_id)?.class_grades()
}
