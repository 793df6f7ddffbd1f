use crate::calc::{CalcError, ClassGradebook, ClassInfo, EnrolledStudent, StudentGrade};
use crate::grade::{self, FinalGradeResult, Trend, FAILING_LETTER, GRADE_BOUNDARIES};
use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

const RECENT_ANNOUNCEMENTS: i64 = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRow {
    pub assessment_id: String,
    pub title: String,
    pub category_name: Option<String>,
    pub date: Option<String>,
    pub max_score: f64,
    pub raw_score: Option<f64>,
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReportModel {
    pub class: ClassInfo,
    pub student: EnrolledStudent,
    pub grade: FinalGradeResult,
    pub trend: Trend,
    pub assessments: Vec<AssessmentRow>,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterCount {
    pub letter: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub category_id: String,
    pub name: String,
    pub weight: f64,
    pub is_active: bool,
    pub assessment_count: usize,
    pub class_average: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummaryModel {
    pub class: ClassInfo,
    pub categories: Vec<CategorySummary>,
    pub total_active_weight: f64,
    pub students: Vec<StudentGrade>,
    pub class_average: Option<f64>,
    pub class_letter: Option<&'static str>,
    pub graded_count: usize,
    pub no_data_count: usize,
    pub letter_distribution: Vec<LetterCount>,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementSummary {
    pub id: String,
    pub class_id: Option<String>,
    pub title: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub subject_count: i64,
    pub class_count: i64,
    pub student_count: i64,
    pub assessment_count: i64,
    pub ungraded_count: i64,
    pub recent_announcements: Vec<AnnouncementSummary>,
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339()
}

pub fn student_report_model(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
) -> Result<StudentReportModel, CalcError> {
    let book = ClassGradebook::load(conn, class_id)?;
    let grade = book.grade_for(student_id)?;
    let (trend, _) = book.trend_for(student_id)?;
    let Some(student) = book.student(student_id).cloned() else {
        return Err(CalcError::new("not_enrolled", "student is not enrolled in this class"));
    };

    let assessments = book
        .assessments
        .iter()
        .map(|a| {
            let raw_score = book.raw_score(&a.assessment.id, student_id);
            AssessmentRow {
                assessment_id: a.assessment.id.clone(),
                title: a.title.clone(),
                category_name: a.category_name.clone(),
                date: a.assessment.date.map(|d| d.format("%Y-%m-%d").to_string()),
                max_score: a.assessment.max_score,
                raw_score,
                percent: raw_score
                    .map(|raw| grade::round_off_2_decimals(raw * 100.0 / a.assessment.max_score)),
            }
        })
        .collect();

    Ok(StudentReportModel {
        class: book.class.clone(),
        student,
        grade,
        trend,
        assessments,
        generated_at: now_stamp(),
    })
}

pub fn class_summary_model(
    conn: &Connection,
    class_id: &str,
) -> Result<ClassSummaryModel, CalcError> {
    let book = ClassGradebook::load(conn, class_id)?;
    let grades = book.class_grades()?;

    let mut letter_counts: HashMap<&'static str, usize> = HashMap::new();
    for s in grades.students.iter().filter(|s| s.grade.has_data()) {
        *letter_counts.entry(s.grade.letter_grade).or_insert(0) += 1;
    }

    let letter_distribution: Vec<LetterCount> = GRADE_BOUNDARIES
        .iter()
        .map(|(_, letter)| *letter)
        .chain(std::iter::once(FAILING_LETTER))
        .map(|letter| LetterCount {
            letter,
            count: letter_counts.get(letter).copied().unwrap_or(0),
        })
        .collect();

    let by_category = book.assessments_by_category();
    let categories: Vec<CategorySummary> = book
        .categories
        .iter()
        .map(|c| {
            // Inactive categories do not count toward any grade.
            let class_average = if c.is_active {
                book.category_class_average(&c.id)
            } else {
                None
            };
            CategorySummary {
                category_id: c.id.clone(),
                name: c.name.clone(),
                weight: c.percentage_weight,
                is_active: c.is_active,
                assessment_count: by_category.get(&c.id).map(|v| v.len()).unwrap_or(0),
                class_average,
            }
        })
        .collect();
    let total_active_weight: f64 = book
        .categories
        .iter()
        .filter(|c| c.is_active)
        .map(|c| c.percentage_weight)
        .sum();

    let no_data_count = grades.students.len() - grades.graded_count;
    Ok(ClassSummaryModel {
        class: grades.class,
        categories,
        total_active_weight,
        class_letter: grades.class_average.map(grade::letter_grade),
        class_average: grades.class_average,
        graded_count: grades.graded_count,
        no_data_count,
        students: grades.students,
        letter_distribution,
        generated_at: now_stamp(),
    })
}

fn count(conn: &Connection, sql: &str) -> Result<i64, CalcError> {
    conn.query_row(sql, [], |r| r.get(0))
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))
}

pub fn dashboard_summary(conn: &Connection) -> Result<DashboardSummary, CalcError> {
    // Ungraded = an enrolled student with no stored score (or a null one) for an
    // assessment in their class.
    let ungraded_count = count(
        conn,
        "SELECT COUNT(*)
         FROM enrollments e
         JOIN assessments a ON a.class_id = e.class_id
         LEFT JOIN scores sc ON sc.assessment_id = a.id AND sc.student_id = e.student_id
         WHERE sc.raw_score IS NULL",
    )?;

    let mut stmt = conn
        .prepare(
            "SELECT id, class_id, title, created_at
             FROM announcements
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
    let recent_announcements = stmt
        .query_map([RECENT_ANNOUNCEMENTS], |r| {
            Ok(AnnouncementSummary {
                id: r.get(0)?,
                class_id: r.get(1)?,
                title: r.get(2)?,
                created_at: r.get(3)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;

    Ok(DashboardSummary {
        subject_count: count(conn, "SELECT COUNT(*) FROM subjects")?,
        class_count: count(conn, "SELECT COUNT(*) FROM classes")?,
        student_count: count(conn, "SELECT COUNT(*) FROM students")?,
        assessment_count: count(conn, "SELECT COUNT(*) FROM assessments")?,
        ungraded_count,
        recent_announcements,
    })
}
