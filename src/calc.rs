use crate::db;
use crate::enrollment::EnrollmentStatus;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PASS_THRESHOLD: f64 = 60.0;

/// Which letter table applies.
///
/// Two tables coexist: a coarse A-F scale attached to individual grade rows and
/// a fine +/- scale used for the course-level letter. Callers name the one they
/// want; nothing picks for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LetterPolicy {
    Coarse,
    Fine,
}

const COARSE_TABLE: &[(f64, &str)] = &[(90.0, "A"), (80.0, "B"), (70.0, "C"), (60.0, "D")];
const COARSE_FLOOR: &str = "F";

const FINE_TABLE: &[(f64, &str)] = &[
    (95.0, "A+"),
    (90.0, "A"),
    (85.0, "A-"),
    (80.0, "B+"),
    (75.0, "B"),
    (70.0, "B-"),
    (65.0, "C+"),
    (60.0, "C"),
    (55.0, "D"),
];
const FINE_FLOOR: &str = "E";

impl LetterPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "coarse" => Some(Self::Coarse),
            "fine" => Some(Self::Fine),
            _ => None,
        }
    }

    fn table(self) -> (&'static [(f64, &'static str)], &'static str) {
        match self {
            Self::Coarse => (COARSE_TABLE, COARSE_FLOOR),
            Self::Fine => (FINE_TABLE, FINE_FLOOR),
        }
    }

    /// All letters of the policy, best first.
    pub fn letters(self) -> Vec<&'static str> {
        let (table, floor) = self.table();
        table
            .iter()
            .map(|(_, l)| *l)
            .chain(std::iter::once(floor))
            .collect()
    }

    pub fn letter_for(self, score: f64) -> &'static str {
        let score = clamp_score(score);
        let (table, floor) = self.table();
        table
            .iter()
            .find(|(min, _)| score >= *min)
            .map(|(_, letter)| *letter)
            .unwrap_or(floor)
    }

    pub fn contains(self, letter: &str) -> bool {
        self.letters().iter().any(|l| *l == letter)
    }
}

/// NaN counts as 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 100.0)
}

/// Half away from zero.
pub fn round_grade(x: f64) -> i64 {
    x.round() as i64
}

pub fn grade_point(letter: &str) -> f64 {
    match letter.trim() {
        "A+" | "A" => 4.0,
        "A-" => 3.7,
        "B+" => 3.3,
        "B" => 3.0,
        "B-" => 2.7,
        "C+" => 2.3,
        "C" => 2.0,
        "C-" => 1.7,
        "D" => 1.0,
        _ => 0.0,
    }
}

pub fn is_passing(grade: f64, threshold: f64) -> bool {
    grade >= threshold
}

pub fn is_failing(grade: f64, threshold: f64) -> bool {
    grade <= threshold - 0.01
}

/// Points earned as a share of the assignment's maximum, on the 0-100 grade scale.
/// Two decimals; a non-positive maximum yields 0.
pub fn grade_percentage(points: f64, max_points: f64) -> f64 {
    if max_points <= 0.0 {
        return 0.0;
    }
    (points / max_points * 10_000.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Enrollment progress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EnrollmentSnapshot {
    pub status: EnrollmentStatus,
    pub progress_percentage: i64,
    pub completed_at: Option<String>,
}

impl EnrollmentSnapshot {
    pub fn from_row(row: &db::EnrollmentRow) -> Self {
        Self {
            status: EnrollmentStatus::parse(&row.status).unwrap_or(EnrollmentStatus::Pending),
            progress_percentage: row.progress_percentage,
            completed_at: row.completed_at.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentProgress {
    pub progress: i64,
    pub completion_date: Option<String>,
    pub is_completed: bool,
}

/// No enrollment means "not started", never an error. A completed enrollment
/// always reports 100 even when the stored percentage lags.
pub fn resolve_progress(enrollment: Option<&EnrollmentSnapshot>) -> EnrollmentProgress {
    let Some(e) = enrollment else {
        return EnrollmentProgress {
            progress: 0,
            completion_date: None,
            is_completed: false,
        };
    };

    if e.status == EnrollmentStatus::Completed {
        return EnrollmentProgress {
            progress: 100,
            completion_date: e.completed_at.as_deref().and_then(completion_date),
            is_completed: true,
        };
    }

    EnrollmentProgress {
        progress: e.progress_percentage.clamp(0, 100),
        completion_date: None,
        is_completed: false,
    }
}

/// `YYYY-MM-DD` from an RFC 3339 timestamp or a bare SQL datetime/date.
pub fn completion_date(ts: &str) -> Option<String> {
    let ts = ts.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        return Some(dt.date_naive().format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date().format("%Y-%m-%d").to_string());
    }
    chrono::NaiveDate::parse_from_str(ts, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

// ---------------------------------------------------------------------------
// Course grade
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseGrade {
    pub numeric_grade: Option<i64>,
    pub letter_grade: Option<String>,
}

/// Unweighted mean of every grade row, rounded before the fine letter is looked up.
pub fn aggregate_course_grade(grades: &[f64]) -> CourseGrade {
    if grades.is_empty() {
        return CourseGrade {
            numeric_grade: None,
            letter_grade: None,
        };
    }
    let mean = grades.iter().sum::<f64>() / grades.len() as f64;
    let rounded = round_grade(mean);
    CourseGrade {
        numeric_grade: Some(rounded),
        letter_grade: Some(LetterPolicy::Fine.letter_for(rounded as f64).to_string()),
    }
}

// ---------------------------------------------------------------------------
// Academic stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CourseStanding {
    pub credit_hours: i64,
    pub progress: i64,
    pub letter_grade: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicStats {
    pub courses_completed: i64,
    pub total_credits: i64,
    pub total_sks: i64,
    pub gpa: String,
}

pub fn academic_stats(courses: &[CourseStanding]) -> AcademicStats {
    let mut completed: i64 = 0;
    let mut total_credits: i64 = 0;
    let mut weighted_sum: f64 = 0.0;

    for c in courses {
        let Some(letter) = c.letter_grade.as_deref() else {
            continue;
        };
        if c.progress != 100 {
            continue;
        }
        completed += 1;
        total_credits += c.credit_hours;
        weighted_sum += grade_point(letter) * c.credit_hours as f64;
    }

    AcademicStats {
        courses_completed: completed,
        total_credits,
        total_sks: total_credits,
        gpa: format_gpa(weighted_sum, total_credits),
    }
}

pub fn format_gpa(weighted_sum: f64, total_credits: i64) -> String {
    if total_credits <= 0 {
        return "0.00".to_string();
    }
    format!("{:.2}", weighted_sum / total_credits as f64)
}

/// Mean of the GPAs that are above zero; students without any graded completion
/// do not drag a cohort down.
pub fn average_gpa(gpas: &[f64]) -> String {
    let positive: Vec<f64> = gpas.iter().copied().filter(|g| *g > 0.0).collect();
    if positive.is_empty() {
        return "0.00".to_string();
    }
    format!("{:.2}", positive.iter().sum::<f64>() / positive.len() as f64)
}

// ---------------------------------------------------------------------------
// Store-backed evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct StudentCourseContext<'a> {
    pub conn: &'a Connection,
    pub student_id: &'a str,
    pub course_id: &'a str,
}

impl StudentCourseContext<'_> {
    pub fn progress(&self) -> rusqlite::Result<EnrollmentProgress> {
        let row = db::enrollment_for_pair(self.conn, self.student_id, self.course_id)?;
        let snapshot = row.as_ref().map(EnrollmentSnapshot::from_row);
        Ok(resolve_progress(snapshot.as_ref()))
    }

    pub fn course_grade(&self) -> rusqlite::Result<CourseGrade> {
        let values = db::grade_values_for_pair(self.conn, self.student_id, self.course_id)?;
        Ok(aggregate_course_grade(&values))
    }
}

/// Standings for every course the student is (or was) actively enrolled in.
pub fn student_standings(
    conn: &Connection,
    student_id: &str,
) -> rusqlite::Result<Vec<CourseStanding>> {
    let mut out = Vec::new();
    for e in db::enrollments_for_student(conn, student_id)? {
        let status = EnrollmentStatus::parse(&e.status);
        if !matches!(
            status,
            Some(EnrollmentStatus::Enrolled) | Some(EnrollmentStatus::Completed)
        ) {
            continue;
        }
        let Some(course) = db::course_get(conn, &e.course_id)? else {
            continue;
        };
        let ctx = StudentCourseContext {
            conn,
            student_id,
            course_id: &course.id,
        };
        let progress = resolve_progress(Some(&EnrollmentSnapshot::from_row(&e)));
        let grade = ctx.course_grade()?;
        out.push(CourseStanding {
            credit_hours: course.credit_hours,
            progress: progress.progress,
            letter_grade: grade.letter_grade,
        });
    }
    Ok(out)
}

pub fn student_academic_stats(conn: &Connection, student_id: &str) -> rusqlite::Result<AcademicStats> {
    Ok(academic_stats(&student_standings(conn, student_id)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: EnrollmentStatus, pct: i64, completed_at: Option<&str>) -> EnrollmentSnapshot {
        EnrollmentSnapshot {
            status,
            progress_percentage: pct,
            completed_at: completed_at.map(str::to_string),
        }
    }

    fn standing(credits: i64, progress: i64, letter: Option<&str>) -> CourseStanding {
        CourseStanding {
            credit_hours: credits,
            progress,
            letter_grade: letter.map(str::to_string),
        }
    }

    #[test]
    fn fine_policy_thresholds() {
        let p = LetterPolicy::Fine;
        assert_eq!(p.letter_for(100.0), "A+");
        assert_eq!(p.letter_for(95.0), "A+");
        assert_eq!(p.letter_for(94.99), "A");
        assert_eq!(p.letter_for(85.0), "A-");
        assert_eq!(p.letter_for(80.0), "B+");
        assert_eq!(p.letter_for(75.0), "B");
        assert_eq!(p.letter_for(70.0), "B-");
        assert_eq!(p.letter_for(65.0), "C+");
        assert_eq!(p.letter_for(60.0), "C");
        assert_eq!(p.letter_for(55.0), "D");
        assert_eq!(p.letter_for(54.9), "E");
        assert_eq!(p.letter_for(0.0), "E");
    }

    #[test]
    fn coarse_policy_thresholds() {
        let p = LetterPolicy::Coarse;
        assert_eq!(p.letter_for(90.0), "A");
        assert_eq!(p.letter_for(89.99), "B");
        assert_eq!(p.letter_for(70.0), "C");
        assert_eq!(p.letter_for(60.0), "D");
        assert_eq!(p.letter_for(59.0), "F");
    }

    #[test]
    fn letters_are_total_and_monotonic_over_the_range() {
        for policy in [LetterPolicy::Coarse, LetterPolicy::Fine] {
            let letters = policy.letters();
            let mut prev_rank = 0usize;
            // Walk downward in tenths; the rank (index into best-first list) never decreases.
            for step in (0..=1000).rev() {
                let x = step as f64 / 10.0;
                let letter = policy.letter_for(x);
                let rank = letters
                    .iter()
                    .position(|l| *l == letter)
                    .expect("letter in table");
                assert!(rank >= prev_rank, "{policy:?} not monotonic at {x}");
                prev_rank = rank;
            }
        }
    }

    #[test]
    fn out_of_range_scores_clamp() {
        for policy in [LetterPolicy::Coarse, LetterPolicy::Fine] {
            assert_eq!(policy.letter_for(140.0), policy.letter_for(100.0));
            assert_eq!(policy.letter_for(-3.0), policy.letter_for(0.0));
            assert_eq!(policy.letter_for(f64::NAN), policy.letter_for(0.0));
        }
    }

    #[test]
    fn policy_parse_is_case_insensitive() {
        assert_eq!(LetterPolicy::parse("Fine"), Some(LetterPolicy::Fine));
        assert_eq!(LetterPolicy::parse(" coarse "), Some(LetterPolicy::Coarse));
        assert_eq!(LetterPolicy::parse("medium"), None);
    }

    #[test]
    fn completed_enrollment_forces_full_progress() {
        let s = snapshot(EnrollmentStatus::Completed, 40, Some("2025-06-30T09:15:00Z"));
        let p = resolve_progress(Some(&s));
        assert_eq!(p.progress, 100);
        assert!(p.is_completed);
        assert_eq!(p.completion_date.as_deref(), Some("2025-06-30"));
    }

    #[test]
    fn missing_enrollment_is_zero_progress() {
        let p = resolve_progress(None);
        assert_eq!(p.progress, 0);
        assert_eq!(p.completion_date, None);
        assert!(!p.is_completed);
    }

    #[test]
    fn active_enrollment_reports_stored_progress() {
        let p = resolve_progress(Some(&snapshot(EnrollmentStatus::Enrolled, 45, None)));
        assert_eq!(p.progress, 45);
        let p = resolve_progress(Some(&snapshot(EnrollmentStatus::Enrolled, 130, None)));
        assert_eq!(p.progress, 100);
        assert!(!p.is_completed);
    }

    #[test]
    fn completion_date_accepts_sql_datetimes() {
        assert_eq!(
            completion_date("2024-12-01 08:00:00").as_deref(),
            Some("2024-12-01")
        );
        assert_eq!(completion_date("2024-12-01").as_deref(), Some("2024-12-01"));
        assert_eq!(completion_date("yesterday"), None);
    }

    #[test]
    fn course_grade_empty_is_null() {
        let g = aggregate_course_grade(&[]);
        assert_eq!(g.numeric_grade, None);
        assert_eq!(g.letter_grade, None);
    }

    #[test]
    fn course_grade_rounds_then_letters() {
        let g = aggregate_course_grade(&[80.0, 90.0]);
        assert_eq!(g.numeric_grade, Some(85));
        assert_eq!(g.letter_grade.as_deref(), Some("A-"));

        // 84.5 rounds up to 85, so the letter follows the rounded value.
        let g = aggregate_course_grade(&[84.0, 85.0]);
        assert_eq!(g.numeric_grade, Some(85));
        assert_eq!(g.letter_grade.as_deref(), Some("A-"));
    }

    #[test]
    fn stats_without_completions_do_not_divide_by_zero() {
        let s = academic_stats(&[]);
        assert_eq!(s.courses_completed, 0);
        assert_eq!(s.total_credits, 0);
        assert_eq!(s.gpa, "0.00");

        let s = academic_stats(&[standing(3, 60, Some("A")), standing(2, 100, None)]);
        assert_eq!(s.courses_completed, 0);
        assert_eq!(s.gpa, "0.00");
    }

    #[test]
    fn stats_weight_by_credit_hours() {
        let s = academic_stats(&[standing(3, 100, Some("A")), standing(2, 100, Some("B"))]);
        assert_eq!(s.courses_completed, 2);
        assert_eq!(s.total_credits, 5);
        assert_eq!(s.total_sks, 5);
        assert_eq!(s.gpa, "3.60");
    }

    #[test]
    fn unknown_letters_count_credits_but_no_points() {
        let s = academic_stats(&[standing(2, 100, Some("A")), standing(2, 100, Some("P"))]);
        assert_eq!(s.total_credits, 4);
        assert_eq!(s.gpa, "2.00");
    }

    #[test]
    fn average_gpa_skips_zero_gpas() {
        assert_eq!(average_gpa(&[]), "0.00");
        assert_eq!(average_gpa(&[0.0, 0.0]), "0.00");
        assert_eq!(average_gpa(&[3.0, 0.0, 4.0]), "3.50");
    }

    #[test]
    fn percentage_scales_to_max_points() {
        assert_eq!(grade_percentage(45.0, 50.0), 90.0);
        assert_eq!(grade_percentage(1.0, 3.0), 33.33);
        assert_eq!(grade_percentage(10.0, 0.0), 0.0);
    }

    #[test]
    fn passing_and_failing_use_threshold() {
        assert!(is_passing(60.0, DEFAULT_PASS_THRESHOLD));
        assert!(!is_failing(60.0, DEFAULT_PASS_THRESHOLD));
        assert!(is_failing(59.5, DEFAULT_PASS_THRESHOLD));
        assert!(!is_passing(59.5, DEFAULT_PASS_THRESHOLD));
    }
}
