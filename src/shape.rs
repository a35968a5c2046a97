//! Frontend-facing views.
//!
//! Relations are `Option` and skipped when absent: a view built without its
//! relation loaded simply omits the key. Everything else is always emitted,
//! `null` included.

use crate::calc::{self, CourseGrade, EnrollmentProgress};
use crate::db::{
    AssignmentRow, CourseRow, EnrollmentRow, GradeRow, LibraryResourceRow, SubmissionRow, UserRow,
};
use serde::Serialize;

fn course_status(course: &CourseRow) -> &'static str {
    if course.is_active {
        "Published"
    } else {
        "Draft"
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub student_id: Option<String>,
    pub major_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub fn user_view(u: &UserRow) -> UserView {
    UserView {
        id: u.id.clone(),
        name: u.name.clone(),
        email: u.email.clone(),
        role: u.role.clone(),
        student_id: u.student_no.clone(),
        major_id: u.major_id.clone(),
        created_at: u.created_at.clone(),
        updated_at: u.updated_at.clone(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentView {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub max_points: f64,
    pub created_at: String,
}

pub fn assignment_view(a: &AssignmentRow) -> AssignmentView {
    AssignmentView {
        id: a.id.clone(),
        course_id: a.course_id.clone(),
        title: a.title.clone(),
        description: a.description.clone(),
        due_date: a.due_date.clone(),
        max_points: a.max_points,
        created_at: a.created_at.clone(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseView {
    pub id: String,
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub instructor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructor: Option<String>,
    pub faculty_id: Option<String>,
    pub major_id: Option<String>,
    pub sks: i64,
    pub capacity: i64,
    pub current_enrollment: i64,
    pub seats_available: i64,
    pub semester: String,
    pub year: Option<i64>,
    pub schedule: Option<String>,
    pub room: Option<String>,
    pub mode: Option<String>,
    pub image_url: Option<String>,
    pub status: &'static str,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub fn course_view(c: &CourseRow, instructor: Option<&UserRow>) -> CourseView {
    CourseView {
        id: c.id.clone(),
        code: c.code.clone(),
        title: c.name.clone(),
        description: c.description.clone(),
        instructor_id: c.instructor_id.clone(),
        instructor: instructor.map(|u| u.name.clone()),
        faculty_id: c.faculty_id.clone(),
        major_id: c.major_id.clone(),
        sks: c.credit_hours,
        capacity: c.capacity,
        current_enrollment: c.current_enrollment,
        seats_available: (c.capacity - c.current_enrollment).max(0),
        semester: c.semester.clone(),
        year: c.year,
        schedule: c.schedule.clone(),
        room: c.room.clone(),
        mode: c.mode.clone(),
        image_url: c.image_url.clone(),
        status: course_status(c),
        is_active: c.is_active,
        created_at: c.created_at.clone(),
        updated_at: c.updated_at.clone(),
    }
}

/// A course seen through one student's enrollment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentCourseView {
    /// Course code; the client keys courses by code.
    pub id: String,
    pub course_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructor: Option<String>,
    pub instructor_id: Option<String>,
    pub faculty_id: Option<String>,
    pub major_id: Option<String>,
    pub sks: i64,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub progress: i64,
    pub grade_letter: Option<String>,
    pub grade_numeric: Option<i64>,
    pub completion_date: Option<String>,
    pub mode: Option<String>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignments: Option<Vec<AssignmentView>>,
    #[serde(rename = "students_count")]
    pub students_count: i64,
    pub code: String,
    pub semester: String,
    pub year: Option<i64>,
    pub schedule: Option<String>,
    pub room: Option<String>,
    pub capacity: i64,
    #[serde(rename = "created_at")]
    pub created_at: String,
    #[serde(rename = "updated_at")]
    pub updated_at: String,
}

pub struct StudentCourseParts<'a> {
    pub course: &'a CourseRow,
    pub instructor: Option<&'a UserRow>,
    pub progress: &'a EnrollmentProgress,
    pub grade: &'a CourseGrade,
    pub assignments: Option<&'a [AssignmentRow]>,
}

pub fn student_course_view(parts: StudentCourseParts<'_>) -> StudentCourseView {
    let c = parts.course;
    StudentCourseView {
        id: c.code.clone(),
        course_id: c.id.clone(),
        title: c.name.clone(),
        instructor: parts.instructor.map(|u| u.name.clone()),
        instructor_id: c.instructor_id.clone(),
        faculty_id: c.faculty_id.clone(),
        major_id: c.major_id.clone(),
        sks: c.credit_hours,
        description: c.description.clone(),
        image_url: c.image_url.clone(),
        progress: parts.progress.progress,
        grade_letter: parts.grade.letter_grade.clone(),
        grade_numeric: parts.grade.numeric_grade,
        completion_date: parts.progress.completion_date.clone(),
        mode: c.mode.clone(),
        status: course_status(c),
        assignments: parts
            .assignments
            .map(|rows| rows.iter().map(assignment_view).collect()),
        students_count: c.current_enrollment,
        code: c.code.clone(),
        semester: c.semester.clone(),
        year: c.year,
        schedule: c.schedule.clone(),
        room: c.room.clone(),
        capacity: c.capacity,
        created_at: c.created_at.clone(),
        updated_at: c.updated_at.clone(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentView {
    pub id: String,
    pub course_id: String,
    pub student_id: String,
    pub status: String,
    pub progress_percentage: i64,
    pub final_grade: Option<f64>,
    pub enrolled_at: Option<String>,
    pub completed_at: Option<String>,
    pub dropped_at: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<CourseView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<UserView>,
    pub is_active: bool,
    pub is_completed: bool,
    pub is_dropped: bool,
    pub is_pending: bool,
}

pub fn enrollment_view(
    e: &EnrollmentRow,
    course: Option<CourseView>,
    student: Option<UserView>,
) -> EnrollmentView {
    EnrollmentView {
        id: e.id.clone(),
        course_id: e.course_id.clone(),
        student_id: e.student_id.clone(),
        status: e.status.clone(),
        progress_percentage: e.progress_percentage,
        final_grade: e.final_grade,
        enrolled_at: e.enrolled_at.clone(),
        completed_at: e.completed_at.clone(),
        dropped_at: e.dropped_at.clone(),
        notes: e.notes.clone(),
        created_at: e.created_at.clone(),
        updated_at: e.updated_at.clone(),
        course,
        student,
        is_active: e.status == "enrolled",
        is_completed: e.status == "completed",
        is_dropped: e.status == "dropped",
        is_pending: e.status == "pending",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeView {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub assignment_id: Option<String>,
    pub grade: f64,
    pub grade_letter: Option<String>,
    pub comments: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<UserView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<CourseView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<AssignmentView>,
    pub is_passing: bool,
    pub is_failing: bool,
}

#[derive(Default)]
pub struct GradeRelations {
    pub student: Option<UserView>,
    pub course: Option<CourseView>,
    pub assignment: Option<AssignmentView>,
}

pub fn grade_view(g: &GradeRow, pass_threshold: f64, rel: GradeRelations) -> GradeView {
    GradeView {
        id: g.id.clone(),
        user_id: g.user_id.clone(),
        course_id: g.course_id.clone(),
        assignment_id: g.assignment_id.clone(),
        grade: g.grade,
        grade_letter: g.grade_letter.clone(),
        comments: g.comments.clone(),
        created_at: g.created_at.clone(),
        updated_at: g.updated_at.clone(),
        student: rel.student,
        course: rel.course,
        assignment: rel.assignment,
        is_passing: calc::is_passing(g.grade, pass_threshold),
        is_failing: calc::is_failing(g.grade, pass_threshold),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionView {
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub link_url: Option<String>,
    pub status: String,
    pub submitted_at: String,
    pub graded_at: Option<String>,
    pub graded_by: Option<String>,
    pub grade: Option<f64>,
    pub feedback: Option<String>,
    pub instructor_notes: Option<String>,
    pub is_late: bool,
    pub attempt_number: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<AssignmentView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<UserView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grader: Option<UserView>,
    pub is_graded: bool,
    /// Needs both a grade and the assignment loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_percentage: Option<f64>,
}

#[derive(Default)]
pub struct SubmissionRelations {
    pub assignment: Option<AssignmentView>,
    pub student: Option<UserView>,
    pub grader: Option<UserView>,
}

pub fn submission_view(s: &SubmissionRow, rel: SubmissionRelations) -> SubmissionView {
    let grade_percentage = match (s.grade, rel.assignment.as_ref()) {
        (Some(points), Some(a)) => Some(calc::grade_percentage(points, a.max_points)),
        _ => None,
    };
    SubmissionView {
        id: s.id.clone(),
        assignment_id: s.assignment_id.clone(),
        student_id: s.student_id.clone(),
        content: s.content.clone(),
        file_url: s.file_url.clone(),
        file_name: s.file_name.clone(),
        file_size: s.file_size,
        link_url: s.link_url.clone(),
        status: s.status.clone(),
        submitted_at: s.submitted_at.clone(),
        graded_at: s.graded_at.clone(),
        graded_by: s.graded_by.clone(),
        grade: s.grade,
        feedback: s.feedback.clone(),
        instructor_notes: s.instructor_notes.clone(),
        is_late: s.is_late,
        attempt_number: s.attempt_number,
        assignment: rel.assignment,
        student: rel.student,
        grader: rel.grader,
        is_graded: s.grade.is_some(),
        grade_percentage,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryResourceView {
    pub id: String,
    pub course_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub resource_type: Option<String>,
    pub file_url: Option<String>,
    pub file_size: Option<i64>,
    pub external_link: Option<String>,
    pub author: Option<String>,
    pub tags: Option<String>,
    pub is_published: bool,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    pub tags_array: Vec<String>,
    pub is_file: bool,
    pub is_external_link: bool,
    pub file_size_human: Option<String>,
}

pub fn library_resource_view(r: &LibraryResourceRow) -> LibraryResourceView {
    let has_link = non_empty(r.external_link.as_deref());
    LibraryResourceView {
        id: r.id.clone(),
        course_id: r.course_id.clone(),
        title: r.title.clone(),
        description: r.description.clone(),
        resource_type: r.resource_type.clone(),
        file_url: r.file_url.clone(),
        file_size: r.file_size,
        external_link: r.external_link.clone(),
        author: r.author.clone(),
        tags: r.tags.clone(),
        is_published: r.is_published,
        created_by: r.created_by.clone(),
        created_at: r.created_at.clone(),
        updated_at: r.updated_at.clone(),
        tags_array: parse_tags(r.tags.as_deref()),
        is_file: non_empty(r.file_url.as_deref()) && !has_link,
        is_external_link: has_link,
        file_size_human: r.file_size.map(format_file_size),
    }
}

fn non_empty(s: Option<&str>) -> bool {
    s.map(|v| !v.trim().is_empty()).unwrap_or(false)
}

/// Tags are stored either as a JSON array or as a comma-separated string.
pub fn parse_tags(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Vec::new();
    };
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(raw) {
        return items
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect();
    }
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// 1024-based, two decimals at most, trailing zeros dropped: `1.5 KB`, `3 MB`.
pub fn format_file_size(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    let mut text = format!("{rounded:.2}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    format!("{} {}", text, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::{aggregate_course_grade, resolve_progress, EnrollmentSnapshot};
    use crate::enrollment::EnrollmentStatus;

    fn course() -> CourseRow {
        CourseRow {
            id: "c-1".into(),
            code: "AQD201".into(),
            name: "Aqidah II".into(),
            description: None,
            instructor_id: Some("u-9".into()),
            faculty_id: Some("ushuluddin".into()),
            major_id: None,
            credit_hours: 3,
            capacity: 40,
            current_enrollment: 12,
            semester: "Spring".into(),
            year: Some(2025),
            schedule: None,
            room: None,
            mode: Some("Online".into()),
            image_url: None,
            is_active: true,
            created_at: "2025-01-01T00:00:00Z".into(),
            updated_at: "2025-01-01T00:00:00Z".into(),
        }
    }

    fn library_row(file_url: Option<&str>, link: Option<&str>, size: Option<i64>) -> LibraryResourceRow {
        LibraryResourceRow {
            id: "r-1".into(),
            course_id: None,
            title: "Riyadhus Shalihin".into(),
            description: None,
            resource_type: Some("book".into()),
            file_url: file_url.map(str::to_string),
            file_size: size,
            external_link: link.map(str::to_string),
            author: None,
            tags: Some("hadith, akhlaq ,".into()),
            is_published: true,
            created_by: "u-1".into(),
            created_at: "2025-01-01T00:00:00Z".into(),
            updated_at: "2025-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn shaped_progress_matches_resolver() {
        let cases = [
            (EnrollmentStatus::Completed, 35, Some("2025-05-02T10:00:00Z")),
            (EnrollmentStatus::Enrolled, 62, None),
            (EnrollmentStatus::Dropped, 10, None),
        ];
        let c = course();
        for (status, pct, completed_at) in cases {
            let snap = EnrollmentSnapshot {
                status,
                progress_percentage: pct,
                completed_at: completed_at.map(str::to_string),
            };
            let progress = resolve_progress(Some(&snap));
            let grade = aggregate_course_grade(&[77.0, 81.0]);
            let view = student_course_view(StudentCourseParts {
                course: &c,
                instructor: None,
                progress: &progress,
                grade: &grade,
                assignments: None,
            });
            let json = serde_json::to_value(&view).expect("serialize");
            assert_eq!(json["progress"].as_i64(), Some(progress.progress));
            assert_eq!(
                json["completionDate"].as_str().map(str::to_string),
                progress.completion_date
            );
            assert_eq!(json["gradeNumeric"].as_i64(), Some(79));
            assert_eq!(json["gradeLetter"].as_str(), Some("B"));
        }
    }

    #[test]
    fn unloaded_relations_are_omitted() {
        let c = course();
        let progress = resolve_progress(None);
        let grade = aggregate_course_grade(&[]);
        let view = student_course_view(StudentCourseParts {
            course: &c,
            instructor: None,
            progress: &progress,
            grade: &grade,
            assignments: None,
        });
        let json = serde_json::to_value(&view).expect("serialize");
        let obj = json.as_object().expect("object");
        assert!(!obj.contains_key("instructor"));
        assert!(!obj.contains_key("assignments"));
        // Computed fields stay present as explicit nulls.
        assert!(obj.get("gradeLetter").expect("gradeLetter").is_null());
        assert!(obj.get("completionDate").expect("completionDate").is_null());
        assert_eq!(obj.get("id").and_then(|v| v.as_str()), Some("AQD201"));
        assert_eq!(obj.get("students_count").and_then(|v| v.as_i64()), Some(12));
    }

    #[test]
    fn tags_parse_json_or_comma_lists() {
        assert_eq!(parse_tags(Some("hadith, akhlaq ,")), vec!["hadith", "akhlaq"]);
        assert_eq!(parse_tags(Some(r#"["fiqh","usul"]"#)), vec!["fiqh", "usul"]);
        assert!(parse_tags(Some("  ")).is_empty());
        assert!(parse_tags(None).is_empty());
    }

    #[test]
    fn file_sizes_are_humanized() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(3 * 1024 * 1024), "3 MB");
        assert_eq!(format_file_size(-5), "0 B");
    }

    #[test]
    fn file_versus_link() {
        let file = library_resource_view(&library_row(Some("/files/a.pdf"), None, Some(2048)));
        assert!(file.is_file);
        assert!(!file.is_external_link);
        assert_eq!(file.file_size_human.as_deref(), Some("2 KB"));

        let link = library_resource_view(&library_row(Some("/files/a.pdf"), Some("https://sunnah.com"), None));
        assert!(!link.is_file);
        assert!(link.is_external_link);
        assert_eq!(link.file_size_human, None);
        assert_eq!(link.tags_array, vec!["hadith", "akhlaq"]);
    }

    #[test]
    fn submission_percentage_needs_grade_and_assignment() {
        let sub = SubmissionRow {
            id: "sub-1".into(),
            assignment_id: "a-1".into(),
            student_id: "s-1".into(),
            content: Some("Isnad chart".into()),
            file_url: None,
            file_name: None,
            file_size: None,
            link_url: None,
            status: "graded".into(),
            submitted_at: "2025-03-01T10:00:00Z".into(),
            is_late: false,
            attempt_number: 1,
            grade: Some(18.0),
            graded_at: Some("2025-03-02T10:00:00Z".into()),
            graded_by: Some("u-9".into()),
            feedback: None,
            instructor_notes: None,
        };
        let assignment = AssignmentRow {
            id: "a-1".into(),
            course_id: "c-1".into(),
            title: "Isnad".into(),
            description: None,
            due_date: None,
            max_points: 20.0,
            created_at: "2025-02-01T00:00:00Z".into(),
        };

        let bare = submission_view(&sub, SubmissionRelations::default());
        assert!(bare.is_graded);
        assert_eq!(bare.grade_percentage, None);
        let json = serde_json::to_value(&bare).expect("serialize");
        assert!(!json.as_object().expect("object").contains_key("grade_percentage"));

        let loaded = submission_view(
            &sub,
            SubmissionRelations {
                assignment: Some(assignment_view(&assignment)),
                ..SubmissionRelations::default()
            },
        );
        assert_eq!(loaded.grade_percentage, Some(90.0));
    }
}
