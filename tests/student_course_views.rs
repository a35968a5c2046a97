mod test_support;

use serde_json::json;
use test_support::{actor, admin, Session};

#[test]
fn profile_gpa_weights_completed_courses_by_credit_hours() {
    let mut s = Session::start("lmsd-profile-gpa");
    let faculty = s.user("Dosen Bahasa", "faculty");
    let student = s.user("Student G", "student");
    let three_credit = s.course("ARB301", &faculty, 3, 20);
    let two_credit = s.course("ARB201", &faculty, 2, 20);
    let in_progress = s.course("ARB101", &faculty, 4, 20);

    let e1 = s.enroll(&student, &three_credit);
    let e2 = s.enroll(&student, &two_credit);
    s.enroll(&student, &in_progress);

    // 92 -> A (4.0), mean of 76 and 78 -> 77 -> B (3.0).
    s.grade(&student, &three_credit, 92.0);
    s.grade(&student, &two_credit, 76.0);
    s.grade(&student, &two_credit, 78.0);
    // Graded but not completed: ignored by the rollup.
    s.grade(&student, &in_progress, 40.0);

    s.ok("enrollments.complete", json!({ "enrollmentId": e1 }), admin());
    s.ok("enrollments.complete", json!({ "enrollmentId": e2 }), admin());

    let profile = s.ok("students.profile", json!({}), actor(&student, "student"));
    assert_eq!(profile["coursesCompleted"], 2);
    assert_eq!(profile["totalCredits"], 5);
    assert_eq!(profile["totalSks"], 5);
    assert_eq!(profile["gpa"], "3.60");

    // Staff may read any student's profile.
    let by_staff = s.ok(
        "students.profile",
        json!({ "studentId": student }),
        actor(&faculty, "faculty"),
    );
    assert_eq!(by_staff["gpa"], "3.60");
}

#[test]
fn profile_of_a_student_without_completions_is_zero() {
    let mut s = Session::start("lmsd-profile-empty");
    let student = s.user("Student H", "student");
    let profile = s.ok("students.profile", json!({}), actor(&student, "student"));
    assert_eq!(profile["coursesCompleted"], 0);
    assert_eq!(profile["totalCredits"], 0);
    assert_eq!(profile["gpa"], "0.00");
}

#[test]
fn course_list_reports_progress_and_course_grade() {
    let mut s = Session::start("lmsd-student-courses");
    let faculty = s.user("Dosen Ushul", "faculty");
    let student = s.user("Student I", "student");
    let course = s.course("USH101", &faculty, 3, 20);
    let enrollment = s.enroll(&student, &course);

    s.ok(
        "enrollments.setProgress",
        json!({ "enrollmentId": enrollment, "progress": 60 }),
        admin(),
    );
    s.grade(&student, &course, 80.0);
    s.grade(&student, &course, 90.0);

    let listed = s.ok("students.courses", json!({}), actor(&student, "student"));
    let courses = listed["courses"].as_array().expect("courses");
    assert_eq!(courses.len(), 1);
    let c = &courses[0];
    assert_eq!(c["id"], "USH101");
    assert_eq!(c["courseId"], course.as_str());
    assert_eq!(c["progress"], 60);
    assert_eq!(c["gradeNumeric"], 85);
    assert_eq!(c["gradeLetter"], "A-");
    assert!(c["completionDate"].is_null());
    assert_eq!(c["instructor"], "Dosen Ushul");
    assert_eq!(c["students_count"], 1);
    // Assignments are only loaded on the single-course view.
    assert!(c.get("assignments").is_none());
}

#[test]
fn single_course_view_loads_assignments() {
    let mut s = Session::start("lmsd-student-course");
    let faculty = s.user("Dosen Mantiq", "faculty");
    let student = s.user("Student J", "student");
    let course = s.course("MAN101", &faculty, 2, 20);

    s.ok(
        "assignments.create",
        json!({ "courseId": course, "title": "Syllogism set", "dueDate": "2025-10-01" }),
        actor(&faculty, "faculty"),
    );

    // Not enrolled yet: the view still resolves, with no progress and no grade.
    let view = s.ok(
        "students.course",
        json!({ "courseId": course }),
        actor(&student, "student"),
    );
    let c = &view["course"];
    assert_eq!(c["progress"], 0);
    assert!(c["gradeLetter"].is_null());
    assert!(c["gradeNumeric"].is_null());
    let assignments = c["assignments"].as_array().expect("assignments");
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0]["title"], "Syllogism set");
    assert_eq!(assignments[0]["maxPoints"], 100.0);
}

#[test]
fn catalog_covers_unenrolled_courses() {
    let mut s = Session::start("lmsd-student-catalog");
    let faculty = s.user("Dosen Nahwu", "faculty");
    let student = s.user("Student K", "student");
    let enrolled = s.course("NAH101", &faculty, 2, 20);
    s.course("NAH201", &faculty, 2, 20);
    s.enroll(&student, &enrolled);

    let listed = s.ok("students.courses", json!({}), actor(&student, "student"));
    assert_eq!(listed["courses"].as_array().map(|a| a.len()), Some(1));

    let catalog = s.ok("students.catalog", json!({}), actor(&student, "student"));
    let codes: Vec<&str> = catalog["courses"]
        .as_array()
        .expect("courses")
        .iter()
        .filter_map(|c| c["code"].as_str())
        .collect();
    assert_eq!(codes, vec!["NAH101", "NAH201"]);
}

#[test]
fn students_cannot_read_each_other() {
    let mut s = Session::start("lmsd-student-privacy");
    let a = s.user("Student L", "student");
    let b = s.user("Student M", "student");

    assert_eq!(
        s.err(
            "students.profile",
            json!({ "studentId": b }),
            actor(&a, "student"),
        ),
        "forbidden"
    );
    assert_eq!(
        s.err("students.courses", json!({}), None),
        "forbidden"
    );
}
