use crate::calc::{self, LetterPolicy};
use crate::db::{self, CourseFilter, GradeFilter};
use crate::error::LmsResult;
use crate::ipc::error::respond;
use crate::ipc::helpers::{
    load_course, require_actor, require_conn, require_course_manager, str_param,
};
use crate::ipc::types::{Actor, AppState, Request, Role};
use rusqlite::{params, Connection, Params};
use serde_json::json;

fn count<P: Params>(conn: &Connection, sql: &str, params: P) -> LmsResult<i64> {
    Ok(conn.query_row(sql, params, |r| r.get(0))?)
}

fn student_stats(conn: &Connection, actor: &Actor) -> LmsResult<serde_json::Value> {
    let mut enrolled = 0;
    let mut pending = 0;
    let mut completed = 0;
    let mut total_sks = 0;
    for e in db::enrollments_for_student(conn, &actor.user_id)? {
        match e.status.as_str() {
            "enrolled" => {
                enrolled += 1;
                if let Some(c) = db::course_get(conn, &e.course_id)? {
                    total_sks += c.credit_hours;
                }
            }
            "pending" => pending += 1,
            "completed" => completed += 1,
            _ => {}
        }
    }
    let stats = calc::student_academic_stats(conn, &actor.user_id)?;
    Ok(json!({
        "role": actor.role.as_str(),
        "enrolledCourses": enrolled,
        "pendingRequests": pending,
        "completedCourses": completed,
        "totalSks": total_sks,
        "coursesCompleted": stats.courses_completed,
        "totalCredits": stats.total_credits,
        "gpa": stats.gpa,
    }))
}

fn faculty_stats(conn: &Connection, actor: &Actor) -> LmsResult<serde_json::Value> {
    let courses = db::courses_list(
        conn,
        &CourseFilter {
            instructor_id: Some(actor.user_id.clone()),
            ..CourseFilter::default()
        },
    )?;

    let mut total_students = 0;
    let mut pending_approvals = 0;
    let mut course_grades = Vec::with_capacity(courses.len());
    for c in &courses {
        let enrollments = db::enrollments_for_course(conn, &c.id)?;
        let students = enrollments.iter().filter(|e| e.status == "enrolled").count();
        total_students += students;
        pending_approvals += enrollments.iter().filter(|e| e.status == "pending").count();

        let grades = db::grades_list(
            conn,
            &GradeFilter {
                course_id: Some(&c.id),
                ..GradeFilter::default()
            },
        )?;
        let average = if grades.is_empty() {
            None
        } else {
            let mean = grades.iter().map(|g| g.grade).sum::<f64>() / grades.len() as f64;
            Some((mean * 100.0).round() / 100.0)
        };
        course_grades.push(json!({
            "courseId": c.id,
            "courseCode": c.code,
            "courseName": c.name,
            "averageGrade": average,
            "studentsCount": students,
        }));
    }

    Ok(json!({
        "role": actor.role.as_str(),
        "totalCourses": courses.len(),
        "activeCourses": courses.iter().filter(|c| c.is_active).count(),
        "totalStudents": total_students,
        "pendingApprovals": pending_approvals,
        "courseGrades": course_grades,
    }))
}

fn admin_stats(conn: &Connection, actor: &Actor) -> LmsResult<serde_json::Value> {
    let users_sql = "SELECT COUNT(*) FROM users WHERE deleted_at IS NULL AND (?1 IS NULL OR role = ?1)";
    let students = db::users_list(conn, Some(Role::Student.as_str()))?;
    let mut gpas = Vec::with_capacity(students.len());
    for s in &students {
        let stats = calc::student_academic_stats(conn, &s.id)?;
        gpas.push(stats.gpa.parse::<f64>().unwrap_or(0.0));
    }

    let live_enrollments = "SELECT COUNT(*) FROM course_enrollments e
         JOIN courses c ON c.id = e.course_id
         WHERE c.deleted_at IS NULL AND (?1 IS NULL OR e.status = ?1)";

    Ok(json!({
        "role": actor.role.as_str(),
        "users": {
            "total": count(conn, users_sql, [None::<&str>])?,
            "students": students.len(),
            "faculty": count(conn, users_sql, [Role::Faculty.as_str()])?,
            "admins": count(conn, users_sql, [Role::ProdiAdmin.as_str()])?
                + count(conn, users_sql, [Role::Management.as_str()])?,
        },
        "totalStudents": students.len(),
        "totalCourses": count(conn, "SELECT COUNT(*) FROM courses WHERE deleted_at IS NULL", params![])?,
        "activeCourses": count(
            conn,
            "SELECT COUNT(*) FROM courses WHERE deleted_at IS NULL AND is_active = 1",
            params![],
        )?,
        "totalEnrollments": count(conn, live_enrollments, [None::<&str>])?,
        "activeEnrollments": count(conn, live_enrollments, ["enrolled"])?,
        "completedEnrollments": count(conn, live_enrollments, ["completed"])?,
        "averageGpa": calc::average_gpa(&gpas),
    }))
}

fn handle_dashboard_stats(state: &mut AppState, req: &Request) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    match actor.role {
        Role::Student => student_stats(conn, actor),
        Role::Faculty => faculty_stats(conn, actor),
        Role::ProdiAdmin | Role::Management => admin_stats(conn, actor),
    }
}

/// Coarse-letter histogram of every grade row in one course.
fn handle_dashboard_grade_distribution(
    state: &mut AppState,
    req: &Request,
) -> LmsResult<serde_json::Value> {
    let conn = require_conn(state)?;
    let actor = require_actor(req)?;
    let course_id = str_param(&req.params, "courseId")?;
    let course = load_course(conn, &course_id)?;
    require_course_manager(actor, &course)?;

    let mut distribution = serde_json::Map::new();
    for letter in LetterPolicy::Coarse.letters() {
        distribution.insert(letter.to_string(), json!(0));
    }
    let grades = db::grades_list(
        conn,
        &GradeFilter {
            course_id: Some(&course_id),
            ..GradeFilter::default()
        },
    )?;
    for g in &grades {
        let letter = LetterPolicy::Coarse.letter_for(g.grade);
        if let Some(slot) = distribution.get_mut(letter) {
            *slot = json!(slot.as_i64().unwrap_or(0) + 1);
        }
    }
    Ok(json!({
        "courseId": course_id,
        "total": grades.len(),
        "distribution": distribution,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "dashboard.stats" => handle_dashboard_stats(state, req),
        "dashboard.gradeDistribution" => handle_dashboard_grade_distribution(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
