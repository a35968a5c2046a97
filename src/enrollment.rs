use crate::db::{self, EnrollmentRow};
use crate::error::{LmsError, LmsResult};
use rusqlite::Connection;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentStatus {
    Pending,
    Enrolled,
    Dropped,
    Completed,
    Rejected,
}

impl EnrollmentStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "enrolled" => Some(Self::Enrolled),
            "dropped" => Some(Self::Dropped),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Enrolled => "enrolled",
            Self::Dropped => "dropped",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    /// pending -> enrolled | rejected, enrolled -> dropped | completed.
    pub fn apply(self, action: EnrollmentAction) -> Option<Self> {
        match (self, action) {
            (Self::Pending, EnrollmentAction::Approve) => Some(Self::Enrolled),
            (Self::Pending, EnrollmentAction::Reject) => Some(Self::Rejected),
            (Self::Enrolled, EnrollmentAction::Drop) => Some(Self::Dropped),
            (Self::Enrolled, EnrollmentAction::Complete) => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentAction {
    Approve,
    Reject,
    Drop,
    Complete,
}

impl EnrollmentAction {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Drop => "drop",
            Self::Complete => "complete",
        }
    }
}

fn current_status(row: &EnrollmentRow) -> LmsResult<EnrollmentStatus> {
    EnrollmentStatus::parse(&row.status).ok_or_else(|| {
        LmsError::Conflict(format!("enrollment has unknown status '{}'", row.status))
    })
}

fn check_transition(row: &EnrollmentRow, action: EnrollmentAction) -> LmsResult<EnrollmentStatus> {
    let from = current_status(row)?;
    from.apply(action).ok_or(LmsError::InvalidTransition {
        from: from.as_str().to_string(),
        action: action.verb(),
    })
}

fn load(conn: &Connection, enrollment_id: &str) -> LmsResult<EnrollmentRow> {
    db::enrollment_get(conn, enrollment_id)?.ok_or(LmsError::NotFound("enrollment"))
}

/// Move the row from the status it was read with into `next`. Zero rows touched means
/// someone else changed the status since it was read.
fn guarded_status_update(
    conn: &Connection,
    row: &EnrollmentRow,
    next: EnrollmentStatus,
    extra_set: &str,
    now: &str,
) -> LmsResult<()> {
    let sql = format!(
        "UPDATE course_enrollments
         SET status = ?1, updated_at = ?2{extra_set}
         WHERE id = ?3 AND status = ?4"
    );
    let changed = conn.execute(&sql, (next.as_str(), now, &row.id, &row.status))?;
    if changed != 1 {
        return Err(LmsError::Conflict(
            "enrollment was modified concurrently; reload and retry".to_string(),
        ));
    }
    Ok(())
}

/// New registration request. Always starts out pending.
pub fn request(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
    notes: Option<&str>,
) -> LmsResult<EnrollmentRow> {
    let student = db::user_get(conn, student_id)?.ok_or(LmsError::NotFound("student"))?;
    if student.role != "student" {
        return Err(LmsError::bad_params("only students can enroll in courses"));
    }
    let course = db::course_get(conn, course_id)?.ok_or(LmsError::NotFound("course"))?;
    if !course.is_active {
        return Err(LmsError::Conflict("course is not open for enrollment".to_string()));
    }
    if db::enrollment_for_pair(conn, student_id, course_id)?.is_some() {
        return Err(LmsError::Conflict(
            "student already has an enrollment for this course".to_string(),
        ));
    }

    let id = Uuid::new_v4().to_string();
    let now = db::now_rfc3339();
    conn.execute(
        "INSERT INTO course_enrollments(
            id, course_id, student_id, status, progress_percentage, notes, created_at, updated_at
         ) VALUES(?, ?, ?, 'pending', 0, ?, ?, ?)",
        (&id, course_id, student_id, notes, &now, &now),
    )?;
    tracing::info!(enrollment_id = %id, student_id, course_id, "enrollment requested");
    load(conn, &id)
}

/// Approval takes a seat. The seat count is bumped with a conditional update in
/// the same transaction as the status change, so a full course is never
/// over-filled even with several writers on one workspace.
pub fn approve(conn: &Connection, enrollment_id: &str) -> LmsResult<EnrollmentRow> {
    let tx = conn.unchecked_transaction()?;
    let row = load(&tx, enrollment_id)?;
    let next = check_transition(&row, EnrollmentAction::Approve)?;
    let now = db::now_rfc3339();

    let seated = tx.execute(
        "UPDATE courses
         SET current_enrollment = current_enrollment + 1, updated_at = ?
         WHERE id = ? AND deleted_at IS NULL AND current_enrollment < capacity",
        (&now, &row.course_id),
    )?;
    if seated != 1 {
        let course = db::course_get(&tx, &row.course_id)?.ok_or(LmsError::NotFound("course"))?;
        tracing::warn!(enrollment_id, course_id = %course.id, capacity = course.capacity, "approval refused, course full");
        return Err(LmsError::CourseFull {
            course_id: course.id,
            capacity: course.capacity,
        });
    }

    guarded_status_update(&tx, &row, next, ", enrolled_at = ?2", &now)?;
    tx.commit()?;
    tracing::info!(enrollment_id, course_id = %row.course_id, "enrollment approved");
    load(conn, enrollment_id)
}

pub fn reject(conn: &Connection, enrollment_id: &str) -> LmsResult<EnrollmentRow> {
    let row = load(conn, enrollment_id)?;
    let next = check_transition(&row, EnrollmentAction::Reject)?;
    let now = db::now_rfc3339();
    guarded_status_update(conn, &row, next, "", &now)?;
    tracing::info!(enrollment_id, "enrollment rejected");
    load(conn, enrollment_id)
}

/// Dropping frees the seat taken at approval.
pub fn drop_enrollment(conn: &Connection, enrollment_id: &str) -> LmsResult<EnrollmentRow> {
    let tx = conn.unchecked_transaction()?;
    let row = load(&tx, enrollment_id)?;
    let next = check_transition(&row, EnrollmentAction::Drop)?;
    let now = db::now_rfc3339();
    guarded_status_update(&tx, &row, next, ", dropped_at = ?2", &now)?;
    release_seat(&tx, &row.course_id, &now)?;
    tx.commit()?;
    tracing::info!(enrollment_id, "enrollment dropped");
    load(conn, enrollment_id)
}

/// Completion pins progress at 100 and stamps completed_at together, keeping
/// both halves of the completed invariant in one write.
pub fn complete(
    conn: &Connection,
    enrollment_id: &str,
    final_grade: Option<f64>,
) -> LmsResult<EnrollmentRow> {
    if let Some(g) = final_grade {
        if !(0.0..=100.0).contains(&g) {
            return Err(LmsError::bad_params("finalGrade must be between 0 and 100"));
        }
    }
    let tx = conn.unchecked_transaction()?;
    let row = load(&tx, enrollment_id)?;
    let next = check_transition(&row, EnrollmentAction::Complete)?;
    let now = db::now_rfc3339();
    guarded_status_update(
        &tx,
        &row,
        next,
        ", completed_at = ?2, progress_percentage = 100",
        &now,
    )?;
    if let Some(g) = final_grade {
        tx.execute(
            "UPDATE course_enrollments SET final_grade = ? WHERE id = ?",
            (g, enrollment_id),
        )?;
    }
    tx.commit()?;
    tracing::info!(enrollment_id, "enrollment completed");
    load(conn, enrollment_id)
}

/// Progress below 100 only; reaching 100 goes through `complete`.
pub fn set_progress(conn: &Connection, enrollment_id: &str, progress: i64) -> LmsResult<EnrollmentRow> {
    if !(0..=99).contains(&progress) {
        return Err(LmsError::bad_params(
            "progress must be between 0 and 99; complete the enrollment to reach 100",
        ));
    }
    let row = load(conn, enrollment_id)?;
    let status = current_status(&row)?;
    if status != EnrollmentStatus::Enrolled {
        return Err(LmsError::InvalidTransition {
            from: status.as_str().to_string(),
            action: "update progress of",
        });
    }
    conn.execute(
        "UPDATE course_enrollments SET progress_percentage = ?, updated_at = ? WHERE id = ?",
        (progress, db::now_rfc3339(), enrollment_id),
    )?;
    load(conn, enrollment_id)
}

/// Hard delete. An enrolled row gives its seat back.
pub fn delete(conn: &Connection, enrollment_id: &str) -> LmsResult<()> {
    let tx = conn.unchecked_transaction()?;
    let row = load(&tx, enrollment_id)?;
    tx.execute("DELETE FROM course_enrollments WHERE id = ?", [enrollment_id])?;
    if row.status == EnrollmentStatus::Enrolled.as_str() {
        release_seat(&tx, &row.course_id, &db::now_rfc3339())?;
    }
    tx.commit()?;
    tracing::info!(enrollment_id, "enrollment deleted");
    Ok(())
}

fn release_seat(conn: &Connection, course_id: &str, now: &str) -> LmsResult<()> {
    conn.execute(
        "UPDATE courses
         SET current_enrollment = MAX(current_enrollment - 1, 0), updated_at = ?
         WHERE id = ?",
        (now, course_id),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn seed(conn: &Connection, capacity: i64, students: usize) -> (String, Vec<String>) {
        let now = db::now_rfc3339();
        let course_id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO courses(id, code, name, capacity, created_at, updated_at)
             VALUES(?, 'FIQ101', 'Fiqh I', ?, ?, ?)",
            (&course_id, capacity, &now, &now),
        )
        .expect("insert course");
        let mut ids = Vec::new();
        for i in 0..students {
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO users(id, name, email, role, created_at, updated_at)
                 VALUES(?, ?, ?, 'student', ?, ?)",
                (&id, format!("Student {i}"), format!("s{i}@example.edu"), &now, &now),
            )
            .expect("insert student");
            ids.push(id);
        }
        (course_id, ids)
    }

    fn seats(conn: &Connection, course_id: &str) -> i64 {
        conn.query_row(
            "SELECT current_enrollment FROM courses WHERE id = ?",
            [course_id],
            |r| r.get(0),
        )
        .expect("seat count")
    }

    #[test]
    fn transitions_follow_the_lifecycle() {
        use EnrollmentAction::*;
        use EnrollmentStatus::*;
        assert_eq!(Pending.apply(Approve), Some(Enrolled));
        assert_eq!(Pending.apply(Reject), Some(Rejected));
        assert_eq!(Enrolled.apply(Drop), Some(Dropped));
        assert_eq!(Enrolled.apply(Complete), Some(Completed));
        assert_eq!(Pending.apply(Complete), None);
        assert_eq!(Rejected.apply(Approve), None);
        assert_eq!(Completed.apply(Drop), None);
        assert_eq!(Dropped.apply(Approve), None);
    }

    #[test]
    fn approval_stops_at_capacity() {
        let ws = temp_dir("lmsd-enroll-capacity");
        let conn = db::open_db(&ws).expect("open db");
        let (course_id, students) = seed(&conn, 2, 3);

        let pending: Vec<EnrollmentRow> = students
            .iter()
            .map(|s| request(&conn, s, &course_id, None).expect("request"))
            .collect();

        approve(&conn, &pending[0].id).expect("first seat");
        approve(&conn, &pending[1].id).expect("second seat");
        let err = approve(&conn, &pending[2].id).expect_err("third must be refused");
        assert_eq!(err.code(), "course_full");
        assert_eq!(seats(&conn, &course_id), 2);

        // The refused row is untouched and can still be approved once a seat frees up.
        let still_pending = db::enrollment_get(&conn, &pending[2].id)
            .expect("query")
            .expect("row");
        assert_eq!(still_pending.status, "pending");

        drop_enrollment(&conn, &pending[0].id).expect("drop");
        assert_eq!(seats(&conn, &course_id), 1);
        approve(&conn, &pending[2].id).expect("seat after drop");
        assert_eq!(seats(&conn, &course_id), 2);
    }

    #[test]
    fn completion_sets_progress_and_timestamp_together() {
        let ws = temp_dir("lmsd-enroll-complete");
        let conn = db::open_db(&ws).expect("open db");
        let (course_id, students) = seed(&conn, 10, 1);

        let e = request(&conn, &students[0], &course_id, None).expect("request");
        assert!(complete(&conn, &e.id, None).is_err());
        approve(&conn, &e.id).expect("approve");
        set_progress(&conn, &e.id, 40).expect("progress");
        assert!(set_progress(&conn, &e.id, 100).is_err());

        let done = complete(&conn, &e.id, Some(88.5)).expect("complete");
        assert_eq!(done.status, "completed");
        assert_eq!(done.progress_percentage, 100);
        assert!(done.completed_at.is_some());
        assert_eq!(done.final_grade, Some(88.5));

        let err = drop_enrollment(&conn, &e.id).expect_err("completed cannot drop");
        assert_eq!(err.code(), "invalid_transition");
    }

    #[test]
    fn duplicate_requests_conflict() {
        let ws = temp_dir("lmsd-enroll-dup");
        let conn = db::open_db(&ws).expect("open db");
        let (course_id, students) = seed(&conn, 10, 1);

        request(&conn, &students[0], &course_id, Some("first")).expect("request");
        let err = request(&conn, &students[0], &course_id, None).expect_err("duplicate");
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn deleting_an_enrolled_row_releases_its_seat() {
        let ws = temp_dir("lmsd-enroll-delete");
        let conn = db::open_db(&ws).expect("open db");
        let (course_id, students) = seed(&conn, 5, 2);

        let a = request(&conn, &students[0], &course_id, None).expect("request a");
        let b = request(&conn, &students[1], &course_id, None).expect("request b");
        approve(&conn, &a.id).expect("approve a");
        assert_eq!(seats(&conn, &course_id), 1);

        delete(&conn, &b.id).expect("delete pending");
        assert_eq!(seats(&conn, &course_id), 1);
        delete(&conn, &a.id).expect("delete enrolled");
        assert_eq!(seats(&conn, &course_id), 0);
    }
}
