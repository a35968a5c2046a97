use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;

pub const DB_FILE_NAME: &str = "lms.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get::<_, String>(0))?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL,
            student_no TEXT,
            major_id TEXT,
            deleted_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_role ON users(role)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            description TEXT,
            instructor_id TEXT,
            faculty_id TEXT,
            major_id TEXT,
            credit_hours INTEGER NOT NULL DEFAULT 3,
            capacity INTEGER NOT NULL DEFAULT 50,
            current_enrollment INTEGER NOT NULL DEFAULT 0,
            semester TEXT NOT NULL DEFAULT 'Fall',
            year INTEGER,
            schedule TEXT,
            room TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            deleted_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(instructor_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_instructor ON courses(instructor_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_major ON courses(major_id)",
        [],
    )?;
    // Presentation fields arrived after the first schema; add them to older workspaces.
    ensure_courses_presentation_columns(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_enrollments(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            enrolled_at TEXT,
            completed_at TEXT,
            final_grade REAL,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(student_id) REFERENCES users(id),
            UNIQUE(course_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON course_enrollments(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_status ON course_enrollments(status)",
        [],
    )?;
    ensure_enrollments_progress_columns(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            due_date TEXT,
            max_points REAL NOT NULL DEFAULT 100,
            created_at TEXT NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_course ON assignments(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            assignment_id TEXT,
            grade REAL NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(assignment_id) REFERENCES assignments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student_course ON grades(user_id, course_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_assignment ON grades(assignment_id)",
        [],
    )?;
    ensure_grades_grading_columns(&conn)?;
    ensure_grades_one_row_per_assignment(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignment_submissions(
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            content TEXT,
            file_url TEXT,
            file_name TEXT,
            file_size INTEGER,
            link_url TEXT,
            status TEXT NOT NULL DEFAULT 'submitted',
            submitted_at TEXT NOT NULL,
            is_late INTEGER NOT NULL DEFAULT 0,
            attempt_number INTEGER NOT NULL DEFAULT 1,
            grade REAL,
            graded_at TEXT,
            graded_by TEXT,
            feedback TEXT,
            instructor_notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            FOREIGN KEY(student_id) REFERENCES users(id),
            UNIQUE(assignment_id, student_id, attempt_number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submissions_student ON assignment_submissions(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS library_resources(
            id TEXT PRIMARY KEY,
            course_id TEXT,
            title TEXT NOT NULL,
            description TEXT,
            resource_type TEXT,
            file_url TEXT,
            file_size INTEGER,
            external_link TEXT,
            author TEXT,
            tags TEXT,
            is_published INTEGER NOT NULL DEFAULT 1,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(created_by) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_library_resources_course ON library_resources(course_id)",
        [],
    )?;

    // Older workspaces may hold completed rows whose stored progress lags behind.
    migrate_completed_enrollment_progress(&conn)?;

    Ok(conn)
}

fn ensure_courses_presentation_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "courses", "mode")? {
        conn.execute("ALTER TABLE courses ADD COLUMN mode TEXT", [])?;
    }
    if !table_has_column(conn, "courses", "image_url")? {
        conn.execute("ALTER TABLE courses ADD COLUMN image_url TEXT", [])?;
    }
    Ok(())
}

fn ensure_enrollments_progress_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "course_enrollments", "progress_percentage")? {
        conn.execute(
            "ALTER TABLE course_enrollments ADD COLUMN progress_percentage INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    if !table_has_column(conn, "course_enrollments", "dropped_at")? {
        conn.execute("ALTER TABLE course_enrollments ADD COLUMN dropped_at TEXT", [])?;
    }
    Ok(())
}

fn ensure_grades_grading_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "grades", "grade_letter")? {
        conn.execute("ALTER TABLE grades ADD COLUMN grade_letter TEXT", [])?;
    }
    if !table_has_column(conn, "grades", "comments")? {
        conn.execute("ALTER TABLE grades ADD COLUMN comments TEXT", [])?;
    }
    Ok(())
}

/// Re-grading an assignment replaces its row. Workspaces written before the unique
/// index existed may hold several rows per (student, assignment); the newest one wins.
fn ensure_grades_one_row_per_assignment(conn: &Connection) -> anyhow::Result<()> {
    if index_exists(conn, "ux_grades_student_assignment")? {
        return Ok(());
    }
    let tx = conn.unchecked_transaction()?;
    let removed = tx.execute(
        "DELETE FROM grades
         WHERE assignment_id IS NOT NULL
           AND rowid NOT IN (
             SELECT rowid FROM (
               SELECT rowid,
                      ROW_NUMBER() OVER (
                        PARTITION BY user_id, assignment_id
                        ORDER BY updated_at DESC, rowid DESC
                      ) AS rn
               FROM grades
               WHERE assignment_id IS NOT NULL
             ) WHERE rn = 1
           )",
        [],
    )?;
    tx.execute(
        "CREATE UNIQUE INDEX ux_grades_student_assignment
         ON grades(user_id, assignment_id) WHERE assignment_id IS NOT NULL",
        [],
    )?;
    tx.commit()?;
    if removed > 0 {
        tracing::warn!(removed, "collapsed duplicate assignment grades");
    }
    Ok(())
}

fn index_exists(conn: &Connection, name: &str) -> anyhow::Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND name = ?",
            [name],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn migrate_completed_enrollment_progress(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE course_enrollments SET progress_percentage = 100
         WHERE status = 'completed' AND progress_percentage <> 100",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

// ---------------------------------------------------------------------------
// Row types and loaders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub student_no: Option<String>,
    pub major_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

const USER_COLUMNS: &str =
    "id, name, email, role, student_no, major_id, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        student_no: row.get(4)?,
        major_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub fn user_get(conn: &Connection, id: &str) -> rusqlite::Result<Option<UserRow>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? AND deleted_at IS NULL"),
        [id],
        user_from_row,
    )
    .optional()
}

pub fn users_list(conn: &Connection, role: Option<&str>) -> rusqlite::Result<Vec<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users
         WHERE deleted_at IS NULL AND (?1 IS NULL OR role = ?1)
         ORDER BY name, id"
    ))?;
    let rows = stmt
        .query_map([role], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone)]
pub struct CourseRow {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub instructor_id: Option<String>,
    pub faculty_id: Option<String>,
    pub major_id: Option<String>,
    pub credit_hours: i64,
    pub capacity: i64,
    pub current_enrollment: i64,
    pub semester: String,
    pub year: Option<i64>,
    pub schedule: Option<String>,
    pub room: Option<String>,
    pub mode: Option<String>,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

const COURSE_COLUMNS: &str = "id, code, name, description, instructor_id, faculty_id, major_id,
    credit_hours, capacity, current_enrollment, semester, year, schedule, room, mode,
    image_url, is_active, created_at, updated_at";

fn course_from_row(row: &Row<'_>) -> rusqlite::Result<CourseRow> {
    Ok(CourseRow {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        instructor_id: row.get(4)?,
        faculty_id: row.get(5)?,
        major_id: row.get(6)?,
        credit_hours: row.get(7)?,
        capacity: row.get(8)?,
        current_enrollment: row.get(9)?,
        semester: row.get(10)?,
        year: row.get(11)?,
        schedule: row.get(12)?,
        room: row.get(13)?,
        mode: row.get(14)?,
        image_url: row.get(15)?,
        is_active: row.get::<_, i64>(16)? != 0,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

pub fn course_get(conn: &Connection, id: &str) -> rusqlite::Result<Option<CourseRow>> {
    conn.query_row(
        &format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ? AND deleted_at IS NULL"),
        [id],
        course_from_row,
    )
    .optional()
}

#[derive(Debug, Clone, Default)]
pub struct CourseFilter {
    pub semester: Option<String>,
    pub year: Option<i64>,
    pub major_id: Option<String>,
    pub instructor_id: Option<String>,
    pub active_only: bool,
}

pub fn courses_list(conn: &Connection, filter: &CourseFilter) -> rusqlite::Result<Vec<CourseRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses
         WHERE deleted_at IS NULL
           AND (?1 IS NULL OR semester = ?1)
           AND (?2 IS NULL OR year = ?2)
           AND (?3 IS NULL OR major_id = ?3)
           AND (?4 IS NULL OR instructor_id = ?4)
           AND (?5 = 0 OR is_active = 1)
         ORDER BY code"
    ))?;
    let rows = stmt
        .query_map(
            (
                filter.semester.as_deref(),
                filter.year,
                filter.major_id.as_deref(),
                filter.instructor_id.as_deref(),
                filter.active_only as i64,
            ),
            course_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone)]
pub struct EnrollmentRow {
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
}

const ENROLLMENT_COLUMNS: &str = "id, course_id, student_id, status, progress_percentage,
    final_grade, enrolled_at, completed_at, dropped_at, notes, created_at, updated_at";

fn enrollment_from_row(row: &Row<'_>) -> rusqlite::Result<EnrollmentRow> {
    Ok(EnrollmentRow {
        id: row.get(0)?,
        course_id: row.get(1)?,
        student_id: row.get(2)?,
        status: row.get(3)?,
        progress_percentage: row.get(4)?,
        final_grade: row.get(5)?,
        enrolled_at: row.get(6)?,
        completed_at: row.get(7)?,
        dropped_at: row.get(8)?,
        notes: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

pub fn enrollment_get(conn: &Connection, id: &str) -> rusqlite::Result<Option<EnrollmentRow>> {
    conn.query_row(
        &format!("SELECT {ENROLLMENT_COLUMNS} FROM course_enrollments WHERE id = ?"),
        [id],
        enrollment_from_row,
    )
    .optional()
}

/// At most one row exists per pair (UNIQUE(course_id, student_id)).
pub fn enrollment_for_pair(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
) -> rusqlite::Result<Option<EnrollmentRow>> {
    conn.query_row(
        &format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM course_enrollments
             WHERE student_id = ? AND course_id = ?"
        ),
        [student_id, course_id],
        enrollment_from_row,
    )
    .optional()
}

pub fn enrollments_for_student(
    conn: &Connection,
    student_id: &str,
) -> rusqlite::Result<Vec<EnrollmentRow>> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.course_id, e.student_id, e.status, e.progress_percentage,
                e.final_grade, e.enrolled_at, e.completed_at, e.dropped_at, e.notes,
                e.created_at, e.updated_at
         FROM course_enrollments e
         JOIN courses c ON c.id = e.course_id
         WHERE e.student_id = ? AND c.deleted_at IS NULL
         ORDER BY c.code",
    )?;
    let rows = stmt
        .query_map([student_id], enrollment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn enrollments_for_course(
    conn: &Connection,
    course_id: &str,
) -> rusqlite::Result<Vec<EnrollmentRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENROLLMENT_COLUMNS} FROM course_enrollments
         WHERE course_id = ?
         ORDER BY created_at, id"
    ))?;
    let rows = stmt
        .query_map([course_id], enrollment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone)]
pub struct AssignmentRow {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub max_points: f64,
    pub created_at: String,
}

const ASSIGNMENT_COLUMNS: &str =
    "id, course_id, title, description, due_date, max_points, created_at";

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<AssignmentRow> {
    Ok(AssignmentRow {
        id: row.get(0)?,
        course_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        due_date: row.get(4)?,
        max_points: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn assignment_get(conn: &Connection, id: &str) -> rusqlite::Result<Option<AssignmentRow>> {
    conn.query_row(
        &format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = ?"),
        [id],
        assignment_from_row,
    )
    .optional()
}

pub fn assignments_for_course(
    conn: &Connection,
    course_id: &str,
) -> rusqlite::Result<Vec<AssignmentRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments
         WHERE course_id = ?
         ORDER BY due_date IS NULL, due_date, title"
    ))?;
    let rows = stmt
        .query_map([course_id], assignment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone)]
pub struct GradeRow {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub assignment_id: Option<String>,
    pub grade: f64,
    pub grade_letter: Option<String>,
    pub comments: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

const GRADE_COLUMNS: &str = "g.id, g.user_id, g.course_id, g.assignment_id, g.grade,
    g.grade_letter, g.comments, g.created_at, g.updated_at";

fn grade_from_row(row: &Row<'_>) -> rusqlite::Result<GradeRow> {
    Ok(GradeRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        course_id: row.get(2)?,
        assignment_id: row.get(3)?,
        grade: row.get(4)?,
        grade_letter: row.get(5)?,
        comments: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub fn grade_get(conn: &Connection, id: &str) -> rusqlite::Result<Option<GradeRow>> {
    conn.query_row(
        &format!("SELECT {GRADE_COLUMNS} FROM grades g WHERE g.id = ?"),
        [id],
        grade_from_row,
    )
    .optional()
}

#[derive(Debug, Clone, Default)]
pub struct GradeFilter<'a> {
    pub user_id: Option<&'a str>,
    pub course_id: Option<&'a str>,
    pub assignment_id: Option<&'a str>,
}

/// Grades attached to soft-deleted courses are never returned.
pub fn grades_list(conn: &Connection, filter: &GradeFilter<'_>) -> rusqlite::Result<Vec<GradeRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GRADE_COLUMNS}
         FROM grades g
         JOIN courses c ON c.id = g.course_id
         WHERE c.deleted_at IS NULL
           AND (?1 IS NULL OR g.user_id = ?1)
           AND (?2 IS NULL OR g.course_id = ?2)
           AND (?3 IS NULL OR g.assignment_id = ?3)
         ORDER BY g.created_at, g.id"
    ))?;
    let rows = stmt
        .query_map(
            (filter.user_id, filter.course_id, filter.assignment_id),
            grade_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The single row holding a student's grade for one assignment.
pub fn grade_for_assignment(
    conn: &Connection,
    student_id: &str,
    assignment_id: &str,
) -> rusqlite::Result<Option<GradeRow>> {
    conn.query_row(
        &format!(
            "SELECT {GRADE_COLUMNS} FROM grades g
             WHERE g.user_id = ? AND g.assignment_id = ?"
        ),
        [student_id, assignment_id],
        grade_from_row,
    )
    .optional()
}

/// Raw numeric grades for one (student, course) pair.
pub fn grade_values_for_pair(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
) -> rusqlite::Result<Vec<f64>> {
    let mut stmt =
        conn.prepare("SELECT grade FROM grades WHERE user_id = ? AND course_id = ? ORDER BY rowid")?;
    let values = stmt
        .query_map([student_id, course_id], |r| r.get::<_, f64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(values)
}

#[derive(Debug, Clone)]
pub struct LibraryResourceRow {
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
}

const LIBRARY_COLUMNS: &str = "id, course_id, title, description, resource_type, file_url,
    file_size, external_link, author, tags, is_published, created_by, created_at, updated_at";

fn library_resource_from_row(row: &Row<'_>) -> rusqlite::Result<LibraryResourceRow> {
    Ok(LibraryResourceRow {
        id: row.get(0)?,
        course_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        resource_type: row.get(4)?,
        file_url: row.get(5)?,
        file_size: row.get(6)?,
        external_link: row.get(7)?,
        author: row.get(8)?,
        tags: row.get(9)?,
        is_published: row.get::<_, i64>(10)? != 0,
        created_by: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

pub fn library_resource_get(
    conn: &Connection,
    id: &str,
) -> rusqlite::Result<Option<LibraryResourceRow>> {
    conn.query_row(
        &format!("SELECT {LIBRARY_COLUMNS} FROM library_resources WHERE id = ?"),
        [id],
        library_resource_from_row,
    )
    .optional()
}

pub fn library_resources_list(
    conn: &Connection,
    course_id: Option<&str>,
    include_unpublished: bool,
) -> rusqlite::Result<Vec<LibraryResourceRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LIBRARY_COLUMNS} FROM library_resources
         WHERE (?1 IS NULL OR course_id = ?1)
           AND (?2 = 1 OR is_published = 1)
         ORDER BY title, id"
    ))?;
    let rows = stmt
        .query_map(
            (course_id, include_unpublished as i64),
            library_resource_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone)]
pub struct SubmissionRow {
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
    pub is_late: bool,
    pub attempt_number: i64,
    pub grade: Option<f64>,
    pub graded_at: Option<String>,
    pub graded_by: Option<String>,
    pub feedback: Option<String>,
    pub instructor_notes: Option<String>,
}

const SUBMISSION_COLUMNS: &str = "id, assignment_id, student_id, content, file_url, file_name,
    file_size, link_url, status, submitted_at, is_late, attempt_number, grade, graded_at,
    graded_by, feedback, instructor_notes";

fn submission_from_row(row: &Row<'_>) -> rusqlite::Result<SubmissionRow> {
    Ok(SubmissionRow {
        id: row.get(0)?,
        assignment_id: row.get(1)?,
        student_id: row.get(2)?,
        content: row.get(3)?,
        file_url: row.get(4)?,
        file_name: row.get(5)?,
        file_size: row.get(6)?,
        link_url: row.get(7)?,
        status: row.get(8)?,
        submitted_at: row.get(9)?,
        is_late: row.get::<_, i64>(10)? != 0,
        attempt_number: row.get(11)?,
        grade: row.get(12)?,
        graded_at: row.get(13)?,
        graded_by: row.get(14)?,
        feedback: row.get(15)?,
        instructor_notes: row.get(16)?,
    })
}

pub fn submission_get(conn: &Connection, id: &str) -> rusqlite::Result<Option<SubmissionRow>> {
    conn.query_row(
        &format!("SELECT {SUBMISSION_COLUMNS} FROM assignment_submissions WHERE id = ?"),
        [id],
        submission_from_row,
    )
    .optional()
}

/// Newest attempt first.
pub fn submissions_for_student(
    conn: &Connection,
    student_id: &str,
    assignment_id: Option<&str>,
) -> rusqlite::Result<Vec<SubmissionRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM assignment_submissions
         WHERE student_id = ?1 AND (?2 IS NULL OR assignment_id = ?2)
         ORDER BY submitted_at DESC, attempt_number DESC"
    ))?;
    let rows = stmt
        .query_map((student_id, assignment_id), submission_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn submissions_for_assignment(
    conn: &Connection,
    assignment_id: &str,
) -> rusqlite::Result<Vec<SubmissionRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM assignment_submissions
         WHERE assignment_id = ?
         ORDER BY submitted_at DESC, attempt_number DESC"
    ))?;
    let rows = stmt
        .query_map([assignment_id], submission_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn submission_attempts(
    conn: &Connection,
    assignment_id: &str,
    student_id: &str,
) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM assignment_submissions WHERE assignment_id = ? AND student_id = ?",
        [assignment_id, student_id],
        |r| r.get(0),
    )
}
