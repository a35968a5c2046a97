pub mod assignments;
pub mod core;
pub mod courses;
pub mod dashboard;
pub mod enrollments;
pub mod grades;
pub mod library;
pub mod students;
pub mod submissions;
pub mod users;
