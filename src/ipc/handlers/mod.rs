pub mod announcements;
pub mod assessments;
pub mod backup;
pub mod categories;
pub mod classes;
pub mod core;
pub mod grades;
pub mod reports;
pub mod scores;
pub mod students;
pub mod subjects;
