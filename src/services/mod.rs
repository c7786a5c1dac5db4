pub mod announcement_source;
