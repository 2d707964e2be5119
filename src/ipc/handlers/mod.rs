pub mod audit;
pub mod calendar;
pub mod core;
pub mod curriculum;
pub mod enrollment;
pub mod grades;
pub mod imports;
pub mod portal;
pub mod reports;
pub mod sections;
pub mod settings;
pub mod students;
pub mod teachers;
pub mod users;
