pub mod alert;
pub mod app;
pub mod dashboard;
pub mod keyword;
pub mod ranking;
pub mod workspace;
