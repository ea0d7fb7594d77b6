pub mod aggregate;
pub mod alerts;
pub mod history;
pub mod series;
