pub mod analysis;
pub mod commands;
pub mod models;

pub use analysis::aggregate::{compute_stats, current_rank, top_n};
pub use analysis::series::build_time_series;
