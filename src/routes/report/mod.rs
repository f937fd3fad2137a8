mod handler;
pub mod model;

pub use handler::{create_report, get_report, list_reports};
