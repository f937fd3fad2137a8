mod handler;
pub mod model;

pub use handler::{list_items, my_transactions, purchase};
