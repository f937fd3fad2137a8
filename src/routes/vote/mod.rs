mod handler;
pub mod model;

pub use handler::{unvote_answer, unvote_question, vote_answer, vote_question};
