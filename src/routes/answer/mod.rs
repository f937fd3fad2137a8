mod handler;
pub mod model;

pub use handler::{
    create_answer, delete_answer, get_answer, list_answers, question_answers, update_answer,
};
