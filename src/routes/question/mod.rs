mod handler;
pub mod model;

pub use handler::{
    classroom_questions, counter_questions, create_question, delete_question, get_question,
    list_questions, update_question,
};
