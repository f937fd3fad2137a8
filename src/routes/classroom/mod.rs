mod handler;
pub mod model;

pub use handler::{
    create_classroom, delete_classroom, get_classroom, join_classroom, leave_classroom,
    list_classrooms, list_members, my_stats, replace_classroom, update_classroom,
};
