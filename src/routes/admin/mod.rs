//! Staff-only screens. Every route here sits behind `staff_middleware`.

mod handler;

pub use handler::{
    create_shop_item, delete_shop_item, list_reports, review_report, search_classrooms,
    search_questions, search_users, update_shop_item, update_user,
};
