mod handler;
pub mod model;

pub use handler::{
    create_token, create_user, delete_me, get_me, my_classes, update_me, upload_picture,
};
