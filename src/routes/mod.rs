pub mod admin;
pub mod answer;
pub mod classroom;
pub mod question;
pub mod report;
pub mod shop;
pub mod user;
pub mod vote;
