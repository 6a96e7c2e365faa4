pub mod auth_cmd;
pub mod comment;
pub mod common;
pub mod completions;
pub mod config;
pub mod post;
pub mod profile;
