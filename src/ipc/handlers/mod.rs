pub mod assignments;
pub mod auth;
pub mod backup;
pub mod comments;
pub mod content;
pub mod core;
pub mod import;
pub mod questions;
pub mod setup;
pub mod taxonomy;
