pub mod prompt;
pub mod usage;
pub mod user;
