pub mod artifacts;
pub mod health;
pub mod pages;
pub mod redaction;
pub mod staging;
