pub mod convert;
pub mod error;
pub mod lifecycle;
pub mod pdf;
pub mod redaction;
pub mod scheduler;
pub mod sequence;
pub mod store;
pub mod viewer;
