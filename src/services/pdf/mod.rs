//! Byte-level PDF generation and rewriting.

pub mod metrics;
pub mod redact;
pub mod writer;

pub use redact::{BoxReport, PLACEHOLDER, RedactionBox, TermReport};
pub use writer::{RasterPage, TextLayout};
