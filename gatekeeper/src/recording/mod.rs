//! Optional JSONL recording of forge HTTP traffic, with secrets redacted.

pub mod logger;
pub mod middleware;
pub mod sanitizer;
pub mod types;

pub use logger::RecordingLogger;
pub use middleware::RecordingMiddleware;
pub use sanitizer::Sanitizer;
pub use types::*;
