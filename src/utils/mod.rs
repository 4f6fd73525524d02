pub mod format;

pub use format::{format_bytes, format_speed, format_duration};
