//! CLI commands implementation.

mod annotate;
mod status;

pub use annotate::cmd_annotate;
pub use status::cmd_status;
