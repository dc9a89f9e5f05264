//! Input/Output handling for the CLI.
//!
//! This module provides:
//! - JSON output envelopes for `--json` commands
//! - Consistent exit codes

pub mod exit_code;
pub mod format;

pub use exit_code::ExitCode;
pub use format::{JsonResponse, OutputFormat, ResponseMeta, format_utc_timestamp};
