//! Error reports for failures that should be logged with context.
//!
//! Use [`Details::report`] for failures that could point at a bug; ordinary
//! errors should stay ordinary `thiserror` types and only be wrapped with
//! [`Details::from_error`] where they get logged.
//!
//! ```rust,ignore
//! use barker_report::{DetailOption, Details, log_failures};
//!
//! let result = std::fs::remove_file(path).map_err(Details::from);
//! log_failures(result, &[DetailOption::Msg(format!("removing {}", path.display()))]);
//! ```

mod details;
mod handle;

pub use details::{DEFAULT_EXIT_CODE, DetailOption, Details};
pub use handle::{
    exit_on_fail, handle_failure, join_errors, log_failures, log_failures_with, notify_close,
    warn_on_fail, warn_on_fail_with,
};
