//! Helpers that log a failed result and decide what happens next.
//!
//! Each helper takes the options to apply to the report before it is logged.
//! When the result is `Ok` and the options carry an alternative print, that
//! message is logged at info level instead.

use tracing::{error, info, warn};

use crate::details::{DetailOption, Details};

fn alt_print(options: &[DetailOption]) {
    if let Some(alt) = Details::default().apply(options).alt_print() {
        info!("{}", alt);
    }
}

/// Log a failure at error level and discard it
pub fn log_failures<T>(result: Result<T, Details>, options: &[DetailOption]) -> Option<T> {
    log_failures_with(result, options, |details| details.to_string())
}

/// Like [`log_failures`], formatting the logged line with `format`
pub fn log_failures_with<T, F>(
    result: Result<T, Details>,
    options: &[DetailOption],
    format: F,
) -> Option<T>
where
    F: FnOnce(&Details) -> String,
{
    match result {
        Ok(value) => {
            alt_print(options);
            Some(value)
        }
        Err(details) => {
            let details = details.apply(options);
            error!("{}", format(&details));
            None
        }
    }
}

/// Log a failure at warn level and discard it
pub fn warn_on_fail<T>(result: Result<T, Details>, options: &[DetailOption]) -> Option<T> {
    warn_on_fail_with(result, options, |details| details.to_string())
}

/// Like [`warn_on_fail`], formatting the logged line with `format`
pub fn warn_on_fail_with<T, F>(
    result: Result<T, Details>,
    options: &[DetailOption],
    format: F,
) -> Option<T>
where
    F: FnOnce(&Details) -> String,
{
    match result {
        Ok(value) => {
            alt_print(options);
            Some(value)
        }
        Err(details) => {
            let details = details.apply(options);
            warn!("{}", format(&details));
            None
        }
    }
}

/// Log a failure, then run `handler` to deal with it.
///
/// A failure of the handler is logged as well and returned. `handler` does
/// not run when `result` is `Ok`.
pub fn handle_failure<T, H>(
    result: Result<T, Details>,
    handler: H,
    options: &[DetailOption],
) -> Result<(), Details>
where
    H: FnOnce() -> Result<(), Details>,
{
    match result {
        Ok(_) => {
            alt_print(options);
            Ok(())
        }
        Err(details) => {
            error!("{}", details.apply(options));
            handler().map_err(|failure| {
                let failure = failure.apply(options);
                error!("{}", failure);
                failure
            })
        }
    }
}

/// Unwrap `result`, or log the failure and exit with its exit code.
///
/// Only meant for failures the program cannot continue from.
pub fn exit_on_fail<T>(result: Result<T, Details>, options: &[DetailOption]) -> T {
    match result {
        Ok(value) => {
            alt_print(options);
            value
        }
        Err(details) => {
            let details = details.apply(options);
            error!("{}", details);
            std::process::exit(details.exit_code());
        }
    }
}

/// Run a close or flush whose failure has nowhere to go, logging it at error level.
///
/// Returns whether `close` succeeded.
pub fn notify_close<F>(close: F, options: &[DetailOption]) -> bool
where
    F: FnOnce() -> Result<(), Details>,
{
    log_failures(close(), options).is_some()
}

/// Combine a primary result with a secondary one, such as closing a resource.
///
/// The first failure wins; if both failed, the secondary message is appended.
pub fn join_errors(
    primary: Result<(), Details>,
    secondary: Result<(), Details>,
) -> Result<(), Details> {
    match (primary, secondary) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(details), Ok(())) | (Ok(()), Err(details)) => Err(details),
        (Err(first), Err(second)) => {
            let msg = second.msg().to_string();
            Err(first.with_msg(msg))
        }
    }
}
