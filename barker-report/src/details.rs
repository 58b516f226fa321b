use std::fmt;

use thiserror::Error;

/// Exit code used when none was given
pub const DEFAULT_EXIT_CODE: i32 = 1;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error report carrying enough context to act on it.
///
/// The line reference is an arbitrary marker (not a source line) that lets a
/// report be located in the code; it is only shown when debug logging is on,
/// together with the exit code.
#[derive(Error, Debug)]
pub struct Details {
    msg: String,
    line_ref: String,
    exit_code: i32,
    alt_print: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl Default for Details {
    fn default() -> Self {
        Self {
            msg: String::new(),
            line_ref: String::new(),
            exit_code: DEFAULT_EXIT_CODE,
            alt_print: None,
            source: None,
        }
    }
}

impl Details {
    /// New report for a failure that may be a bug
    pub fn report(msg: impl Into<String>, line_ref: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            line_ref: line_ref.into(),
            ..Self::default()
        }
    }

    /// Wrap another error, taking its message
    pub fn from_error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            msg: err.to_string(),
            source: Some(Box::new(err)),
            ..Self::default()
        }
    }

    pub fn msg(&self) -> &str {
        &self.msg
    }

    pub fn line_ref(&self) -> &str {
        &self.line_ref
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Message to log instead when there is no failure to report
    pub fn alt_print(&self) -> Option<&str> {
        self.alt_print.as_deref()
    }

    /// Apply options in order
    pub fn apply<I>(mut self, options: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<DetailOption>,
    {
        for option in options {
            option.into().apply_to(&mut self);
        }
        self
    }

    /// Append a line reference, separated by `_` from any existing one
    pub fn with_line_ref(self, line_ref: impl Into<String>) -> Self {
        self.apply([DetailOption::LineRef(line_ref.into())])
    }

    pub fn with_exit_code(self, exit_code: i32) -> Self {
        self.apply([DetailOption::ExitCode(exit_code)])
    }

    /// Append a message on its own indented line
    pub fn with_msg(self, msg: impl Into<String>) -> Self {
        self.apply([DetailOption::Msg(msg.into())])
    }

    pub fn with_alt_print(self, alt_print: impl Into<String>) -> Self {
        self.apply([DetailOption::AltPrint(alt_print.into())])
    }

    /// Render the report, with the line reference and exit code when `verbose`
    pub fn render(&self, verbose: bool) -> String {
        let mut out = format!("error: {}", self.msg);
        if verbose {
            out.push_str(&format!(
                "\nLineRef: {}\nExit Code: {}",
                self.line_ref, self.exit_code
            ));
        }
        out
    }
}

impl fmt::Display for Details {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(tracing::enabled!(tracing::Level::DEBUG)))
    }
}

impl miette::Diagnostic for Details {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!("exit code {}", self.exit_code)))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        if self.line_ref.is_empty() {
            None
        } else {
            Some(Box::new(format!("line ref: {}", self.line_ref)))
        }
    }
}

impl From<std::io::Error> for Details {
    fn from(err: std::io::Error) -> Self {
        Self::from_error(err)
    }
}

impl From<String> for Details {
    fn from(msg: String) -> Self {
        Self {
            msg,
            ..Self::default()
        }
    }
}

impl From<&str> for Details {
    fn from(msg: &str) -> Self {
        Self::from(msg.to_string())
    }
}

/// An enrichment applied to a [`Details`] report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailOption {
    /// Appended to the line reference with a `_` separator
    LineRef(String),
    /// Replaces the exit code
    ExitCode(i32),
    /// Appended to the message on a new, tab-indented line
    Msg(String),
    /// Replaces the alternative print
    AltPrint(String),
}

impl DetailOption {
    fn apply_to(self, details: &mut Details) {
        match self {
            DetailOption::LineRef(line_ref) => {
                if details.line_ref.is_empty() {
                    details.line_ref = line_ref;
                } else {
                    details.line_ref.push('_');
                    details.line_ref.push_str(&line_ref);
                }
            }
            DetailOption::ExitCode(exit_code) => details.exit_code = exit_code,
            DetailOption::Msg(msg) => {
                if details.msg.is_empty() {
                    details.msg = msg;
                } else {
                    details.msg.push_str("\n\t");
                    details.msg.push_str(&msg);
                }
            }
            DetailOption::AltPrint(alt_print) => details.alt_print = Some(alt_print),
        }
    }
}

impl From<&DetailOption> for DetailOption {
    fn from(option: &DetailOption) -> Self {
        option.clone()
    }
}
