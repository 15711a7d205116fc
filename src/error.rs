//! Errors surfaced by the diff pipeline.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// A source file that does not compile.
///
/// Positions are 1-based and `text` is the offending physical line without
/// its terminator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{filename}:{line}:{column}: {message}")]
pub struct DisassembleSyntaxError {
    pub filename: String,
    pub line: u32,
    pub text: String,
    pub column: u32,
    pub message: String,
}

impl DisassembleSyntaxError {
    /// The three-line report printed by the command line tool: location,
    /// source line, and a caret under the column.
    pub fn diagnostic(&self) -> String {
        let indent = " ".repeat(self.column.saturating_sub(1) as usize);
        format!(
            "{}:{} invalid syntax\n{}\n{}^\n",
            self.filename, self.line, self.text, indent
        )
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] DisassembleSyntaxError),

    #[error("cannot read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DisassembleSyntaxError {
        DisassembleSyntaxError {
            filename: "a.py".into(),
            line: 2,
            text: "def f(:".into(),
            column: 7,
            message: "expected ')', found ':'".into(),
        }
    }

    #[test]
    fn display_includes_position_and_message() {
        assert_eq!(sample().to_string(), "a.py:2:7: expected ')', found ':'");
    }

    #[test]
    fn diagnostic_points_at_column() {
        assert_eq!(
            sample().diagnostic(),
            "a.py:2 invalid syntax\ndef f(:\n      ^\n"
        );
    }

    #[test]
    fn io_error_names_the_path() {
        let error = Error::io(
            "missing.py",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        assert_eq!(error.to_string(), "cannot read missing.py");
        let source = std::error::Error::source(&error).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("not found"));
    }

    #[test]
    fn io_error_chain_mentions_cause_once() {
        let error = anyhow::Error::new(Error::io(
            "missing.py",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        ));
        let chain = format!("{error:#}");
        assert_eq!(chain, "cannot read missing.py: not found");
        assert_eq!(chain.matches("not found").count(), 1);
    }
}
