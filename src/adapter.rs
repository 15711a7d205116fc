//! Bridge to the host compiler.

use pydiff_compiler::{CodeObject, CompilationError};
use tracing::debug;

use crate::error::DisassembleSyntaxError;

/// Compile source text into its module code object.
///
/// `filename` labels diagnostics and becomes the code object's
/// `filename`. Every call runs a fresh compiler; nothing is executed.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn compile(source: &str, filename: &str) -> Result<CodeObject, DisassembleSyntaxError> {
    match pydiff_compiler::compile(source, filename) {
        Ok(code) => {
            debug!(
                filename,
                bytes = code.code.len(),
                consts = code.consts.len(),
                "compiled"
            );
            Ok(code)
        }
        Err(error) => Err(syntax_error(source, filename, &error)),
    }
}

fn syntax_error(source: &str, filename: &str, error: &CompilationError) -> DisassembleSyntaxError {
    let span = error.span();
    let line = span.line.max(1);
    DisassembleSyntaxError {
        filename: filename.to_string(),
        line,
        text: source_line(source, line).to_string(),
        column: span.col.max(1),
        message: error.message(),
    }
}

/// The 1-based physical line `line`, recognising `\n`, `\r\n` and `\r`.
fn source_line(source: &str, line: u32) -> &str {
    let mut rest = source;
    for _ in 1..line {
        match rest.find(['\n', '\r']) {
            Some(end) => {
                let skip = if rest[end..].starts_with("\r\n") { 2 } else { 1 };
                rest = &rest[end + skip..];
            }
            None => return "",
        }
    }
    match rest.find(['\n', '\r']) {
        Some(end) => &rest[..end],
        None => rest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_valid_source() {
        let code = compile("x = 1\n", "<string>").unwrap();
        assert_eq!(code.filename, "<string>");
        assert_eq!(code.names, vec!["x".to_string()]);
    }

    #[test]
    fn reports_position_of_syntax_error() {
        let error = compile("def f(:", "<string>").unwrap_err();
        assert_eq!(error.filename, "<string>");
        assert_eq!(error.line, 1);
        assert_eq!(error.column, 7);
        assert_eq!(error.text, "def f(:");
    }

    #[test]
    fn semantic_errors_are_syntax_errors() {
        let error = compile("x = 1\nbreak\n", "mod.py").unwrap_err();
        assert_eq!(error.line, 2);
        assert_eq!(error.text, "break");
        assert_eq!(error.message, "'break' outside loop");
    }

    #[test]
    fn source_lines_with_mixed_endings() {
        let source = "a\r\nb\rc\nd";
        assert_eq!(source_line(source, 1), "a");
        assert_eq!(source_line(source, 2), "b");
        assert_eq!(source_line(source, 3), "c");
        assert_eq!(source_line(source, 4), "d");
        assert_eq!(source_line(source, 5), "");
    }
}
