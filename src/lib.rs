//! Diff two Python files at the bytecode level.
//!
//! Both sources are compiled to CPython 3.8 code objects, normalized into
//! a tree of the fields that describe behaviour, rendered one value per
//! line and compared with a unified line diff. Reformatting, comments and
//! docstring indentation do not show up; anything that changes what the
//! code does does.
//!
//! ```
//! assert_eq!(pydiff::diff_bytecode("x = 1", "x=1").unwrap(), "");
//! assert!(pydiff::diff_bytecode("x = 1", "x = 2").unwrap().contains("@@"));
//! ```
//!
//! ## Modules
//!
//! - [`adapter`]: Compiles source text through the host compiler
//! - [`normalize`]: Code object to [`NormalizedTree`]
//! - [`render`]: Tree to text lines
//! - [`diff`]: Unified line diff
//! - [`source`]: Encoding-aware file reading

pub mod adapter;
pub mod diff;
pub mod error;
pub mod normalize;
pub mod render;
pub mod source;

use std::path::Path;

use tracing::{debug, info};

pub use adapter::compile;
pub use diff::{DEFAULT_CONTEXT, unified_diff};
pub use error::{DisassembleSyntaxError, Error, Result};
pub use normalize::{Node, NormalizedTree, SCHEMA_VERSION, normalize};
pub use render::render;
pub use source::SourceUnit;

/// Label used for sources that do not come from a file.
pub const STRING_LABEL: &str = "<string>";

/// Options for producing a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffConfig {
    /// Unchanged lines shown around each change
    pub context: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            context: DEFAULT_CONTEXT,
        }
    }
}

/// Compile `source` and return its normalized tree.
pub fn disassemble(source: &str) -> std::result::Result<NormalizedTree, DisassembleSyntaxError> {
    Ok(normalize(&compile(source, STRING_LABEL)?))
}

/// Diff the bytecode of two source strings with default settings.
pub fn diff_bytecode(
    source_a: &str,
    source_b: &str,
) -> std::result::Result<String, DisassembleSyntaxError> {
    diff_units(
        &SourceUnit::new(source_a, STRING_LABEL),
        &SourceUnit::new(source_b, STRING_LABEL),
        &DiffConfig::default(),
    )
}

/// Diff the bytecode of two source units.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn diff_units(
    a: &SourceUnit,
    b: &SourceUnit,
    config: &DiffConfig,
) -> std::result::Result<String, DisassembleSyntaxError> {
    let lines_a = render(&normalize(&compile(&a.text, &a.filename)?));
    let lines_b = render(&normalize(&compile(&b.text, &b.filename)?));
    debug!(a = lines_a.len(), b = lines_b.len(), "rendered");

    let diff = unified_diff(&lines_a, &lines_b, &a.filename, &b.filename, config.context);
    info!(
        a = %a.filename,
        b = %b.filename,
        changed = !diff.is_empty(),
        "compared"
    );
    Ok(diff)
}

/// Read two files and diff their bytecode.
pub fn diff_bytecode_of_files(path_a: &Path, path_b: &Path, config: &DiffConfig) -> Result<String> {
    let a = SourceUnit::read(path_a)?;
    let b = SourceUnit::read(path_b)?;
    Ok(diff_units(&a, &b, config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_change_is_reported() {
        let diff = diff_bytecode("x = 1", "x=2").unwrap();
        assert!(diff.starts_with("--- <string>\n+++ <string>\n@@ "));
        assert!(diff.contains("\n-        1,\n"));
        assert!(diff.contains("\n+        2,\n"));
    }

    #[test]
    fn formatting_change_is_not() {
        assert_eq!(diff_bytecode("x = 1", "x=1").unwrap(), "");
    }

    #[test]
    fn different_bodies_disassemble_differently() {
        assert_ne!(
            disassemble("def main(): pass").unwrap(),
            disassemble("def main(): x = 1").unwrap()
        );
    }

    #[test]
    fn syntax_error_position() {
        let error = disassemble("def f(:").unwrap_err();
        assert_eq!((error.line, error.column), (1, 7));
    }

    #[test]
    fn context_is_configurable() {
        let a = SourceUnit::new("a = 1\nb = 2\nc = 3\n", "a.py");
        let b = SourceUnit::new("a = 1\nb = 5\nc = 3\n", "b.py");
        let narrow = diff_units(&a, &b, &DiffConfig { context: 0 }).unwrap();
        let wide = diff_units(&a, &b, &DiffConfig::default()).unwrap();
        assert!(narrow.starts_with("--- a.py\n+++ b.py\n"));
        assert!(narrow.lines().count() < wide.lines().count());
    }
}
