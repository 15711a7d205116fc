// tests/test_harness.rs
//! Test harness for the bytecode diff integration tests
//!
//! Loads Python fixtures from `test_scripts/`, runs them through the
//! pipeline and offers helpers for inspecting the normalized trees.

#![allow(dead_code)]

use pydiff::normalize::Value;
use pydiff::{DisassembleSyntaxError, Node, NormalizedTree, SourceUnit};
use std::fs;
use std::path::PathBuf;

/// A fixture together with its normalized tree and rendered lines
pub struct TestResult {
    pub unit: SourceUnit,
    pub tree: Result<NormalizedTree, DisassembleSyntaxError>,
}

/// Loads fixtures from the `test_scripts` directory
pub struct TestHarness {
    test_scripts_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let test_scripts_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_scripts");
        Self { test_scripts_dir }
    }

    pub fn path(&self, filename: &str) -> PathBuf {
        self.test_scripts_dir.join(filename)
    }

    /// Read a fixture through the encoding-aware reader
    pub fn load(&self, filename: &str) -> SourceUnit {
        let path = self.path(filename);
        SourceUnit::read(&path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
    }

    /// Raw fixture bytes
    pub fn load_bytes(&self, filename: &str) -> Vec<u8> {
        let path = self.path(filename);
        fs::read(&path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
    }

    /// Load and disassemble a fixture
    pub fn load_and_disassemble(&self, filename: &str) -> TestResult {
        let unit = self.load(filename);
        let tree = pydiff::compile(&unit.text, &unit.filename).map(|code| pydiff::normalize(&code));
        TestResult { unit, tree }
    }

    /// Diff two fixtures with default settings
    pub fn diff(&self, a: &str, b: &str) -> String {
        pydiff::diff_bytecode_of_files(&self.path(a), &self.path(b), &pydiff::DiffConfig::default())
            .unwrap_or_else(|e| panic!("Failed to diff {a} and {b}: {e}"))
    }
}

impl TestResult {
    /// Assert the fixture compiled and return its tree
    pub fn assert_success(&self) -> &NormalizedTree {
        match &self.tree {
            Ok(tree) => tree,
            Err(error) => {
                eprintln!("Source:\n{}", self.unit.text);
                eprintln!("\n{}", error.diagnostic());
                panic!("Expected {} to compile: {}", self.unit.filename, error);
            }
        }
    }

    pub fn assert_syntax_error(&self) -> &DisassembleSyntaxError {
        match &self.tree {
            Ok(_) => panic!("Expected {} to fail to compile", self.unit.filename),
            Err(error) => error,
        }
    }

    pub fn rendered(&self) -> Vec<String> {
        pydiff::render(self.assert_success())
    }
}

/// Nested code objects in constant order, depth first
pub fn code_objects(tree: &NormalizedTree) -> Vec<&NormalizedTree> {
    let mut found = Vec::new();
    collect_code(tree, &mut found);
    found
}

fn collect_code<'t>(tree: &'t NormalizedTree, found: &mut Vec<&'t NormalizedTree>) {
    if let Some(Node::Sequence(_, constants)) = tree.get("constants") {
        for constant in constants {
            if let Node::Tree(inner) = constant {
                found.push(inner);
                collect_code(inner, found);
            }
        }
    }
}

/// The string in a `name` field
pub fn code_name(tree: &NormalizedTree) -> &str {
    match tree.get("name") {
        Some(Node::Leaf(Value::Str(name))) => name,
        other => panic!("code object without a name: {other:?}"),
    }
}

/// Opcode names of `instruction_sequence`
pub fn opnames(tree: &NormalizedTree) -> Vec<&'static str> {
    match tree.get("instruction_sequence") {
        Some(Node::Sequence(_, items)) => items
            .iter()
            .filter_map(|item| match item {
                Node::Leaf(Value::Instruction { op, .. }) => Some(*op),
                _ => None,
            })
            .collect(),
        other => panic!("code object without instructions: {other:?}"),
    }
}

/// Find a nested code object by name
pub fn find_code<'t>(tree: &'t NormalizedTree, name: &str) -> &'t NormalizedTree {
    code_objects(tree)
        .into_iter()
        .find(|code| code_name(code) == name)
        .unwrap_or_else(|| panic!("no code object named {name}"))
}
