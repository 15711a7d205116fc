//! Deterministic text form of a normalized tree.
//!
//! One value per line, nesting shown by four-space indentation. Strings are
//! quoted and escaped so no value ever spans more than one line, which keeps
//! the line diff aligned with the tree structure.

use std::fmt::Write;

use ordered_float::OrderedFloat;

use crate::normalize::{Node, NormalizedTree, SequenceKind, Value};

const INDENT: &str = "    ";

/// Render a tree to lines, without line terminators.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn render(tree: &NormalizedTree) -> Vec<String> {
    let mut lines = Vec::new();
    render_tree(tree, 0, "", "", &mut lines);
    lines
}

fn render_tree(
    tree: &NormalizedTree,
    depth: usize,
    prefix: &str,
    suffix: &str,
    lines: &mut Vec<String>,
) {
    let indent = INDENT.repeat(depth);
    lines.push(format!("{indent}{prefix}{{"));
    for (name, node) in tree.fields() {
        render_node(node, depth + 1, &format!("{name}: "), ",", lines);
    }
    lines.push(format!("{indent}}}{suffix}"));
}

fn render_node(node: &Node, depth: usize, prefix: &str, suffix: &str, lines: &mut Vec<String>) {
    let indent = INDENT.repeat(depth);
    match node {
        Node::Leaf(value) => lines.push(format!("{indent}{prefix}{}{suffix}", scalar(value))),
        Node::Tree(tree) => render_tree(tree, depth, prefix, suffix, lines),
        Node::Sequence(kind, items) => {
            let (open, close) = match kind {
                SequenceKind::List => ("[", "]"),
                SequenceKind::Tuple => ("(", ")"),
                SequenceKind::FrozenSet => ("frozenset({", "})"),
            };
            if items.is_empty() {
                let empty = match kind {
                    SequenceKind::FrozenSet => "frozenset()",
                    SequenceKind::List => "[]",
                    SequenceKind::Tuple => "()",
                };
                lines.push(format!("{indent}{prefix}{empty}{suffix}"));
                return;
            }
            lines.push(format!("{indent}{prefix}{open}"));
            for item in items {
                render_node(item, depth + 1, "", ",", lines);
            }
            lines.push(format!("{indent}{close}{suffix}"));
        }
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::None => "None".to_string(),
        Value::Ellipsis => "Ellipsis".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Int(digits) => digits.clone(),
        Value::Float(value) => float(*value),
        Value::Complex { real, imag } => complex(*real, *imag),
        Value::Str(text) => quote_str(text),
        Value::Bytes(bytes) => quote_bytes(bytes),
        Value::Flags(names) if names.is_empty() => "0".to_string(),
        Value::Flags(names) => names.join(" | "),
        Value::Instruction { op, arg: Some(arg) } => format!("{op} {arg}"),
        Value::Instruction { op, arg: None } => op.to_string(),
    }
}

/// Shortest text that reads back as the same float.
fn float(value: OrderedFloat<f64>) -> String {
    let value = value.into_inner();
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        format!("{value:?}")
    }
}

fn complex(real: OrderedFloat<f64>, imag: OrderedFloat<f64>) -> String {
    let part = |value: OrderedFloat<f64>| {
        let text = float(value);
        text.strip_suffix(".0").map(str::to_string).unwrap_or(text)
    };
    if real.into_inner() == 0.0 && real.into_inner().is_sign_positive() {
        return format!("{}j", part(imag));
    }
    let imag_text = part(imag);
    let sign = if imag_text.starts_with('-') { "" } else { "+" };
    format!("({}{sign}{imag_text}j)", part(real))
}

fn quote_str(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\x7f' => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn quote_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 3);
    out.push_str("b'");
    for &byte in bytes {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\x{byte:02x}");
            }
        }
    }
    out.push('\'');
    out
}
