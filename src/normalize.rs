//! Code object to comparable tree.
//!
//! A [`NormalizedTree`] keeps exactly the code object fields that describe
//! behaviour, in a fixed order. Fields that change with formatting alone
//! (raw wordcode offsets, the line table, the file name and first line) are
//! left out, and nested code objects in the constant pool are normalized
//! with the same schema.

use ordered_float::OrderedFloat;
use pydiff_compiler::bytecode::{CodeFlags, CodeObject, Constant, OpCode};

/// Version of the field list below. Bump it when the schema changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Extracted fields, in output order.
pub const SCHEMA: [&str; 13] = [
    "argument_count",
    "positional_only_argument_count",
    "keyword_only_argument_count",
    "local_count",
    "stack_size",
    "flags",
    "name",
    "names",
    "variable_names",
    "free_variables",
    "cell_variables",
    "constants",
    "instruction_sequence",
];

/// A scalar in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    None,
    Ellipsis,
    Bool(bool),
    /// Integer as decimal text
    Int(String),
    Float(OrderedFloat<f64>),
    Complex {
        real: OrderedFloat<f64>,
        imag: OrderedFloat<f64>,
    },
    Str(String),
    Bytes(Vec<u8>),
    /// Names of the set code flags
    Flags(Vec<&'static str>),
    /// One decoded instruction; `arg` only for opcodes that take one
    Instruction { op: &'static str, arg: Option<u8> },
}

/// How a sequence is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceKind {
    /// A field holding several values
    List,
    Tuple,
    FrozenSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    Leaf(Value),
    Tree(NormalizedTree),
    Sequence(SequenceKind, Vec<Node>),
}

/// Ordered field name to value map for one code object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NormalizedTree {
    fields: Vec<(&'static str, Node)>,
}

impl NormalizedTree {
    /// Fields in schema order.
    pub fn fields(&self) -> &[(&'static str, Node)] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, node)| node)
    }

    fn push(&mut self, name: &'static str, node: Node) {
        debug_assert_eq!(SCHEMA.get(self.fields.len()), Some(&name));
        self.fields.push((name, node));
    }
}

/// Normalize a code object and, recursively, every code object in its
/// constant pool.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn normalize(code: &CodeObject) -> NormalizedTree {
    let mut tree = NormalizedTree::default();
    tree.push("argument_count", count(code.argcount));
    tree.push("positional_only_argument_count", count(code.posonlyargcount));
    tree.push("keyword_only_argument_count", count(code.kwonlyargcount));
    tree.push("local_count", count(code.nlocals));
    tree.push("stack_size", count(code.stacksize));
    tree.push("flags", flags(code.flags));
    tree.push("name", Node::Leaf(Value::Str(code.name.clone())));
    tree.push("names", strings(&code.names));
    tree.push("variable_names", strings(&code.varnames));
    tree.push("free_variables", strings(&code.freevars));
    tree.push("cell_variables", strings(&code.cellvars));
    tree.push("constants", constants(&code.consts, code.docstring));
    tree.push("instruction_sequence", instructions(code));
    tree
}

fn count(value: u32) -> Node {
    Node::Leaf(Value::Int(value.to_string()))
}

fn flags(flags: CodeFlags) -> Node {
    Node::Leaf(Value::Flags(flags.names()))
}

fn strings(items: &[String]) -> Node {
    Node::Sequence(
        SequenceKind::List,
        items
            .iter()
            .map(|item| Node::Leaf(Value::Str(item.clone())))
            .collect(),
    )
}

/// The pool, with the docstring slot's whitespace normalized.
fn constants(consts: &[Constant], docstring: Option<u32>) -> Node {
    let items = consts
        .iter()
        .enumerate()
        .map(|(index, constant)| match constant {
            Constant::Str(text) if docstring == Some(index as u32) => {
                Node::Leaf(Value::Str(normalize_docstring(text)))
            }
            _ => constant_node(constant),
        })
        .collect();
    Node::Sequence(SequenceKind::List, items)
}

fn constant_node(constant: &Constant) -> Node {
    let leaf = Node::Leaf;
    match constant {
        Constant::None => leaf(Value::None),
        Constant::Ellipsis => leaf(Value::Ellipsis),
        Constant::Bool(value) => leaf(Value::Bool(*value)),
        Constant::Int(digits) => leaf(Value::Int(digits.clone())),
        Constant::Float(value) => leaf(Value::Float(OrderedFloat(*value))),
        Constant::Complex { real, imag } => leaf(Value::Complex {
            real: OrderedFloat(*real),
            imag: OrderedFloat(*imag),
        }),
        Constant::Str(text) => leaf(Value::Str(text.clone())),
        Constant::Bytes(bytes) => leaf(Value::Bytes(bytes.clone())),
        Constant::Tuple(items) => Node::Sequence(
            SequenceKind::Tuple,
            items.iter().map(constant_node).collect(),
        ),
        Constant::FrozenSet(items) => Node::Sequence(
            SequenceKind::FrozenSet,
            items.iter().map(constant_node).collect(),
        ),
        Constant::Code(code) => Node::Tree(normalize(code)),
    }
}

/// Trim every line and rejoin with single spaces.
pub fn normalize_docstring(text: &str) -> String {
    text.lines().map(str::trim).collect::<Vec<_>>().join(" ")
}

/// Decode the wordcode into symbolic instructions.
///
/// # Panics
///
/// On a byte that is not a CPython 3.8 opcode. The compiler only emits
/// known opcodes, so this is an internal consistency failure.
fn instructions(code: &CodeObject) -> Node {
    let items = code
        .units()
        .map(|(offset, byte, arg)| {
            let op = OpCode::try_from(byte).unwrap_or_else(|_| {
                panic!("undecodable opcode {byte} at offset {offset} in {}", code.name)
            });
            Node::Leaf(Value::Instruction {
                op: op.name(),
                arg: op.has_argument().then_some(arg),
            })
        })
        .collect();
    Node::Sequence(SequenceKind::List, items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pydiff_compiler::compile;

    fn disassemble(source: &str) -> NormalizedTree {
        normalize(&compile(source, "<string>").unwrap())
    }

    fn constants_of(tree: &NormalizedTree) -> &[Node] {
        match tree.get("constants") {
            Some(Node::Sequence(SequenceKind::List, items)) => items,
            other => panic!("constants missing: {other:?}"),
        }
    }

    #[test]
    fn fields_follow_schema() {
        let tree = disassemble("x = 1\n");
        let names: Vec<_> = tree.fields().iter().map(|(name, _)| *name).collect();
        assert_eq!(names, SCHEMA);
    }

    #[test]
    fn instructions_are_symbolic() {
        let tree = disassemble("x = 1\n");
        let Some(Node::Sequence(_, items)) = tree.get("instruction_sequence") else {
            panic!("instruction_sequence missing");
        };
        let expected: [(&str, Option<u8>); 4] = [
            ("LOAD_CONST", Some(0)),
            ("STORE_NAME", Some(0)),
            ("LOAD_CONST", Some(1)),
            ("RETURN_VALUE", None),
        ];
        let actual: Vec<_> = items
            .iter()
            .map(|node| match node {
                Node::Leaf(Value::Instruction { op, arg }) => (*op, *arg),
                other => panic!("not an instruction: {other:?}"),
            })
            .collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn nested_code_becomes_tree() {
        let tree = disassemble("def f():\n    return 1\n");
        let Node::Tree(inner) = &constants_of(&tree)[0] else {
            panic!("expected nested tree");
        };
        assert_eq!(inner.get("name"), Some(&Node::Leaf(Value::Str("f".into()))));
        assert_eq!(
            inner.get("flags"),
            Some(&Node::Leaf(Value::Flags(vec!["OPTIMIZED", "NEWLOCALS", "NOFREE"])))
        );
    }

    #[test]
    fn docstring_whitespace_is_ignored() {
        let a = disassemble("\"\"\"Title.\n\n    Body text.\n\"\"\"\n");
        let b = disassemble("\"\"\"Title.\n\nBody text.   \n\"\"\"\n");
        assert_eq!(a, b);
    }

    #[test]
    fn other_strings_keep_whitespace() {
        let a = disassemble("x = 1\ny = 2\nz = 'a\\n  b'\n");
        let b = disassemble("x = 1\ny = 2\nz = 'a\\nb'\n");
        assert_ne!(a, b);
    }

    #[test]
    fn function_docstring_whitespace_is_ignored() {
        let a = disassemble("def f():\n    \"\"\"Sum.\n\n        Detail.\n    \"\"\"\n    return 1\n");
        let b = disassemble("def f():\n    \"\"\"Sum.\n\n    Detail.\n  \"\"\"\n    return 1\n");
        assert_eq!(a, b);
    }

    #[test]
    fn class_docstring_whitespace_is_ignored() {
        let a = disassemble("class A:\n    '''Doc\n       more.'''\n");
        let b = disassemble("class A:\n    '''Doc\n    more.'''\n");
        assert_eq!(a, b);
    }

    #[test]
    fn string_in_second_slot_keeps_whitespace() {
        let a = disassemble("def f():\n    return 'a\\n  b'\n");
        let b = disassemble("def f():\n    return 'a\\nb'\n");
        assert_ne!(a, b);

        let a = disassemble("x = 'a\\n  b'\n");
        let b = disassemble("x = 'a\\nb'\n");
        assert_ne!(a, b);
    }

    #[test]
    fn only_the_docstring_is_normalized() {
        let a = disassemble("def f():\n    'Doc.'\n    return 'x\\n  y'\n");
        let b = disassemble("def f():\n    'Doc.'\n    return 'x\\ny'\n");
        assert_ne!(a, b);
    }

    #[test]
    fn normalization_is_deterministic() {
        let code = compile("class A:\n    def f(self, *a):\n        return [x for x in a]\n", "<string>").unwrap();
        assert_eq!(normalize(&code), normalize(&code));
    }

    #[test]
    fn line_numbers_do_not_matter() {
        assert_eq!(disassemble("x = 1\n"), disassemble("\n\n# comment\nx = 1\n"));
    }

    #[test]
    fn docstring_rule() {
        assert_eq!(normalize_docstring("  a  \n   b\n"), "a b");
        assert_eq!(normalize_docstring("single"), "single");
    }

    #[test]
    #[should_panic(expected = "undecodable opcode 0")]
    fn unknown_opcode_panics() {
        let code = CodeObject {
            code: vec![0, 0],
            ..Default::default()
        };
        normalize(&code);
    }
}
