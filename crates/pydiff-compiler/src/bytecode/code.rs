//! Compiled code objects.

use bitflags::bitflags;

use super::Constant;

bitflags! {
    /// `co_flags` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CodeFlags: u32 {
        /// Locals live in fast slots.
        const OPTIMIZED = 0x0001;
        /// A fresh locals namespace per call.
        const NEWLOCALS = 0x0002;
        /// Takes `*args`.
        const VARARGS = 0x0004;
        /// Takes `**kwargs`.
        const VARKEYWORDS = 0x0008;
        /// Defined inside another function.
        const NESTED = 0x0010;
        /// Contains `yield`, or is a generator expression.
        const GENERATOR = 0x0020;
        /// No free or cell variables.
        const NOFREE = 0x0040;
        /// An `async def` without `yield`.
        const COROUTINE = 0x0080;
        /// An `async def` or async generator expression that yields.
        const ASYNC_GENERATOR = 0x0200;
    }
}

impl CodeFlags {
    /// CPython's names for the set bits, lowest bit first.
    pub fn names(self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }
}

/// The compiled form of a module, function, class body, lambda or
/// comprehension.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodeObject {
    /// Positional parameters, positional-only included.
    pub argcount: u32,
    /// Positional-only parameters.
    pub posonlyargcount: u32,
    /// Keyword-only parameters.
    pub kwonlyargcount: u32,
    /// Number of fast local slots.
    pub nlocals: u32,
    /// Maximum evaluation stack depth.
    pub stacksize: u32,
    pub flags: CodeFlags,
    /// Raw wordcode.
    pub code: Vec<u8>,
    pub consts: Vec<Constant>,
    /// Index of the docstring in `consts`, if the body opens with one.
    pub docstring: Option<u32>,
    /// Attribute, global and unoptimized names.
    pub names: Vec<String>,
    /// Fast local names, parameters first.
    pub varnames: Vec<String>,
    /// Names captured from enclosing scopes.
    pub freevars: Vec<String>,
    /// Locals captured by nested scopes.
    pub cellvars: Vec<String>,
    pub filename: String,
    pub name: String,
    pub firstlineno: u32,
    /// Offset to line number table.
    pub lnotab: Vec<u8>,
}

impl CodeObject {
    /// Iterate over the raw `(offset, opcode byte, argument byte)` units.
    pub fn units(&self) -> impl Iterator<Item = (usize, u8, u8)> + '_ {
        self.code
            .chunks_exact(2)
            .enumerate()
            .map(|(i, unit)| (i * 2, unit[0], unit[1]))
    }

    /// Nested code objects in constant order.
    pub fn children(&self) -> impl Iterator<Item = &CodeObject> {
        self.consts.iter().filter_map(|constant| match constant {
            Constant::Code(code) => Some(code.as_ref()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_names_in_bit_order() {
        let flags = CodeFlags::NOFREE | CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS;
        assert_eq!(flags.names(), vec!["OPTIMIZED", "NEWLOCALS", "NOFREE"]);
        assert!(CodeFlags::empty().names().is_empty());

        let flags = CodeFlags::ASYNC_GENERATOR | CodeFlags::NOFREE | CodeFlags::COROUTINE;
        assert_eq!(flags.names(), vec!["NOFREE", "COROUTINE", "ASYNC_GENERATOR"]);
    }

    #[test]
    fn units_pair_bytes() {
        let code = CodeObject {
            code: vec![100, 0, 83, 0],
            ..Default::default()
        };
        let units: Vec<_> = code.units().collect();
        assert_eq!(units, vec![(0, 100, 0), (2, 83, 0)]);
    }

    #[test]
    fn children_skip_plain_constants() {
        let inner = CodeObject {
            name: "f".into(),
            ..Default::default()
        };
        let outer = CodeObject {
            consts: vec![Constant::None, Constant::Code(Box::new(inner)), Constant::Str("f".into())],
            ..Default::default()
        };
        let names: Vec<_> = outer.children().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["f"]);
    }
}
