//! Opcode definitions for CPython 3.8 wordcode.
//!
//! Every instruction is two bytes: the opcode and an 8-bit argument.
//! Arguments wider than a byte are built up by `EXTENDED_ARG` prefixes.
//! Opcodes at or above [`HAVE_ARGUMENT`] use their argument; the rest
//! carry a zero byte.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// First opcode whose argument byte is meaningful.
pub const HAVE_ARGUMENT: u8 = 90;

/// `COMPARE_OP` argument for `except` clause type matching.
pub const COMPARE_EXCEPTION_MATCH: u32 = 10;

macro_rules! opcodes {
    ($($(#[$doc:meta])* $variant:ident = $value:literal => $name:literal,)*) => {
        /// CPython 3.8 opcodes.
        ///
        /// The numbering is fixed by the interpreter; the gaps between values
        /// are unassigned and fail [`TryFrom<u8>`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
        #[repr(u8)]
        pub enum OpCode {
            $($(#[$doc])* $variant = $value,)*
        }

        impl OpCode {
            /// The disassembler name of this opcode.
            pub fn name(self) -> &'static str {
                match self {
                    $(OpCode::$variant => $name,)*
                }
            }
        }
    };
}

opcodes! {
    PopTop = 1 => "POP_TOP",
    RotTwo = 2 => "ROT_TWO",
    RotThree = 3 => "ROT_THREE",
    DupTop = 4 => "DUP_TOP",
    DupTopTwo = 5 => "DUP_TOP_TWO",
    RotFour = 6 => "ROT_FOUR",
    Nop = 9 => "NOP",
    UnaryPositive = 10 => "UNARY_POSITIVE",
    UnaryNegative = 11 => "UNARY_NEGATIVE",
    UnaryNot = 12 => "UNARY_NOT",
    UnaryInvert = 15 => "UNARY_INVERT",
    BinaryMatrixMultiply = 16 => "BINARY_MATRIX_MULTIPLY",
    InplaceMatrixMultiply = 17 => "INPLACE_MATRIX_MULTIPLY",
    BinaryPower = 19 => "BINARY_POWER",
    BinaryMultiply = 20 => "BINARY_MULTIPLY",
    BinaryModulo = 22 => "BINARY_MODULO",
    BinaryAdd = 23 => "BINARY_ADD",
    BinarySubtract = 24 => "BINARY_SUBTRACT",
    BinarySubscr = 25 => "BINARY_SUBSCR",
    BinaryFloorDivide = 26 => "BINARY_FLOOR_DIVIDE",
    BinaryTrueDivide = 27 => "BINARY_TRUE_DIVIDE",
    InplaceFloorDivide = 28 => "INPLACE_FLOOR_DIVIDE",
    InplaceTrueDivide = 29 => "INPLACE_TRUE_DIVIDE",
    GetAiter = 50 => "GET_AITER",
    GetAnext = 51 => "GET_ANEXT",
    BeforeAsyncWith = 52 => "BEFORE_ASYNC_WITH",
    /// Pushes `None` as the "no exception" marker for a `finally` body.
    BeginFinally = 53 => "BEGIN_FINALLY",
    EndAsyncFor = 54 => "END_ASYNC_FOR",
    InplaceAdd = 55 => "INPLACE_ADD",
    InplaceSubtract = 56 => "INPLACE_SUBTRACT",
    InplaceMultiply = 57 => "INPLACE_MULTIPLY",
    InplaceModulo = 59 => "INPLACE_MODULO",
    StoreSubscr = 60 => "STORE_SUBSCR",
    DeleteSubscr = 61 => "DELETE_SUBSCR",
    BinaryLshift = 62 => "BINARY_LSHIFT",
    BinaryRshift = 63 => "BINARY_RSHIFT",
    BinaryAnd = 64 => "BINARY_AND",
    BinaryXor = 65 => "BINARY_XOR",
    BinaryOr = 66 => "BINARY_OR",
    InplacePower = 67 => "INPLACE_POWER",
    GetIter = 68 => "GET_ITER",
    GetYieldFromIter = 69 => "GET_YIELD_FROM_ITER",
    PrintExpr = 70 => "PRINT_EXPR",
    LoadBuildClass = 71 => "LOAD_BUILD_CLASS",
    YieldFrom = 72 => "YIELD_FROM",
    GetAwaitable = 73 => "GET_AWAITABLE",
    InplaceLshift = 75 => "INPLACE_LSHIFT",
    InplaceRshift = 76 => "INPLACE_RSHIFT",
    InplaceAnd = 77 => "INPLACE_AND",
    InplaceXor = 78 => "INPLACE_XOR",
    InplaceOr = 79 => "INPLACE_OR",
    WithCleanupStart = 81 => "WITH_CLEANUP_START",
    WithCleanupFinish = 82 => "WITH_CLEANUP_FINISH",
    ReturnValue = 83 => "RETURN_VALUE",
    ImportStar = 84 => "IMPORT_STAR",
    SetupAnnotations = 85 => "SETUP_ANNOTATIONS",
    YieldValue = 86 => "YIELD_VALUE",
    PopBlock = 87 => "POP_BLOCK",
    EndFinally = 88 => "END_FINALLY",
    PopExcept = 89 => "POP_EXCEPT",
    StoreName = 90 => "STORE_NAME",
    DeleteName = 91 => "DELETE_NAME",
    UnpackSequence = 92 => "UNPACK_SEQUENCE",
    /// Relative jump taken when the iterator is exhausted.
    ForIter = 93 => "FOR_ITER",
    /// Argument is `before | (after << 8)` around the starred target.
    UnpackEx = 94 => "UNPACK_EX",
    StoreAttr = 95 => "STORE_ATTR",
    DeleteAttr = 96 => "DELETE_ATTR",
    StoreGlobal = 97 => "STORE_GLOBAL",
    DeleteGlobal = 98 => "DELETE_GLOBAL",
    LoadConst = 100 => "LOAD_CONST",
    LoadName = 101 => "LOAD_NAME",
    BuildTuple = 102 => "BUILD_TUPLE",
    BuildList = 103 => "BUILD_LIST",
    BuildSet = 104 => "BUILD_SET",
    BuildMap = 105 => "BUILD_MAP",
    LoadAttr = 106 => "LOAD_ATTR",
    CompareOp = 107 => "COMPARE_OP",
    ImportName = 108 => "IMPORT_NAME",
    ImportFrom = 109 => "IMPORT_FROM",
    JumpForward = 110 => "JUMP_FORWARD",
    JumpIfFalseOrPop = 111 => "JUMP_IF_FALSE_OR_POP",
    JumpIfTrueOrPop = 112 => "JUMP_IF_TRUE_OR_POP",
    JumpAbsolute = 113 => "JUMP_ABSOLUTE",
    PopJumpIfFalse = 114 => "POP_JUMP_IF_FALSE",
    PopJumpIfTrue = 115 => "POP_JUMP_IF_TRUE",
    LoadGlobal = 116 => "LOAD_GLOBAL",
    /// Pushes a `try` block whose handler is the relative jump target.
    SetupFinally = 122 => "SETUP_FINALLY",
    LoadFast = 124 => "LOAD_FAST",
    StoreFast = 125 => "STORE_FAST",
    DeleteFast = 126 => "DELETE_FAST",
    RaiseVarargs = 130 => "RAISE_VARARGS",
    CallFunction = 131 => "CALL_FUNCTION",
    /// Argument bits: defaults, keyword defaults, annotations, closure.
    MakeFunction = 132 => "MAKE_FUNCTION",
    BuildSlice = 133 => "BUILD_SLICE",
    LoadClosure = 135 => "LOAD_CLOSURE",
    LoadDeref = 136 => "LOAD_DEREF",
    StoreDeref = 137 => "STORE_DEREF",
    DeleteDeref = 138 => "DELETE_DEREF",
    CallFunctionKw = 141 => "CALL_FUNCTION_KW",
    CallFunctionEx = 142 => "CALL_FUNCTION_EX",
    SetupWith = 143 => "SETUP_WITH",
    ExtendedArg = 144 => "EXTENDED_ARG",
    ListAppend = 145 => "LIST_APPEND",
    SetAdd = 146 => "SET_ADD",
    MapAdd = 147 => "MAP_ADD",
    LoadClassderef = 148 => "LOAD_CLASSDEREF",
    BuildListUnpack = 149 => "BUILD_LIST_UNPACK",
    BuildMapUnpack = 150 => "BUILD_MAP_UNPACK",
    BuildMapUnpackWithCall = 151 => "BUILD_MAP_UNPACK_WITH_CALL",
    BuildTupleUnpack = 152 => "BUILD_TUPLE_UNPACK",
    BuildSetUnpack = 153 => "BUILD_SET_UNPACK",
    SetupAsyncWith = 154 => "SETUP_ASYNC_WITH",
    FormatValue = 155 => "FORMAT_VALUE",
    BuildConstKeyMap = 156 => "BUILD_CONST_KEY_MAP",
    BuildString = 157 => "BUILD_STRING",
    BuildTupleUnpackWithCall = 158 => "BUILD_TUPLE_UNPACK_WITH_CALL",
    LoadMethod = 160 => "LOAD_METHOD",
    CallMethod = 161 => "CALL_METHOD",
    /// Pushes the return address and jumps into a `finally` body.
    CallFinally = 162 => "CALL_FINALLY",
    PopFinally = 163 => "POP_FINALLY",
}

/// How a jump instruction encodes its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    /// Argument is the target's byte offset from the start of the code.
    Absolute,
    /// Argument is the distance in bytes from the following instruction.
    Relative,
}

/// `MAKE_FUNCTION` argument bit: a tuple of positional defaults.
pub const MAKE_FUNCTION_DEFAULTS: u32 = 0x01;
/// `MAKE_FUNCTION` argument bit: a dict of keyword-only defaults.
pub const MAKE_FUNCTION_KWDEFAULTS: u32 = 0x02;
/// `MAKE_FUNCTION` argument bit: a dict of annotations.
pub const MAKE_FUNCTION_ANNOTATIONS: u32 = 0x04;
/// `MAKE_FUNCTION` argument bit: a tuple of closure cells.
pub const MAKE_FUNCTION_CLOSURE: u32 = 0x08;

/// `FORMAT_VALUE` flag set when a format spec is on the stack.
pub const FORMAT_VALUE_HAVE_SPEC: u32 = 0x04;

impl OpCode {
    /// Whether the argument byte is meaningful.
    pub fn has_argument(self) -> bool {
        u8::from(self) >= HAVE_ARGUMENT
    }

    /// How the argument encodes a jump target, if this is a jump.
    pub fn jump_kind(self) -> Option<JumpKind> {
        use OpCode::*;
        match self {
            JumpAbsolute | PopJumpIfFalse | PopJumpIfTrue | JumpIfFalseOrPop
            | JumpIfTrueOrPop => Some(JumpKind::Absolute),
            JumpForward | ForIter | SetupFinally | SetupWith | SetupAsyncWith
            | CallFinally => Some(JumpKind::Relative),
            _ => None,
        }
    }

    /// Whether control never falls through to the next instruction.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OpCode::JumpAbsolute | OpCode::JumpForward | OpCode::ReturnValue | OpCode::RaiseVarargs
        )
    }

    /// Net change in stack depth.
    ///
    /// For jumps, `jump` selects the effect along the taken edge. Block
    /// setup opcodes report what the handler sees on entry, so the depth
    /// analysis reserves room for an in-flight exception.
    pub fn stack_effect(self, arg: u32, jump: bool) -> i32 {
        use OpCode::*;
        let oparg = arg as i32;
        match self {
            Nop | ExtendedArg => 0,
            PopTop => -1,
            RotTwo | RotThree | RotFour => 0,
            DupTop => 1,
            DupTopTwo => 2,

            UnaryPositive | UnaryNegative | UnaryNot | UnaryInvert => 0,

            SetAdd | ListAppend => -1,
            MapAdd => -2,

            BinaryPower | BinaryMultiply | BinaryMatrixMultiply | BinaryModulo | BinaryAdd
            | BinarySubtract | BinarySubscr | BinaryFloorDivide | BinaryTrueDivide
            | InplaceFloorDivide | InplaceTrueDivide | InplaceAdd | InplaceSubtract
            | InplaceMultiply | InplaceMatrixMultiply | InplaceModulo | BinaryLshift
            | BinaryRshift | BinaryAnd | BinaryXor | BinaryOr | InplacePower | InplaceLshift
            | InplaceRshift | InplaceAnd | InplaceXor | InplaceOr => -1,

            StoreSubscr => -3,
            DeleteSubscr => -2,

            GetIter | GetYieldFromIter => 0,
            PrintExpr => -1,
            LoadBuildClass => 1,

            ReturnValue => -1,
            ImportStar => -1,
            SetupAnnotations => 0,
            YieldValue => 0,
            YieldFrom => -1,
            PopBlock => 0,
            PopExcept => -3,

            StoreName => -1,
            DeleteName => 0,
            UnpackSequence => oparg - 1,
            UnpackEx => (oparg & 0xFF) + (oparg >> 8),
            ForIter => {
                if jump {
                    -1
                } else {
                    1
                }
            }

            StoreAttr => -2,
            DeleteAttr => -1,
            StoreGlobal => -1,
            DeleteGlobal => 0,
            LoadConst => 1,
            LoadName => 1,
            BuildTuple | BuildList | BuildSet | BuildString => 1 - oparg,
            BuildListUnpack | BuildTupleUnpack | BuildTupleUnpackWithCall | BuildSetUnpack
            | BuildMapUnpack | BuildMapUnpackWithCall => 1 - oparg,
            BuildMap => 1 - 2 * oparg,
            BuildConstKeyMap => -oparg,
            LoadAttr => 0,
            CompareOp => -1,
            ImportName => -1,
            ImportFrom => 1,

            JumpForward | JumpAbsolute => 0,
            JumpIfTrueOrPop | JumpIfFalseOrPop => {
                if jump {
                    0
                } else {
                    -1
                }
            }
            PopJumpIfFalse | PopJumpIfTrue => -1,

            LoadGlobal => 1,

            // The handler is entered with the exception triple and the
            // saved block state on the stack.
            SetupFinally => {
                if jump {
                    6
                } else {
                    0
                }
            }
            BeginFinally => 6,
            CallFinally => {
                if jump {
                    1
                } else {
                    0
                }
            }
            EndFinally | PopFinally => -6,

            LoadFast => 1,
            StoreFast => -1,
            DeleteFast => 0,

            RaiseVarargs => -oparg,

            CallFunction => -oparg,
            CallMethod => -oparg - 1,
            CallFunctionKw => -oparg - 1,
            CallFunctionEx => -1 - i32::from(arg & 0x01 != 0),
            MakeFunction => {
                -1 - i32::from(arg & MAKE_FUNCTION_DEFAULTS != 0)
                    - i32::from(arg & MAKE_FUNCTION_KWDEFAULTS != 0)
                    - i32::from(arg & MAKE_FUNCTION_ANNOTATIONS != 0)
                    - i32::from(arg & MAKE_FUNCTION_CLOSURE != 0)
            }
            BuildSlice => {
                if oparg == 3 {
                    -2
                } else {
                    -1
                }
            }

            LoadClosure => 1,
            LoadDeref | LoadClassderef => 1,
            StoreDeref => -1,
            DeleteDeref => 0,

            GetAwaitable => 0,
            SetupAsyncWith => {
                if jump {
                    5
                } else {
                    0
                }
            }
            BeforeAsyncWith => 1,
            GetAiter => 0,
            GetAnext => 1,
            EndAsyncFor => -7,

            FormatValue => {
                if arg & FORMAT_VALUE_HAVE_SPEC != 0 {
                    -1
                } else {
                    0
                }
            }
            LoadMethod => 1,

            WithCleanupStart => 2,
            WithCleanupFinish => -3,
            SetupWith => {
                if jump {
                    6
                } else {
                    1
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_numbering() {
        assert_eq!(u8::from(OpCode::PopTop), 1);
        assert_eq!(u8::from(OpCode::StoreName), HAVE_ARGUMENT);
        assert_eq!(u8::from(OpCode::LoadConst), 100);
        assert_eq!(u8::from(OpCode::PopFinally), 163);
    }

    #[test]
    fn opcode_from_byte() {
        assert_eq!(OpCode::try_from(83u8).ok(), Some(OpCode::ReturnValue));
        assert_eq!(OpCode::try_from(144u8).ok(), Some(OpCode::ExtendedArg));
        assert!(OpCode::try_from(0u8).is_err());
        assert!(OpCode::try_from(7u8).is_err());
        assert!(OpCode::try_from(99u8).is_err());
        assert!(OpCode::try_from(164u8).is_err());
        assert!(OpCode::try_from(255u8).is_err());
    }

    #[test]
    fn opcode_name() {
        assert_eq!(OpCode::LoadConst.name(), "LOAD_CONST");
        assert_eq!(OpCode::BuildTupleUnpackWithCall.name(), "BUILD_TUPLE_UNPACK_WITH_CALL");
        assert_eq!(OpCode::LoadClassderef.name(), "LOAD_CLASSDEREF");
    }

    #[test]
    fn argument_threshold() {
        assert!(!OpCode::ReturnValue.has_argument());
        assert!(!OpCode::PopExcept.has_argument());
        assert!(OpCode::StoreName.has_argument());
        assert!(OpCode::CallMethod.has_argument());
    }

    #[test]
    fn jump_kinds() {
        assert_eq!(OpCode::JumpAbsolute.jump_kind(), Some(JumpKind::Absolute));
        assert_eq!(OpCode::PopJumpIfTrue.jump_kind(), Some(JumpKind::Absolute));
        assert_eq!(OpCode::ForIter.jump_kind(), Some(JumpKind::Relative));
        assert_eq!(OpCode::SetupWith.jump_kind(), Some(JumpKind::Relative));
        assert_eq!(OpCode::LoadConst.jump_kind(), None);
    }

    #[test]
    fn stack_effects() {
        assert_eq!(OpCode::LoadConst.stack_effect(0, false), 1);
        assert_eq!(OpCode::BuildMap.stack_effect(3, false), -5);
        assert_eq!(OpCode::UnpackEx.stack_effect(1 | (2 << 8), false), 3);
        assert_eq!(OpCode::MakeFunction.stack_effect(0x09, false), -3);
        assert_eq!(OpCode::CallFunctionEx.stack_effect(1, false), -2);
        assert_eq!(OpCode::ForIter.stack_effect(0, true), -1);
        assert_eq!(OpCode::ForIter.stack_effect(0, false), 1);
        assert_eq!(OpCode::SetupFinally.stack_effect(0, true), 6);
        assert_eq!(OpCode::SetupWith.stack_effect(0, false), 1);
        assert_eq!(OpCode::FormatValue.stack_effect(FORMAT_VALUE_HAVE_SPEC | 2, false), -1);
    }
}
