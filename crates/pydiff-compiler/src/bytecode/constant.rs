//! Constant pool for a single code object.
//!
//! Python keeps one `co_consts` tuple per code object. Values are
//! deduplicated by type and value, so `1`, `1.0` and `True` occupy three
//! slots while a repeated `'x'` shares one. Nested code objects are never
//! merged.

use rustc_hash::FxHashMap;

use super::CodeObject;

/// Values stored in the constant pool.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `None`
    None,
    /// `True` or `False`
    Bool(bool),
    /// `...`
    Ellipsis,
    /// Arbitrary-precision integer as canonical decimal text, `-` for negatives.
    Int(String),
    /// Binary64 float.
    Float(f64),
    /// Complex number.
    Complex { real: f64, imag: f64 },
    /// Text string.
    Str(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Tuple of constants.
    Tuple(Vec<Constant>),
    /// Frozen set of constants, in insertion order.
    FrozenSet(Vec<Constant>),
    /// A nested function, class body, lambda or comprehension.
    Code(Box<CodeObject>),
}

impl Constant {
    /// Python truthiness of the value.
    pub fn is_truthy(&self) -> bool {
        match self {
            Constant::None => false,
            Constant::Bool(b) => *b,
            Constant::Ellipsis | Constant::Code(_) => true,
            Constant::Int(digits) => digits.trim_start_matches('-') != "0",
            Constant::Float(v) => *v != 0.0,
            Constant::Complex { real, imag } => *real != 0.0 || *imag != 0.0,
            Constant::Str(s) => !s.is_empty(),
            Constant::Bytes(b) => !b.is_empty(),
            Constant::Tuple(items) | Constant::FrozenSet(items) => !items.is_empty(),
        }
    }

    /// Whether this is a string constant.
    pub fn is_str(&self) -> bool {
        matches!(self, Constant::Str(_))
    }
}

/// Per-code-object constant pool with deduplication.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    /// The constants, in `co_consts` order.
    constants: Vec<Constant>,
    /// Deduplication index: maps constant to its index.
    index: FxHashMap<ConstantKey, u32>,
}

/// Hashable identity of a constant.
///
/// Floats compare by bit pattern so `0.0` and `-0.0` stay distinct, and
/// the variant tag keeps `1`, `1.0` and `True` apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    None,
    Bool(bool),
    Ellipsis,
    Int(String),
    Float(u64),
    Complex(u64, u64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<ConstantKey>),
    FrozenSet(Vec<ConstantKey>),
}

impl ConstantPool {
    /// Create a new empty constant pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or get existing constant, returns index.
    pub fn add(&mut self, constant: Constant) -> u32 {
        let Some(key) = Self::to_key(&constant) else {
            return self.push(constant);
        };

        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }

        let idx = self.push(constant);
        self.index.insert(key, idx);
        idx
    }

    /// Append a constant without deduplication.
    pub fn append(&mut self, constant: Constant) -> u32 {
        self.push(constant)
    }

    fn push(&mut self, constant: Constant) -> u32 {
        let idx = self.constants.len() as u32;
        self.constants.push(constant);
        idx
    }

    /// Get a constant by index.
    pub fn get(&self, index: u32) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    /// Number of constants.
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    /// Check if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Consume the pool, yielding the constants in index order.
    pub fn into_constants(self) -> Vec<Constant> {
        self.constants
    }

    /// Hashable key for a constant; `None` for values that never merge.
    fn to_key(constant: &Constant) -> Option<ConstantKey> {
        Some(match constant {
            Constant::None => ConstantKey::None,
            Constant::Bool(b) => ConstantKey::Bool(*b),
            Constant::Ellipsis => ConstantKey::Ellipsis,
            Constant::Int(digits) => ConstantKey::Int(digits.clone()),
            Constant::Float(v) => ConstantKey::Float(v.to_bits()),
            Constant::Complex { real, imag } => ConstantKey::Complex(real.to_bits(), imag.to_bits()),
            Constant::Str(s) => ConstantKey::Str(s.clone()),
            Constant::Bytes(b) => ConstantKey::Bytes(b.clone()),
            Constant::Tuple(items) => {
                ConstantKey::Tuple(items.iter().map(Self::to_key).collect::<Option<_>>()?)
            }
            Constant::FrozenSet(items) => {
                ConstantKey::FrozenSet(items.iter().map(Self::to_key).collect::<Option<_>>()?)
            }
            Constant::Code(_) => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pool_is_empty() {
        let pool = ConstantPool::new();
        assert!(pool.is_empty());
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn deduplication() {
        let mut pool = ConstantPool::new();

        let idx1 = pool.add(Constant::Int("100".into()));
        let idx2 = pool.add(Constant::Str("x".into()));
        let idx3 = pool.add(Constant::Int("100".into()));

        assert_eq!(idx1, 0);
        assert_eq!(idx2, 1);
        assert_eq!(idx3, 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn equal_values_of_different_types_stay_apart() {
        let mut pool = ConstantPool::new();
        let int = pool.add(Constant::Int("1".into()));
        let float = pool.add(Constant::Float(1.0));
        let boolean = pool.add(Constant::Bool(true));
        let text = pool.add(Constant::Str("1".into()));
        let bytes = pool.add(Constant::Bytes(b"1".to_vec()));

        assert_eq!([int, float, boolean, text, bytes], [0, 1, 2, 3, 4]);
    }

    #[test]
    fn float_deduplication_by_bits() {
        let mut pool = ConstantPool::new();

        let positive = pool.add(Constant::Float(0.0));
        let negative = pool.add(Constant::Float(-0.0));
        let again = pool.add(Constant::Float(0.0));

        assert_ne!(positive, negative);
        assert_eq!(positive, again);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn tuples_merge_structurally() {
        let mut pool = ConstantPool::new();
        let tuple = || Constant::Tuple(vec![Constant::Int("1".into()), Constant::None]);

        assert_eq!(pool.add(tuple()), 0);
        assert_eq!(pool.add(tuple()), 0);
        assert_eq!(pool.add(Constant::FrozenSet(vec![Constant::Int("1".into()), Constant::None])), 1);
    }

    #[test]
    fn code_objects_never_merge() {
        let mut pool = ConstantPool::new();
        let code = || Constant::Code(Box::new(CodeObject::default()));

        assert_eq!(pool.add(code()), 0);
        assert_eq!(pool.add(code()), 1);
    }

    #[test]
    fn get_out_of_bounds() {
        let pool = ConstantPool::new();
        assert_eq!(pool.get(0), None);
        assert_eq!(pool.get(100), None);
    }

    #[test]
    fn truthiness() {
        assert!(!Constant::None.is_truthy());
        assert!(!Constant::Int("0".into()).is_truthy());
        assert!(Constant::Int("-3".into()).is_truthy());
        assert!(!Constant::Str(String::new()).is_truthy());
        assert!(Constant::Tuple(vec![Constant::None]).is_truthy());
    }
}
