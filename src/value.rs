//! Runtime values of the program under test
//!
//! The target program is dynamically typed. Its values are modelled by [`Value`],
//! its runtime types by [`TypeTag`], and the faults it can raise by [`Fault`].
//! Every operator the target can apply to a value (arithmetic, comparisons,
//! attribute and item access, iteration, builtin methods) is implemented here
//! with the semantics of a Python-like object model, so that the execution
//! tracer and the type-tracing proxy can both delegate to one implementation.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Largest repetition count accepted by sequence multiplication and `bytes(n)`,
/// and the largest length a repeated sequence may reach
const MAX_REPEAT: i64 = 10_000;

/// A fault raised by target code while it runs
///
/// Faults are ordinary data for the search: a raising statement truncates its
/// test case, it never aborts the generation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Fault {
    #[error("TypeError: {0}")]
    TypeError(String),

    #[error("AttributeError: {0}")]
    AttributeError(String),

    #[error("IndexError: {0}")]
    IndexError(String),

    #[error("KeyError: {0}")]
    KeyError(String),

    #[error("ValueError: {0}")]
    ValueError(String),

    #[error("ZeroDivisionError: {0}")]
    ZeroDivision(String),

    #[error("OverflowError: {0}")]
    Overflow(String),

    /// Raised explicitly by target code
    #[error("{class}: {message}")]
    Raised { class: String, message: String },

    /// Target code panicked; the panic was contained by the executor
    #[error("target panicked: {0}")]
    Panic(String),

    /// The execution ran past its wall-clock bound
    #[error("execution exceeded its time budget")]
    Timeout,
}

impl Fault {
    pub fn raised(class: impl Into<String>, message: impl Into<String>) -> Self {
        Fault::Raised {
            class: class.into(),
            message: message.into(),
        }
    }

    /// Name of the exception class, as it would appear in a generated test
    pub fn class_name(&self) -> &str {
        match self {
            Fault::TypeError(_) => "TypeError",
            Fault::AttributeError(_) => "AttributeError",
            Fault::IndexError(_) => "IndexError",
            Fault::KeyError(_) => "KeyError",
            Fault::ValueError(_) => "ValueError",
            Fault::ZeroDivision(_) => "ZeroDivisionError",
            Fault::Overflow(_) => "OverflowError",
            Fault::Raised { class, .. } => class,
            Fault::Panic(_) => "Panic",
            Fault::Timeout => "Timeout",
        }
    }
}

/// Runtime type of a [`Value`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeTag {
    NoneType,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    List,
    Tuple,
    Set,
    Dict,
    /// Instances of a class defined by the module under test
    Class(String),
}

/// Primitive types the test factory can build from a literal
pub const PRIMITIVE_TYPES: [TypeTag; 5] = [
    TypeTag::Int,
    TypeTag::Float,
    TypeTag::Str,
    TypeTag::Bytes,
    TypeTag::Bool,
];

/// Collection types the test factory can assemble from other variables
pub const COLLECTION_TYPES: [TypeTag; 4] = [TypeTag::List, TypeTag::Tuple, TypeTag::Set, TypeTag::Dict];

impl TypeTag {
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeTag::NoneType | TypeTag::Bool | TypeTag::Int | TypeTag::Float | TypeTag::Str | TypeTag::Bytes
        )
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, TypeTag::List | TypeTag::Tuple | TypeTag::Set | TypeTag::Dict)
    }

    /// Whether a value of type `other` can be used where `self` is expected.
    /// `bool` is a subtype of `int`, and both widen to `float`.
    pub fn accepts(&self, other: &TypeTag) -> bool {
        self == other
            || matches!(
                (self, other),
                (TypeTag::Int, TypeTag::Bool) | (TypeTag::Float, TypeTag::Int) | (TypeTag::Float, TypeTag::Bool)
            )
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::NoneType => "NoneType",
            TypeTag::Bool => "bool",
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Str => "str",
            TypeTag::Bytes => "bytes",
            TypeTag::List => "list",
            TypeTag::Tuple => "tuple",
            TypeTag::Set => "set",
            TypeTag::Dict => "dict",
            TypeTag::Class(name) => name,
        };
        write!(f, "{}", name)
    }
}

/// Instance of a class of the module under test
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectValue {
    pub class: String,
    pub fields: BTreeMap<String, Value>,
}

impl ObjectValue {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// A value of the program under test
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Elements are kept unique under [`Value::py_eq`]
    Set(Vec<Value>),
    /// Keys are kept unique under [`Value::py_eq`], in insertion order
    Dict(Vec<(Value, Value)>),
    Object(ObjectValue),
}

/// Binary arithmetic and bitwise operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    TrueDiv,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinOp {
    pub const ALL: [BinOp; 12] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::TrueDiv,
        BinOp::FloorDiv,
        BinOp::Mod,
        BinOp::Pow,
        BinOp::LShift,
        BinOp::RShift,
        BinOp::BitAnd,
        BinOp::BitOr,
        BinOp::BitXor,
    ];

    fn stem(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::TrueDiv => "truediv",
            BinOp::FloorDiv => "floordiv",
            BinOp::Mod => "mod",
            BinOp::Pow => "pow",
            BinOp::LShift => "lshift",
            BinOp::RShift => "rshift",
            BinOp::BitAnd => "and",
            BinOp::BitOr => "or",
            BinOp::BitXor => "xor",
        }
    }

    /// Operation name when the left operand receives the call, e.g. `__add__`
    pub fn name(self) -> String {
        format!("__{}__", self.stem())
    }

    /// Operation name when the right operand receives the call, e.g. `__radd__`
    pub fn reflected_name(self) -> String {
        format!("__r{}__", self.stem())
    }

    /// Operation name of the augmented assignment, e.g. `__iadd__`
    pub fn inplace_name(self) -> String {
        format!("__i{}__", self.stem())
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::TrueDiv => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::LShift => "<<",
            BinOp::RShift => ">>",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Pos,
    Abs,
    Invert,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "__neg__",
            UnaryOp::Pos => "__pos__",
            UnaryOp::Abs => "__abs__",
            UnaryOp::Invert => "__invert__",
        }
    }
}

/// Comparison operators a predicate can evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CompareOp {
    /// Operation name recorded by a proxy receiving the comparison.
    /// Identity checks have none, they are never recorded.
    pub fn name(self) -> Option<&'static str> {
        match self {
            CompareOp::Eq => Some("__eq__"),
            CompareOp::Ne => Some("__ne__"),
            CompareOp::Lt => Some("__lt__"),
            CompareOp::Le => Some("__le__"),
            CompareOp::Gt => Some("__gt__"),
            CompareOp::Ge => Some("__ge__"),
            CompareOp::In | CompareOp::NotIn => Some("__contains__"),
            CompareOp::Is | CompareOp::IsNot => None,
        }
    }

    /// The operator the right operand evaluates when the comparison is reflected
    pub fn reflected(self) -> CompareOp {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn unsupported(op: &str, lhs: &Value, rhs: &Value) -> Fault {
    Fault::TypeError(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op,
        lhs.type_tag(),
        rhs.type_tag()
    ))
}

fn overflow(op: &str) -> Fault {
    Fault::Overflow(format!("integer result of {} out of range", op))
}

fn python_floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn python_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r + b)
    } else {
        Some(r)
    }
}

fn repeat_count(count: i64) -> Result<usize, Fault> {
    if count > MAX_REPEAT {
        return Err(Fault::Overflow(format!("repeat count {} too large", count)));
    }
    Ok(count.max(0) as usize)
}

/// Repeat count for a sequence of `len` elements, bounded by the resulting length
fn sequence_repeat(kind: &str, len: usize, count: i64) -> Result<usize, Fault> {
    let count = repeat_count(count)?;
    if len.saturating_mul(count) > MAX_REPEAT as usize {
        return Err(Fault::Overflow(format!("{} repetition too large", kind)));
    }
    Ok(count)
}

fn normalise_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let resolved = if index < 0 { index + len } else { index };
    if (0..len).contains(&resolved) {
        Some(resolved as usize)
    } else {
        None
    }
}

fn expect_arity(name: &str, args: &[Value], arity: usize) -> Result<(), Fault> {
    if args.len() != arity {
        return Err(Fault::TypeError(format!(
            "{}() takes exactly {} argument(s) ({} given)",
            name,
            arity,
            args.len()
        )));
    }
    Ok(())
}

impl Value {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::None => TypeTag::NoneType,
            Value::Bool(_) => TypeTag::Bool,
            Value::Int(_) => TypeTag::Int,
            Value::Float(_) => TypeTag::Float,
            Value::Str(_) => TypeTag::Str,
            Value::Bytes(_) => TypeTag::Bytes,
            Value::List(_) => TypeTag::List,
            Value::Tuple(_) => TypeTag::Tuple,
            Value::Set(_) => TypeTag::Set,
            Value::Dict(_) => TypeTag::Dict,
            Value::Object(object) => TypeTag::Class(object.class.clone()),
        }
    }

    /// `isinstance`-style check; `bool` counts as an `int`
    pub fn is_instance_of(&self, tag: &TypeTag) -> bool {
        let own = self.type_tag();
        own == *tag || (*tag == TypeTag::Int && own == TypeTag::Bool)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => !items.is_empty(),
            Value::Dict(entries) => !entries.is_empty(),
            Value::Object(_) => true,
        }
    }

    fn as_num(&self) -> Option<Num> {
        match self {
            Value::Bool(b) => Some(Num::Int(*b as i64)),
            Value::Int(i) => Some(Num::Int(*i)),
            Value::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        self.as_num().map(Num::as_f64)
    }

    pub fn is_numeric(&self) -> bool {
        self.as_num().is_some()
    }

    /// Equality with numeric promotion: `1 == 1.0 == True`
    pub fn py_eq(&self, other: &Value) -> bool {
        match (self.as_num(), other.as_num()) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => return a == b,
            (Some(a), Some(b)) => return a.as_f64() == b.as_f64(),
            _ => {}
        }
        match (self, other) {
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
            }
            (Value::Set(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| x.py_eq(y)))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter().any(|(other_k, other_v)| k.py_eq(other_k) && v.py_eq(other_v))
                    })
            }
            _ => self == other,
        }
    }

    /// Ordering used by `<`, `<=`, `>`, `>=`. `Ok(None)` when unordered (NaN).
    pub fn partial_order(&self, other: &Value) -> Result<Option<Ordering>, Fault> {
        match (self.as_num(), other.as_num()) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => return Ok(Some(a.cmp(&b))),
            (Some(a), Some(b)) => return Ok(a.as_f64().partial_cmp(&b.as_f64())),
            _ => {}
        }
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
            (Value::Bytes(a), Value::Bytes(b)) => Ok(Some(a.cmp(b))),
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                for (x, y) in a.iter().zip(b) {
                    if !x.py_eq(y) {
                        return x.partial_order(y);
                    }
                }
                Ok(Some(a.len().cmp(&b.len())))
            }
            _ => Err(Fault::TypeError(format!(
                "'<' not supported between instances of '{}' and '{}'",
                self.type_tag(),
                other.type_tag()
            ))),
        }
    }

    /// Membership test `item in self`
    pub fn contains(&self, item: &Value) -> Result<bool, Fault> {
        match self {
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
                Ok(items.iter().any(|element| element.py_eq(item)))
            }
            Value::Dict(entries) => Ok(entries.iter().any(|(key, _)| key.py_eq(item))),
            Value::Str(haystack) => match item {
                Value::Str(needle) => Ok(haystack.contains(needle.as_str())),
                other => Err(Fault::TypeError(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_tag()
                ))),
            },
            Value::Bytes(haystack) => match item {
                Value::Bytes(needle) => Ok(needle.is_empty()
                    || haystack.windows(needle.len()).any(|window| window == needle.as_slice())),
                Value::Int(byte) => Ok(haystack.iter().any(|b| *b as i64 == *byte)),
                other => Err(Fault::TypeError(format!(
                    "a bytes-like object is required, not '{}'",
                    other.type_tag()
                ))),
            },
            other => Err(Fault::TypeError(format!(
                "argument of type '{}' is not iterable",
                other.type_tag()
            ))),
        }
    }

    /// Identity, approximated by type and value equality
    pub fn is_identical(&self, other: &Value) -> bool {
        self.type_tag() == other.type_tag() && self == other
    }

    pub fn compare(&self, op: CompareOp, other: &Value) -> Result<bool, Fault> {
        match op {
            CompareOp::Eq => Ok(self.py_eq(other)),
            CompareOp::Ne => Ok(!self.py_eq(other)),
            CompareOp::Lt => Ok(self.partial_order(other)? == Some(Ordering::Less)),
            CompareOp::Le => Ok(matches!(
                self.partial_order(other)?,
                Some(Ordering::Less) | Some(Ordering::Equal)
            )),
            CompareOp::Gt => Ok(self.partial_order(other)? == Some(Ordering::Greater)),
            CompareOp::Ge => Ok(matches!(
                self.partial_order(other)?,
                Some(Ordering::Greater) | Some(Ordering::Equal)
            )),
            CompareOp::In => other.contains(self),
            CompareOp::NotIn => other.contains(self).map(|found| !found),
            CompareOp::Is => Ok(self.is_identical(other)),
            CompareOp::IsNot => Ok(!self.is_identical(other)),
        }
    }

    pub fn binary(&self, op: BinOp, rhs: &Value) -> Result<Value, Fault> {
        if let (Some(a), Some(b)) = (self.as_num(), rhs.as_num()) {
            return numeric_binary(op, a, b, self, rhs);
        }
        match (op, self, rhs) {
            (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            (BinOp::Add, Value::Bytes(a), Value::Bytes(b)) => Ok(Value::Bytes([a.as_slice(), b].concat())),
            (BinOp::Add, Value::List(a), Value::List(b)) => Ok(Value::List([a.as_slice(), b].concat())),
            (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => Ok(Value::Tuple([a.as_slice(), b].concat())),
            (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
                Ok(Value::Str(s.repeat(sequence_repeat("str", s.len(), *n)?)))
            }
            (BinOp::Mul, Value::Bytes(b), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Bytes(b)) => {
                Ok(Value::Bytes(b.repeat(sequence_repeat("bytes", b.len(), *n)?)))
            }
            (BinOp::Mul, Value::List(items), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::List(items)) => {
                let count = sequence_repeat("list", items.len(), *n)?;
                Ok(Value::List((0..count).flat_map(|_| items.iter().cloned()).collect()))
            }
            (BinOp::BitOr, Value::Set(a), Value::Set(b)) => {
                let mut union = a.clone();
                for item in b {
                    if !union.iter().any(|existing| existing.py_eq(item)) {
                        union.push(item.clone());
                    }
                }
                Ok(Value::Set(union))
            }
            (BinOp::Sub, Value::Set(a), Value::Set(b)) => Ok(Value::Set(
                a.iter().filter(|x| !b.iter().any(|y| x.py_eq(y))).cloned().collect(),
            )),
            _ => Err(unsupported(op.symbol(), self, rhs)),
        }
    }

    pub fn unary(&self, op: UnaryOp) -> Result<Value, Fault> {
        match (op, self.as_num()) {
            (UnaryOp::Neg, Some(Num::Int(i))) => i.checked_neg().map(Value::Int).ok_or_else(|| overflow("-")),
            (UnaryOp::Neg, Some(Num::Float(f))) => Ok(Value::Float(-f)),
            (UnaryOp::Pos, Some(Num::Int(i))) => Ok(Value::Int(i)),
            (UnaryOp::Pos, Some(Num::Float(f))) => Ok(Value::Float(f)),
            (UnaryOp::Abs, Some(Num::Int(i))) => i.checked_abs().map(Value::Int).ok_or_else(|| overflow("abs")),
            (UnaryOp::Abs, Some(Num::Float(f))) => Ok(Value::Float(f.abs())),
            (UnaryOp::Invert, Some(Num::Int(i))) => Ok(Value::Int(!i)),
            _ => Err(Fault::TypeError(format!(
                "bad operand type for {}: '{}'",
                op.name(),
                self.type_tag()
            ))),
        }
    }

    /// Conversion performed by the builtin constructor of `target`
    pub fn convert(&self, target: &TypeTag) -> Result<Value, Fault> {
        match target {
            TypeTag::Bool => Ok(Value::Bool(self.is_truthy())),
            TypeTag::Str => Ok(Value::Str(self.to_str())),
            TypeTag::Int => match self {
                Value::Bool(b) => Ok(Value::Int(*b as i64)),
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Float(f) if f.is_nan() => Err(Fault::ValueError("cannot convert float NaN to integer".into())),
                Value::Float(f) if f.is_infinite() || f.abs() >= 9.2e18 => {
                    Err(Fault::Overflow("cannot convert float to integer".into()))
                }
                Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
                Value::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| Fault::ValueError(format!("invalid literal for int(): '{}'", s))),
                other => Err(Fault::TypeError(format!(
                    "int() argument must be a string or a number, not '{}'",
                    other.type_tag()
                ))),
            },
            TypeTag::Float => match self.as_num() {
                Some(num) => Ok(Value::Float(num.as_f64())),
                None => match self {
                    Value::Str(s) => s
                        .trim()
                        .parse::<f64>()
                        .map(Value::Float)
                        .map_err(|_| Fault::ValueError(format!("could not convert string to float: '{}'", s))),
                    other => Err(Fault::TypeError(format!(
                        "float() argument must be a string or a number, not '{}'",
                        other.type_tag()
                    ))),
                },
            },
            TypeTag::Bytes => match self {
                Value::Bytes(b) => Ok(Value::Bytes(b.clone())),
                Value::Bool(_) | Value::Int(_) => {
                    let n = self.as_num().map(|num| num.as_f64() as i64).unwrap_or(0);
                    if n < 0 {
                        return Err(Fault::ValueError("negative count".into()));
                    }
                    Ok(Value::Bytes(vec![0; repeat_count(n)?]))
                }
                Value::List(items) | Value::Tuple(items) => items
                    .iter()
                    .map(|item| match item {
                        Value::Int(i) if (0..=255).contains(i) => Ok(*i as u8),
                        _ => Err(Fault::ValueError("bytes must be in range(0, 256)".into())),
                    })
                    .collect::<Result<Vec<u8>, Fault>>()
                    .map(Value::Bytes),
                other => Err(Fault::TypeError(format!(
                    "cannot convert '{}' object to bytes",
                    other.type_tag()
                ))),
            },
            TypeTag::List => self.iterate().map(Value::List),
            TypeTag::Tuple => self.iterate().map(Value::Tuple),
            TypeTag::Set => Value::set_from(self.iterate()?),
            other => Err(Fault::TypeError(format!(
                "cannot convert '{}' to '{}'",
                self.type_tag(),
                other
            ))),
        }
    }

    /// `str(value)`: strings render bare, everything else as its repr
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Build a set, dropping duplicates; elements must be hashable
    pub fn set_from(elements: Vec<Value>) -> Result<Value, Fault> {
        let mut unique: Vec<Value> = Vec::with_capacity(elements.len());
        for element in elements {
            element.hash_value()?;
            if !unique.iter().any(|existing| existing.py_eq(&element)) {
                unique.push(element);
            }
        }
        Ok(Value::Set(unique))
    }

    /// Build a mapping; later entries replace earlier ones with an equal key
    pub fn dict_from(entries: Vec<(Value, Value)>) -> Result<Value, Fault> {
        let mut dict = Value::Dict(Vec::with_capacity(entries.len()));
        for (key, value) in entries {
            dict.setitem(&key, value)?;
        }
        Ok(dict)
    }

    pub fn hash_value(&self) -> Result<u64, Fault> {
        match self {
            Value::List(_) | Value::Set(_) | Value::Dict(_) => Err(Fault::TypeError(format!(
                "unhashable type: '{}'",
                self.type_tag()
            ))),
            Value::Tuple(items) => {
                let mut hasher = DefaultHasher::new();
                for item in items {
                    item.hash_value()?.hash(&mut hasher);
                }
                Ok(hasher.finish())
            }
            other => {
                let mut hasher = DefaultHasher::new();
                match other.as_num() {
                    // equal numbers hash equally across int, float and bool
                    Some(num) if num.as_f64().fract() == 0.0 => (num.as_f64() as i64).hash(&mut hasher),
                    Some(num) => num.as_f64().to_bits().hash(&mut hasher),
                    None => other.to_string().hash(&mut hasher),
                }
                Ok(hasher.finish())
            }
        }
    }

    pub fn getattr(&self, name: &str) -> Result<Value, Fault> {
        match self {
            Value::Object(object) => object.fields.get(name).cloned().ok_or_else(|| {
                Fault::AttributeError(format!("'{}' object has no attribute '{}'", object.class, name))
            }),
            other => Err(Fault::AttributeError(format!(
                "'{}' object has no attribute '{}'",
                other.type_tag(),
                name
            ))),
        }
    }

    pub fn setattr(&mut self, name: &str, value: Value) -> Result<(), Fault> {
        match self {
            Value::Object(object) => {
                object.fields.insert(name.to_string(), value);
                Ok(())
            }
            other => Err(Fault::AttributeError(format!(
                "'{}' object attribute '{}' is read-only",
                other.type_tag(),
                name
            ))),
        }
    }

    pub fn getitem(&self, key: &Value) -> Result<Value, Fault> {
        match self {
            Value::Dict(entries) => entries
                .iter()
                .find(|(k, _)| k.py_eq(key))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| Fault::KeyError(key.to_string())),
            Value::List(_) | Value::Tuple(_) | Value::Str(_) | Value::Bytes(_) => {
                let index = match key.as_num() {
                    Some(Num::Int(i)) => i,
                    _ => {
                        return Err(Fault::TypeError(format!(
                            "{} indices must be integers, not {}",
                            self.type_tag(),
                            key.type_tag()
                        )))
                    }
                };
                let out_of_range = || Fault::IndexError(format!("{} index out of range", self.type_tag()));
                match self {
                    Value::List(items) | Value::Tuple(items) => normalise_index(index, items.len())
                        .map(|i| items[i].clone())
                        .ok_or_else(out_of_range),
                    Value::Str(s) => {
                        let chars: Vec<char> = s.chars().collect();
                        normalise_index(index, chars.len())
                            .map(|i| Value::Str(chars[i].to_string()))
                            .ok_or_else(out_of_range)
                    }
                    Value::Bytes(bytes) => normalise_index(index, bytes.len())
                        .map(|i| Value::Int(bytes[i] as i64))
                        .ok_or_else(out_of_range),
                    _ => Err(out_of_range()),
                }
            }
            other => Err(Fault::TypeError(format!(
                "'{}' object is not subscriptable",
                other.type_tag()
            ))),
        }
    }

    pub fn setitem(&mut self, key: &Value, value: Value) -> Result<(), Fault> {
        match self {
            Value::Dict(entries) => {
                key.hash_value()?;
                match entries.iter_mut().find(|(k, _)| k.py_eq(key)) {
                    Some(entry) => entry.1 = value,
                    None => entries.push((key.clone(), value)),
                }
                Ok(())
            }
            Value::List(items) => {
                let index = match key.as_num() {
                    Some(Num::Int(i)) => i,
                    _ => {
                        return Err(Fault::TypeError(format!(
                            "list indices must be integers, not {}",
                            key.type_tag()
                        )))
                    }
                };
                let position = normalise_index(index, items.len())
                    .ok_or_else(|| Fault::IndexError("list assignment index out of range".into()))?;
                items[position] = value;
                Ok(())
            }
            other => Err(Fault::TypeError(format!(
                "'{}' object does not support item assignment",
                other.type_tag()
            ))),
        }
    }

    /// Elements produced by iterating the value
    pub fn iterate(&self) -> Result<Vec<Value>, Fault> {
        match self {
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => Ok(items.clone()),
            Value::Dict(entries) => Ok(entries.iter().map(|(k, _)| k.clone()).collect()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::Bytes(bytes) => Ok(bytes.iter().map(|b| Value::Int(*b as i64)).collect()),
            other => Err(Fault::TypeError(format!(
                "'{}' object is not iterable",
                other.type_tag()
            ))),
        }
    }

    pub fn len(&self) -> Result<usize, Fault> {
        match self {
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => Ok(items.len()),
            Value::Dict(entries) => Ok(entries.len()),
            Value::Str(s) => Ok(s.chars().count()),
            Value::Bytes(bytes) => Ok(bytes.len()),
            other => Err(Fault::TypeError(format!(
                "object of type '{}' has no len()",
                other.type_tag()
            ))),
        }
    }

    /// Invoke a builtin method of the value's type
    pub fn call_method(&mut self, name: &str, args: &[Value]) -> Result<Value, Fault> {
        match self {
            Value::Str(s) => str_method(s, name, args),
            Value::List(items) => list_method(items, name, args),
            Value::Dict(entries) => match name {
                "keys" => Ok(Value::List(entries.iter().map(|(k, _)| k.clone()).collect())),
                "values" => Ok(Value::List(entries.iter().map(|(_, v)| v.clone()).collect())),
                "items" => Ok(Value::List(
                    entries
                        .iter()
                        .map(|(k, v)| Value::Tuple(vec![k.clone(), v.clone()]))
                        .collect(),
                )),
                "get" => {
                    if args.is_empty() || args.len() > 2 {
                        return Err(Fault::TypeError("get expected 1 or 2 arguments".into()));
                    }
                    let default = args.get(1).cloned().unwrap_or(Value::None);
                    Ok(entries
                        .iter()
                        .find(|(k, _)| k.py_eq(&args[0]))
                        .map(|(_, v)| v.clone())
                        .unwrap_or(default))
                }
                "pop" => {
                    expect_arity(name, args, 1)?;
                    let position = entries
                        .iter()
                        .position(|(k, _)| k.py_eq(&args[0]))
                        .ok_or_else(|| Fault::KeyError(args[0].to_string()))?;
                    Ok(entries.remove(position).1)
                }
                _ => Err(Fault::AttributeError(format!("'dict' object has no attribute '{}'", name))),
            },
            Value::Set(items) => match name {
                "add" => {
                    expect_arity(name, args, 1)?;
                    args[0].hash_value()?;
                    if !items.iter().any(|item| item.py_eq(&args[0])) {
                        items.push(args[0].clone());
                    }
                    Ok(Value::None)
                }
                _ => Err(Fault::AttributeError(format!("'set' object has no attribute '{}'", name))),
            },
            other => Err(Fault::AttributeError(format!(
                "'{}' object has no attribute '{}'",
                other.type_tag(),
                name
            ))),
        }
    }
}

fn numeric_binary(op: BinOp, a: Num, b: Num, lhs: &Value, rhs: &Value) -> Result<Value, Fault> {
    let both_bool = matches!((lhs, rhs), (Value::Bool(_), Value::Bool(_)));
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => match op {
            BinOp::Add => x.checked_add(y).map(Value::Int).ok_or_else(|| overflow("+")),
            BinOp::Sub => x.checked_sub(y).map(Value::Int).ok_or_else(|| overflow("-")),
            BinOp::Mul => x.checked_mul(y).map(Value::Int).ok_or_else(|| overflow("*")),
            BinOp::TrueDiv => {
                if y == 0 {
                    Err(Fault::ZeroDivision("division by zero".into()))
                } else {
                    Ok(Value::Float(x as f64 / y as f64))
                }
            }
            BinOp::FloorDiv => {
                if y == 0 {
                    return Err(Fault::ZeroDivision("integer division or modulo by zero".into()));
                }
                python_floor_div(x, y).map(Value::Int).ok_or_else(|| overflow("//"))
            }
            BinOp::Mod => {
                if y == 0 {
                    return Err(Fault::ZeroDivision("integer division or modulo by zero".into()));
                }
                python_mod(x, y).map(Value::Int).ok_or_else(|| overflow("%"))
            }
            BinOp::Pow => {
                if y < 0 {
                    if x == 0 {
                        return Err(Fault::ZeroDivision("0.0 cannot be raised to a negative power".into()));
                    }
                    return Ok(Value::Float((x as f64).powf(y as f64)));
                }
                u32::try_from(y)
                    .ok()
                    .and_then(|exponent| x.checked_pow(exponent))
                    .map(Value::Int)
                    .ok_or_else(|| overflow("**"))
            }
            BinOp::LShift => {
                if y < 0 {
                    return Err(Fault::ValueError("negative shift count".into()));
                }
                if x == 0 {
                    return Ok(Value::Int(0));
                }
                if y >= 64 {
                    return Err(overflow("<<"));
                }
                let shifted = (x as i128) << y;
                i64::try_from(shifted).map(Value::Int).map_err(|_| overflow("<<"))
            }
            BinOp::RShift => {
                if y < 0 {
                    return Err(Fault::ValueError("negative shift count".into()));
                }
                Ok(Value::Int(if y >= 64 { if x < 0 { -1 } else { 0 } } else { x >> y }))
            }
            BinOp::BitAnd if both_bool => Ok(Value::Bool((x & y) != 0)),
            BinOp::BitOr if both_bool => Ok(Value::Bool((x | y) != 0)),
            BinOp::BitXor if both_bool => Ok(Value::Bool((x ^ y) != 0)),
            BinOp::BitAnd => Ok(Value::Int(x & y)),
            BinOp::BitOr => Ok(Value::Int(x | y)),
            BinOp::BitXor => Ok(Value::Int(x ^ y)),
        },
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            match op {
                BinOp::Add => Ok(Value::Float(x + y)),
                BinOp::Sub => Ok(Value::Float(x - y)),
                BinOp::Mul => Ok(Value::Float(x * y)),
                BinOp::TrueDiv | BinOp::FloorDiv | BinOp::Mod if y == 0.0 => {
                    Err(Fault::ZeroDivision("float division by zero".into()))
                }
                BinOp::TrueDiv => Ok(Value::Float(x / y)),
                BinOp::FloorDiv => Ok(Value::Float((x / y).floor())),
                BinOp::Mod => Ok(Value::Float(x - y * (x / y).floor())),
                BinOp::Pow => Ok(Value::Float(x.powf(y))),
                _ => Err(unsupported(op.symbol(), lhs, rhs)),
            }
        }
    }
}

fn str_arg<'a>(name: &str, args: &'a [Value], index: usize) -> Result<&'a str, Fault> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(Fault::TypeError(format!(
            "{}() argument must be str, not {}",
            name,
            other.type_tag()
        ))),
        None => Err(Fault::TypeError(format!("{}() missing argument {}", name, index))),
    }
}

fn str_method(s: &str, name: &str, args: &[Value]) -> Result<Value, Fault> {
    match name {
        "startswith" => {
            expect_arity(name, args, 1)?;
            Ok(Value::Bool(s.starts_with(str_arg(name, args, 0)?)))
        }
        "endswith" => {
            expect_arity(name, args, 1)?;
            Ok(Value::Bool(s.ends_with(str_arg(name, args, 0)?)))
        }
        "upper" => Ok(Value::Str(s.to_uppercase())),
        "lower" => Ok(Value::Str(s.to_lowercase())),
        "strip" => Ok(Value::Str(s.trim().to_string())),
        "isdigit" => Ok(Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))),
        "find" => {
            expect_arity(name, args, 1)?;
            let needle = str_arg(name, args, 0)?;
            Ok(Value::Int(
                s.find(needle)
                    .map(|byte_index| s[..byte_index].chars().count() as i64)
                    .unwrap_or(-1),
            ))
        }
        "count" => {
            expect_arity(name, args, 1)?;
            let needle = str_arg(name, args, 0)?;
            if needle.is_empty() {
                return Ok(Value::Int(s.chars().count() as i64 + 1));
            }
            Ok(Value::Int(s.matches(needle).count() as i64))
        }
        "split" => {
            let parts: Vec<Value> = if args.is_empty() {
                s.split_whitespace().map(|p| Value::Str(p.to_string())).collect()
            } else {
                let separator = str_arg(name, args, 0)?;
                if separator.is_empty() {
                    return Err(Fault::ValueError("empty separator".into()));
                }
                s.split(separator).map(|p| Value::Str(p.to_string())).collect()
            };
            Ok(Value::List(parts))
        }
        "replace" => {
            expect_arity(name, args, 2)?;
            Ok(Value::Str(s.replace(str_arg(name, args, 0)?, str_arg(name, args, 1)?)))
        }
        "join" => {
            expect_arity(name, args, 1)?;
            let parts = args[0]
                .iterate()?
                .into_iter()
                .map(|part| match part {
                    Value::Str(p) => Ok(p),
                    other => Err(Fault::TypeError(format!(
                        "sequence item: expected str instance, {} found",
                        other.type_tag()
                    ))),
                })
                .collect::<Result<Vec<String>, Fault>>()?;
            Ok(Value::Str(parts.join(s)))
        }
        _ => Err(Fault::AttributeError(format!("'str' object has no attribute '{}'", name))),
    }
}

fn list_method(items: &mut Vec<Value>, name: &str, args: &[Value]) -> Result<Value, Fault> {
    match name {
        "append" => {
            expect_arity(name, args, 1)?;
            items.push(args[0].clone());
            Ok(Value::None)
        }
        "extend" => {
            expect_arity(name, args, 1)?;
            items.extend(args[0].iterate()?);
            Ok(Value::None)
        }
        "insert" => {
            expect_arity(name, args, 2)?;
            let index = match args[0] {
                Value::Int(i) => i,
                ref other => {
                    return Err(Fault::TypeError(format!(
                        "'{}' object cannot be interpreted as an integer",
                        other.type_tag()
                    )))
                }
            };
            let len = items.len() as i64;
            let position = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(position as usize, args[1].clone());
            Ok(Value::None)
        }
        "pop" => {
            if !args.is_empty() {
                expect_arity(name, args, 0)?;
            }
            items.pop().ok_or_else(|| Fault::IndexError("pop from empty list".into()))
        }
        "count" => {
            expect_arity(name, args, 1)?;
            Ok(Value::Int(items.iter().filter(|item| item.py_eq(&args[0])).count() as i64))
        }
        "index" => {
            expect_arity(name, args, 1)?;
            items
                .iter()
                .position(|item| item.py_eq(&args[0]))
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| Fault::ValueError(format!("{} is not in list", args[0])))
        }
        "clear" => {
            items.clear();
            Ok(Value::None)
        }
        _ => Err(Fault::AttributeError(format!("'list' object has no attribute '{}'", name))),
    }
}

fn write_sequence(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Renders the value as a literal of the target language
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) if x.is_nan() => write!(f, "float('nan')"),
            Value::Float(x) if x.is_infinite() => {
                write!(f, "float('{}inf')", if *x < 0.0 { "-" } else { "" })
            }
            Value::Float(x) if x.fract() == 0.0 && x.abs() < 1e16 => write!(f, "{:.1}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Value::Bytes(bytes) => {
                write!(f, "b'")?;
                for byte in bytes {
                    for escaped in std::ascii::escape_default(*byte) {
                        write!(f, "{}", escaped as char)?;
                    }
                }
                write!(f, "'")
            }
            Value::List(items) => {
                write!(f, "[")?;
                write_sequence(f, items)?;
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                write_sequence(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::Set(items) if items.is_empty() => write!(f, "set()"),
            Value::Set(items) => {
                write!(f, "{{")?;
                write_sequence(f, items)?;
                write!(f, "}}")
            }
            Value::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Value::Object(object) => {
                write!(f, "{}(", object.class)?;
                for (i, (name, value)) in object.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", name, value)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}
