//! Leaf comparisons of the compiled predicate tree
//!
//! A [`Comparison`] renders to the text the query engine receives and can be
//! evaluated directly against a [`Row`] when the engine is not in play.

use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::expr::Negate;
use crate::parser::CompileError;
use crate::row::{Row, Value};
use crate::schema::Semantics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    pub fn negate(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Le => CmpOp::Gt,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Ge => CmpOp::Lt,
        }
    }

    /// `<`, `<=`, `>` and `>=`
    pub fn is_ordering(&self) -> bool {
        !matches!(self, CmpOp::Eq | CmpOp::Ne)
    }

    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Ge => ordering != Ordering::Less,
        }
    }
}

impl FromStr for CmpOp {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" | "=" => Ok(CmpOp::Eq),
            "!=" => Ok(CmpOp::Ne),
            "<" => Ok(CmpOp::Lt),
            "<=" => Ok(CmpOp::Le),
            ">" => Ok(CmpOp::Gt),
            ">=" => Ok(CmpOp::Ge),
            other => Err(CompileError::internal(format!(
                "unknown comparison operator '{other}'"
            ))),
        }
    }
}

impl Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitOp {
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BitOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BitOp::And => "&",
            BitOp::Or => "|",
            BitOp::Xor => "^",
            BitOp::Shl => "<<",
            BitOp::Shr => ">>",
        }
    }

    /// `None` for shift amounts outside the value width
    pub fn apply(&self, lhs: i128, rhs: i64) -> Option<i128> {
        match self {
            BitOp::And => Some(lhs & i128::from(rhs)),
            BitOp::Or => Some(lhs | i128::from(rhs)),
            BitOp::Xor => Some(lhs ^ i128::from(rhs)),
            BitOp::Shl => u32::try_from(rhs).ok().and_then(|s| lhs.checked_shl(s)),
            BitOp::Shr => u32::try_from(rhs).ok().and_then(|s| lhs.checked_shr(s)),
        }
    }
}

impl FromStr for BitOp {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "&" => Ok(BitOp::And),
            "|" => Ok(BitOp::Or),
            "^" => Ok(BitOp::Xor),
            "<<" => Ok(BitOp::Shl),
            ">>" => Ok(BitOp::Shr),
            other => Err(CompileError::internal(format!(
                "unknown bitwise operator '{other}'"
            ))),
        }
    }
}

impl Display for BitOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Left side of a comparison, always rooted at one storage column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Column(String),
    /// `function(column)`, used by aggregate groups
    Aggregate { function: String, column: String },
    Bitwise {
        operand: Box<Operand>,
        op: BitOp,
        value: i64,
    },
    /// String column whose stored form must be decoded before comparing
    Decoded { column: String, semantics: Semantics },
}

impl Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Column(column) | Operand::Decoded { column, .. } => f.write_str(column),
            Operand::Aggregate { function, column } => write!(f, "{function}({column})"),
            Operand::Bitwise { operand, op, value } => write!(f, "({operand} {op} {value})"),
        }
    }
}

enum Scalar {
    Int(i128),
    Text(String),
}

impl From<Value> for Scalar {
    fn from(value: Value) -> Self {
        match value {
            Value::Int(v) => Scalar::Int(i128::from(v)),
            Value::Uint(v) => Scalar::Int(i128::from(v)),
            Value::Text(v) => Scalar::Text(v),
        }
    }
}

impl Operand {
    fn evaluate<R: Row + ?Sized>(&self, row: &R) -> Option<Scalar> {
        match self {
            Operand::Column(column) => row.value(column).map(Scalar::from),
            Operand::Aggregate { column, .. } => row
                .value(&self.to_string())
                .or_else(|| row.value(column))
                .map(Scalar::from),
            Operand::Bitwise { operand, op, value } => {
                let lhs = operand.evaluate(row)?;
                match lhs {
                    Scalar::Int(lhs) => op.apply(lhs, *value).map(Scalar::Int),
                    Scalar::Text(_) => None,
                }
            }
            Operand::Decoded { column, semantics } => match row.value(column)? {
                Value::Text(raw) => decode(*semantics, &raw).map(Scalar::Text),
                other => other.as_integer().map(Scalar::Int),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Int(i64),
    Uint(u64),
    Text(String),
}

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Uint(v) => write!(f, "{v}"),
            Literal::Text(v) => {
                write!(f, "\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\""))
            }
        }
    }
}

/// `left OP right`, the only leaf of a compiled filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub left: Operand,
    pub op: CmpOp,
    pub right: Literal,
}

impl Comparison {
    pub fn new(left: Operand, op: CmpOp, right: Literal) -> Self {
        Comparison { left, op, right }
    }

    /// Evaluate against a row; missing or ill-typed values never match
    pub fn matches<R: Row + ?Sized>(&self, row: &R) -> bool {
        match (self.left.evaluate(row), &self.right) {
            (Some(Scalar::Int(lhs)), Literal::Int(rhs)) => self.op.holds(lhs.cmp(&i128::from(*rhs))),
            (Some(Scalar::Int(lhs)), Literal::Uint(rhs)) => {
                self.op.holds(lhs.cmp(&i128::from(*rhs)))
            }
            (Some(Scalar::Text(lhs)), Literal::Text(rhs)) => match self.op {
                CmpOp::Eq => lhs == *rhs,
                CmpOp::Ne => lhs != *rhs,
                _ => false,
            },
            _ => false,
        }
    }

    /// Whether only row evaluation can decide this comparison; such leaves are
    /// left out of the engine text
    pub fn needs_row_check(&self) -> bool {
        matches!(self.left, Operand::Decoded { .. })
    }
}

impl Negate for Comparison {
    fn negate(self) -> Self {
        Comparison {
            op: self.op.negate(),
            ..self
        }
    }
}

impl Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.op, self.right)
    }
}

/// Lower-case a DNS name and drop the root label dot
pub(crate) fn normalize_dns(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

fn decode(semantics: Semantics, raw: &str) -> Option<String> {
    match semantics {
        Semantics::Dns => Some(decode_dns(raw)),
        Semantics::Url => decode_url(raw),
        Semantics::Protocol | Semantics::Flags => Some(raw.to_string()),
    }
}

/// Accepts both wire format (length-prefixed labels) and dotted names
fn decode_dns(raw: &str) -> String {
    match parse_dns_wire(raw.as_bytes()) {
        Some(name) => normalize_dns(&name),
        None => normalize_dns(raw),
    }
}

/// Wire-format name; the labels must cover the input, optionally followed
/// by the zero-length root label
fn parse_dns_wire(bytes: &[u8]) -> Option<String> {
    let mut labels = Vec::new();
    let mut pos = 0;
    while let Some(&len) = bytes.get(pos) {
        let len = usize::from(len);
        if len == 0 {
            if pos + 1 != bytes.len() {
                return None;
            }
            break;
        }
        if len > 63 {
            return None;
        }
        let label = bytes.get(pos + 1..pos + 1 + len)?;
        labels.push(std::str::from_utf8(label).ok()?);
        pos += 1 + len;
    }

    if labels.is_empty() {
        None
    } else {
        Some(labels.join("."))
    }
}

/// Percent-decode a URL; `None` for truncated escapes or non-UTF-8 results
pub(crate) fn decode_url(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = raw.get(i + 1..i + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}
