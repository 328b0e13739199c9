//! Expression compiler
//!
//! Folds resolved columns, typed literals and operators into [`Fragment`]s:
//! the predicate text for the query engine and the [`Expr`] tree for local
//! row evaluation, always built together. Comparisons on decoded strings
//! cannot be evaluated by the engine and only live in the tree, so the text
//! never rejects a row the tree accepts.
//!
//! All cross-type coercion happens in [`parse_exp`]: bare words stay
//! [`ParseValue::SemanticMarker`]s until the column they are compared with is
//! known, and are only then read as a protocol name, flag letters or a
//! (decoded) string.

use std::fmt;

use crate::expr::Expr;
use crate::predicate::{decode_url, normalize_dns, BitOp, CmpOp, Comparison, Literal, Operand};
use crate::schema::{ColumnKind, Semantics};

use super::columns::{Column, ColumnGroup};
use super::error::{CompileError, LiteralKind};
use super::literals::{
    parse_flags, resolve_protocol_name, Ipv4Subnet, Ipv6Halves, Ipv6Subnet,
};

/// Value passed between grammar actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseValue {
    Column(Column),
    ColumnGroup(ColumnGroup),
    RawColumn(Column),
    Number(i64),
    BitColVal(BitColVal),
    Ipv4(u32),
    Ipv4Subnet(Ipv4Subnet),
    Ipv6(Ipv6Halves),
    Ipv6Subnet(Ipv6Subnet),
    Timestamp(i64),
    StringLiteral(String),
    /// Bare word whose meaning depends on the column it is compared with
    SemanticMarker(String),
}

impl ParseValue {
    pub fn is_subnet(&self) -> bool {
        matches!(self, ParseValue::Ipv4Subnet(_) | ParseValue::Ipv6Subnet(_))
    }

    fn describe(&self) -> String {
        match self {
            ParseValue::Column(c) | ParseValue::RawColumn(c) => format!("column {}", c.alias),
            ParseValue::ColumnGroup(g) => format!("group {}", g.alias),
            ParseValue::BitColVal(b) => format!("{} {} {}", b.target.describe(), b.op, b.value),
            ParseValue::Number(n) => format!("number {n}"),
            ParseValue::Ipv4(_) => "IPv4 address".to_string(),
            ParseValue::Ipv4Subnet(_) => "IPv4 subnet".to_string(),
            ParseValue::Ipv6(_) => "IPv6 address".to_string(),
            ParseValue::Ipv6Subnet(_) => "IPv6 subnet".to_string(),
            ParseValue::Timestamp(_) => "timestamp".to_string(),
            ParseValue::StringLiteral(s) => format!("string \"{s}\""),
            ParseValue::SemanticMarker(s) => format!("'{s}'"),
        }
    }
}

/// `column OP literal` waiting to be compared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitColVal {
    pub target: Box<ParseValue>,
    pub op: BitOp,
    pub value: i64,
}

/// One compiled piece of predicate: engine text and tree kept in lockstep
///
/// The text is the tree relaxed to the comparisons the engine evaluates
/// exactly; it is empty when none remain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    text: String,
    tree: Expr<Comparison>,
}

impl Fragment {
    fn from_tree(tree: Expr<Comparison>) -> Self {
        let text = tree
            .relax(&|comparison: &Comparison| !comparison.needs_row_check())
            .map(|engine| engine.to_string())
            .unwrap_or_default();
        Fragment { text, tree }
    }

    pub fn comparison(left: Operand, op: CmpOp, right: Literal) -> Self {
        Self::from_tree(Expr::Predicate(Comparison::new(left, op, right)))
    }

    pub fn and(self, other: Fragment) -> Self {
        Self::from_tree(Expr::and(self.tree, other.tree))
    }

    pub fn or(self, other: Fragment) -> Self {
        Self::from_tree(Expr::or(self.tree, other.tree))
    }

    /// OR over all fragments
    pub fn any(fragments: impl IntoIterator<Item = Fragment>) -> Option<Self> {
        Expr::any(fragments.into_iter().map(|f| f.tree)).map(Self::from_tree)
    }

    /// AND over all fragments
    pub fn all(fragments: impl IntoIterator<Item = Fragment>) -> Option<Self> {
        Expr::all(fragments.into_iter().map(|f| f.tree)).map(Self::from_tree)
    }

    pub fn negate(self) -> Self {
        Self::from_tree(self.tree.negate())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_parts(self) -> (String, Expr<Comparison>) {
        (self.text, self.tree)
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Build the unevaluated `column OP literal` used as a comparison operand
pub fn parse_bit_col_val(
    column: ParseValue,
    op: BitOp,
    literal: &ParseValue,
) -> Result<ParseValue, CompileError> {
    let value = match literal {
        ParseValue::Number(n) => *n,
        other => {
            return Err(CompileError::mismatch(
                column.describe(),
                other.describe(),
                format!("operator {op} needs a number"),
            ))
        }
    };

    match column {
        ParseValue::Column(_) | ParseValue::RawColumn(_) | ParseValue::ColumnGroup(_) => {
            Ok(ParseValue::BitColVal(BitColVal {
                target: Box::new(column),
                op,
                value,
            }))
        }
        other => Err(CompileError::mismatch(
            other.describe(),
            literal.describe(),
            format!("operator {op} applies to columns only"),
        )),
    }
}

/// Quoted text, compared as-is
pub fn parse_string(text: &str) -> ParseValue {
    ParseValue::StringLiteral(text.to_string())
}

/// Bare word, interpreted once the left-hand column is known
pub fn parse_marker(text: &str) -> ParseValue {
    ParseValue::SemanticMarker(text.to_string())
}

/// A single storage column on the left side, with its wrapping operators
struct Target<'a> {
    column: &'a Column,
    aggregate: bool,
    bit: Option<(BitOp, i64)>,
}

impl Target<'_> {
    fn operand(&self, part: &str) -> Operand {
        let base = if self.aggregate {
            Operand::Aggregate {
                function: self.column.aggregation_function().to_string(),
                column: part.to_string(),
            }
        } else {
            Operand::Column(part.to_string())
        };

        match self.bit {
            Some((op, value)) => Operand::Bitwise {
                operand: Box::new(base),
                op,
                value,
            },
            None => base,
        }
    }

    fn kind(&self) -> Option<ColumnKind> {
        self.column.kind
    }

    fn accepts(&self, kinds: &[ColumnKind]) -> bool {
        self.kind().map_or(true, |kind| kinds.contains(&kind))
    }

    fn mismatch(&self, right: &ParseValue, reason: impl Into<String>) -> CompileError {
        CompileError::mismatch(
            format!("column {}", self.column.alias),
            right.describe(),
            reason,
        )
    }

    /// OR of `part OP literal` across every storage part
    fn each_part(&self, op: CmpOp, literal: Literal) -> Result<Fragment, CompileError> {
        Fragment::any(
            self.column
                .parts
                .iter()
                .map(|part| Fragment::comparison(self.operand(part), op, literal.clone())),
        )
        .ok_or_else(|| CompileError::internal(format!("column {} has no parts", self.column.alias)))
    }
}

fn targets(left: &ParseValue) -> Result<Vec<Target<'_>>, CompileError> {
    match left {
        ParseValue::Column(column) | ParseValue::RawColumn(column) => Ok(vec![Target {
            column,
            aggregate: false,
            bit: None,
        }]),
        ParseValue::ColumnGroup(group) => Ok(group
            .members
            .iter()
            .map(|column| Target {
                column,
                aggregate: group.aggregate,
                bit: None,
            })
            .collect()),
        ParseValue::BitColVal(bit) => {
            let mut inner = targets(&bit.target)?;
            for target in &mut inner {
                target.bit = Some((bit.op, bit.value));
            }
            Ok(inner)
        }
        other => Err(CompileError::mismatch(
            other.describe(),
            "comparison",
            "the left side of a comparison must be a column",
        )),
    }
}

/// Apply `compile` to every target and OR the results
///
/// With several targets, members whose type does not fit the literal are
/// skipped; the comparison only fails when no member fits.
fn broadcast<F>(left: &ParseValue, compile: F) -> Result<Fragment, CompileError>
where
    F: Fn(&Target<'_>) -> Result<Fragment, CompileError>,
{
    let targets = targets(left)?;
    let broadcasting = targets.len() > 1;

    let mut fragments = Vec::with_capacity(targets.len());
    let mut first_mismatch = None;

    for target in &targets {
        match compile(target) {
            Ok(fragment) => fragments.push(fragment),
            Err(e @ CompileError::TypeMismatch { .. }) if broadcasting => {
                log::debug!("skipping {}: {}", target.column.alias, e);
                first_mismatch.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }

    Fragment::any(fragments).ok_or_else(|| {
        first_mismatch
            .unwrap_or_else(|| CompileError::internal("comparison over an empty column group"))
    })
}

/// Compile `left COMPARATOR right` into a fragment
///
/// Group operands broadcast the comparison over their members and join the
/// results with OR. Subnets are delegated to [`parse_exp_sub`].
pub fn parse_exp(
    left: &ParseValue,
    cmp: CmpOp,
    right: &ParseValue,
) -> Result<Fragment, CompileError> {
    if right.is_subnet() {
        return match cmp {
            CmpOp::Eq => parse_exp_sub(left, right),
            CmpOp::Ne => parse_exp_sub(left, right).map(Fragment::negate),
            ordering => Err(CompileError::mismatch(
                left.describe(),
                right.describe(),
                format!("a subnet cannot be compared with {ordering}"),
            )),
        };
    }

    let fragment = broadcast(left, |target| compare(target, cmp, right))?;
    log::debug!("compiled {} {} {}: {}", left.describe(), cmp, right.describe(), fragment);
    Ok(fragment)
}

/// `left right` with the comparator left out means equality
pub fn parse_exp_default(left: &ParseValue, right: &ParseValue) -> Result<Fragment, CompileError> {
    parse_exp(left, CmpOp::Eq, right)
}

/// Subnet membership as an inclusive range test on every target column
pub fn parse_exp_sub(left: &ParseValue, right: &ParseValue) -> Result<Fragment, CompileError> {
    let fragment = broadcast(left, |target| {
        if target.bit.is_some() {
            return Err(target.mismatch(right, "subnets cannot be tested on bitwise expressions"));
        }

        match right {
            ParseValue::Ipv4Subnet(subnet) => {
                if !target.accepts(&[ColumnKind::Ipv4]) {
                    return Err(target.mismatch(right, "not an IPv4 column"));
                }
                let ranges = target.column.parts.iter().map(|part| {
                    range(
                        target.operand(part),
                        Literal::Int(i64::from(subnet.low)),
                        Literal::Int(i64::from(subnet.high)),
                    )
                });
                Fragment::any(ranges).ok_or_else(|| CompileError::internal("column without parts"))
            }
            ParseValue::Ipv6Subnet(subnet) => {
                let (high, low) = ipv6_parts(target, right)?;
                let mut clauses = vec![range(
                    target.operand(high),
                    Literal::Uint(subnet.low.high),
                    Literal::Uint(subnet.high.high),
                )];
                // the low half is only constrained for masks longer than 64 bits
                if subnet.low.low != 0 || subnet.high.low != u64::MAX {
                    clauses.push(range(
                        target.operand(low),
                        Literal::Uint(subnet.low.low),
                        Literal::Uint(subnet.high.low),
                    ));
                }
                Fragment::all(clauses).ok_or_else(|| CompileError::internal("empty IPv6 range"))
            }
            other => Err(CompileError::mismatch(
                left.describe(),
                other.describe(),
                "expected a subnet",
            )),
        }
    })?;

    log::debug!("compiled {} in {}: {}", left.describe(), right.describe(), fragment);
    Ok(fragment)
}

fn range(operand: Operand, low: Literal, high: Literal) -> Fragment {
    Fragment::comparison(operand.clone(), CmpOp::Ge, low)
        .and(Fragment::comparison(operand, CmpOp::Le, high))
}

fn ipv6_parts<'a>(
    target: &Target<'a>,
    right: &ParseValue,
) -> Result<(&'a str, &'a str), CompileError> {
    if target.bit.is_some() {
        return Err(target.mismatch(right, "IPv6 addresses cannot be used with bitwise operators"));
    }
    match (target.kind(), target.column.parts.as_slice()) {
        (Some(ColumnKind::Ipv6), [high, low]) => Ok((high.as_str(), low.as_str())),
        _ => Err(target.mismatch(right, "not an IPv6 column")),
    }
}

fn require_equality(target: &Target<'_>, cmp: CmpOp, right: &ParseValue) -> Result<(), CompileError> {
    if cmp.is_ordering() {
        Err(target.mismatch(right, format!("only == and != apply, not {cmp}")))
    } else {
        Ok(())
    }
}

fn compare(target: &Target<'_>, cmp: CmpOp, right: &ParseValue) -> Result<Fragment, CompileError> {
    use ColumnKind::{Ipv4, Number, Timestamp};

    let integer_kinds: &[ColumnKind] = &[Number, Ipv4, Timestamp];

    match right {
        ParseValue::Number(n) => {
            if !target.accepts(integer_kinds) {
                return Err(target.mismatch(right, "column is not numeric"));
            }
            target.each_part(cmp, Literal::Int(*n))
        }
        ParseValue::Timestamp(secs) => {
            if !target.accepts(&[Timestamp, Number]) {
                return Err(target.mismatch(right, "column does not hold times"));
            }
            target.each_part(cmp, Literal::Int(*secs))
        }
        ParseValue::Ipv4(addr) => {
            if !target.accepts(&[Ipv4]) {
                return Err(target.mismatch(right, "not an IPv4 column"));
            }
            target.each_part(cmp, Literal::Int(i64::from(*addr)))
        }
        ParseValue::Ipv6(addr) => {
            let (high, low) = ipv6_parts(target, right)?;
            Ok(compare_ipv6(target.operand(high), target.operand(low), cmp, addr))
        }
        ParseValue::StringLiteral(text) => compare_text(target, cmp, right, text),
        ParseValue::SemanticMarker(word) => match target.column.semantics {
            Some(Semantics::Protocol) => {
                let number = resolve_protocol_name(word)?;
                target.each_part(cmp, Literal::Int(number))
            }
            Some(Semantics::Flags) => {
                require_equality(target, cmp, right)?;
                if target.bit.is_some() {
                    return Err(target.mismatch(right, "flags already test a bit mask"));
                }
                let mask = parse_flags(word)?;
                let masked = Target {
                    column: target.column,
                    aggregate: target.aggregate,
                    bit: Some((BitOp::And, mask)),
                };
                masked.each_part(cmp, Literal::Int(mask))
            }
            Some(Semantics::Url) | Some(Semantics::Dns) | None => {
                compare_text(target, cmp, right, word)
            }
        },
        ParseValue::Ipv4Subnet(_) | ParseValue::Ipv6Subnet(_) => {
            Err(CompileError::internal("subnets are compiled by parse_exp_sub"))
        }
        ParseValue::Column(_)
        | ParseValue::RawColumn(_)
        | ParseValue::ColumnGroup(_)
        | ParseValue::BitColVal(_) => Err(target.mismatch(
            right,
            "the right side of a comparison must be a literal",
        )),
    }
}

fn compare_text(
    target: &Target<'_>,
    cmp: CmpOp,
    right: &ParseValue,
    text: &str,
) -> Result<Fragment, CompileError> {
    if !target.accepts(&[ColumnKind::String]) {
        return Err(target.mismatch(right, "column does not hold strings"));
    }
    require_equality(target, cmp, right)?;
    if target.bit.is_some() || target.aggregate {
        return Err(target.mismatch(right, "strings cannot be combined with operators"));
    }

    // row values are decoded before comparing, so the literal is normalized the same way
    let (decoded, literal) = match target.column.semantics {
        Some(semantics @ Semantics::Dns) => (Some(semantics), normalize_dns(text)),
        Some(semantics @ Semantics::Url) => (
            Some(semantics),
            decode_url(text).ok_or_else(|| {
                CompileError::format(LiteralKind::Url, text, "invalid percent-encoding")
            })?,
        ),
        _ => (None, text.to_string()),
    };

    let fragments = target.column.parts.iter().map(|part| {
        let operand = match decoded {
            Some(semantics) => Operand::Decoded {
                column: part.clone(),
                semantics,
            },
            None => Operand::Column(part.clone()),
        };
        Fragment::comparison(operand, cmp, Literal::Text(literal.clone()))
    });

    Fragment::any(fragments).ok_or_else(|| CompileError::internal("column without parts"))
}

/// Two-column comparison, ordered by the high half first
fn compare_ipv6(high: Operand, low: Operand, cmp: CmpOp, addr: &Ipv6Halves) -> Fragment {
    let h = Literal::Uint(addr.high);
    let l = Literal::Uint(addr.low);

    match cmp {
        CmpOp::Eq => Fragment::comparison(high, CmpOp::Eq, h)
            .and(Fragment::comparison(low, CmpOp::Eq, l)),
        CmpOp::Ne => Fragment::comparison(high, CmpOp::Ne, h)
            .or(Fragment::comparison(low, CmpOp::Ne, l)),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let strict = match cmp {
                CmpOp::Lt | CmpOp::Le => CmpOp::Lt,
                _ => CmpOp::Gt,
            };
            Fragment::comparison(high.clone(), strict, h.clone()).or(Fragment::comparison(
                high,
                CmpOp::Eq,
                h,
            )
            .and(Fragment::comparison(low, cmp, l)))
        }
    }
}
