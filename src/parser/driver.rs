use pest::{
    iterators::Pair,
    pratt_parser::{Assoc::*, Op, PrattParser},
    Parser,
};
use pest_derive::Parser;

use crate::predicate::{BitOp, CmpOp};
use crate::schema::Schema;

use super::{
    columns::{ColumnResolver, Resolved},
    compiler::{
        parse_bit_col_val, parse_exp, parse_exp_default, parse_exp_sub, parse_marker,
        parse_string, Fragment, ParseValue,
    },
    error::{CompileError, InvalidFilter, SpanExt},
    literals::{parse_ipv4, parse_ipv4_subnet, parse_ipv6, parse_ipv6_subnet, parse_number},
    time::parse_timestamp,
};

#[derive(Parser)]
#[grammar = "parser/grammar.pest"]
pub struct FilterGrammar;

/// Compilation state for one filter text
///
/// Created per compilation and dropped when it finishes; nothing in here
/// outlives the call to [`Driver::compile`].
pub struct Driver<'a> {
    source: &'a str,
    resolver: ColumnResolver<'a>,
    pratt: PrattParser<Rule>,
}

impl<'a> Driver<'a> {
    pub fn new(source: &'a str, schema: &'a Schema) -> Self {
        let pratt = PrattParser::new()
            .op(Op::infix(Rule::or, Left))
            .op(Op::infix(Rule::and, Left))
            .op(Op::prefix(Rule::neg));

        Driver {
            source,
            resolver: ColumnResolver::new(schema),
            pratt,
        }
    }

    /// Run the grammar over the source; `None` means the filter matches everything
    pub fn compile(self) -> Result<Option<Fragment>, InvalidFilter> {
        let mut pairs = FilterGrammar::parse(Rule::program, self.source).map_err(|e| {
            let cause = CompileError::from_pest(e, self.source);
            let span = match &cause {
                CompileError::Syntax { span, line, col, expected_msg, .. } => {
                    self.error_at((*line, *col), expected_msg);
                    Some(*span)
                }
                other => {
                    self.error(&other.to_string());
                    None
                }
            };
            InvalidFilter::new(self.source, span, cause)
        })?;

        let program = pairs
            .next()
            .ok_or_else(|| self.reject(CompileError::internal("grammar produced no program"), None))?;

        match program.into_inner().find(|pair| pair.as_rule() == Rule::expr) {
            Some(expr) => self.expr(expr).map(Some),
            None => Ok(None),
        }
    }

    /// Report an error located in the filter text
    pub fn error_at(&self, (line, col): (usize, usize), message: &str) {
        log::error!("filter error at line {}, column {}: {}", line, col, message);
    }

    /// Report an error without a source location
    pub fn error(&self, message: &str) {
        log::error!("filter error: {}", message);
    }

    fn reject(&self, cause: CompileError, span: Option<pest::Span<'_>>) -> InvalidFilter {
        match span {
            Some(span) => self.error_at(span.to_location(), &cause.to_string()),
            None => self.error(&cause.to_string()),
        }
        InvalidFilter::new(self.source, span.map(|s| s.to_source_span()), cause)
    }

    fn expr(&self, pair: Pair<'a, Rule>) -> Result<Fragment, InvalidFilter> {
        self.pratt
            .map_primary(|primary| self.primary(primary))
            .map_infix(|lhs, op, rhs| match op.as_rule() {
                Rule::and => Ok(lhs?.and(rhs?)),
                Rule::or => Ok(lhs?.or(rhs?)),
                rule => Err(self.reject(
                    CompileError::internal(format!("unexpected infix rule: {:?}", rule)),
                    Some(op.as_span()),
                )),
            })
            .map_prefix(|op, rhs| match op.as_rule() {
                Rule::neg => rhs.map(Fragment::negate),
                rule => Err(self.reject(
                    CompileError::internal(format!("unexpected prefix rule: {:?}", rule)),
                    Some(op.as_span()),
                )),
            })
            .parse(pair.into_inner())
    }

    fn primary(&self, pair: Pair<'a, Rule>) -> Result<Fragment, InvalidFilter> {
        match pair.as_rule() {
            Rule::comparison => {
                let span = pair.as_span();
                self.comparison(pair).map_err(|e| self.reject(e, Some(span)))
            }
            Rule::expr => self.expr(pair),
            rule => Err(self.reject(
                CompileError::internal(format!("unexpected primary rule: {:?}", rule)),
                Some(pair.as_span()),
            )),
        }
    }

    fn comparison(&self, pair: Pair<'a, Rule>) -> Result<Fragment, CompileError> {
        let mut inner = pair.into_inner();

        let left = inner
            .next()
            .ok_or_else(|| CompileError::internal("comparison without a column"))?;
        let left = self.left(left)?;

        let mut next = inner
            .next()
            .ok_or_else(|| CompileError::internal("comparison without a value"))?;

        let cmp = if next.as_rule() == Rule::cmp_op {
            let cmp: CmpOp = next.as_str().parse()?;
            next = inner
                .next()
                .ok_or_else(|| CompileError::internal("comparison without a value"))?;
            Some(cmp)
        } else {
            None
        };

        let right = self.value(next)?;

        match cmp {
            Some(cmp) => parse_exp(&left, cmp, &right),
            None if right.is_subnet() => parse_exp_sub(&left, &right),
            None => parse_exp_default(&left, &right),
        }
    }

    fn left(&self, pair: Pair<'a, Rule>) -> Result<ParseValue, CompileError> {
        match pair.as_rule() {
            Rule::column => match self.resolver.resolve(pair.as_str())? {
                Resolved::Column(column) => Ok(ParseValue::Column(column)),
                Resolved::Group(group) => Ok(ParseValue::ColumnGroup(group)),
            },
            Rule::raw_column => Ok(ParseValue::RawColumn(
                self.resolver.parse_raw_column(pair.as_str()),
            )),
            Rule::bit_col_val => {
                let mut inner = pair.into_inner();
                let (column, op, number) = match (inner.next(), inner.next(), inner.next()) {
                    (Some(column), Some(op), Some(number)) => (column, op, number),
                    _ => return Err(CompileError::internal("incomplete bitwise expression")),
                };
                let column = self.left(column)?;
                let op: BitOp = op.as_str().parse()?;
                let literal = ParseValue::Number(parse_number(number.as_str())?);
                parse_bit_col_val(column, op, &literal)
            }
            rule => Err(CompileError::internal(format!(
                "unexpected column rule: {:?}",
                rule
            ))),
        }
    }

    fn value(&self, pair: Pair<'a, Rule>) -> Result<ParseValue, CompileError> {
        let text = pair.as_str();
        match pair.as_rule() {
            Rule::timestamp => parse_timestamp(text).map(ParseValue::Timestamp),
            Rule::ipv6_subnet => parse_ipv6_subnet(text).map(ParseValue::Ipv6Subnet),
            Rule::ipv6 => parse_ipv6(text).map(ParseValue::Ipv6),
            Rule::ipv4_subnet => parse_ipv4_subnet(text).map(ParseValue::Ipv4Subnet),
            Rule::ipv4 => parse_ipv4(text).map(ParseValue::Ipv4),
            Rule::number => parse_number(text).map(ParseValue::Number),
            Rule::quoted_string => {
                let inner = pair
                    .into_inner()
                    .next()
                    .ok_or_else(|| CompileError::internal("quoted string without content"))?;
                Ok(parse_string(inner.as_str()))
            }
            Rule::word => Ok(parse_marker(text)),
            rule => Err(CompileError::internal(format!(
                "unexpected value rule: {:?}",
                rule
            ))),
        }
    }
}
