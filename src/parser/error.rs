use std::fmt;

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use super::driver::Rule;

/// Kind of literal a [`CompileError::Format`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Number,
    Ipv4,
    Ipv4Subnet,
    Ipv6,
    Ipv6Subnet,
    Timestamp,
    Flags,
    Url,
}

impl fmt::Display for LiteralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LiteralKind::Number => "number",
            LiteralKind::Ipv4 => "IPv4 address",
            LiteralKind::Ipv4Subnet => "IPv4 subnet",
            LiteralKind::Ipv6 => "IPv6 address",
            LiteralKind::Ipv6Subnet => "IPv6 subnet",
            LiteralKind::Timestamp => "timestamp",
            LiteralKind::Flags => "TCP flags",
            LiteralKind::Url => "URL",
        };
        f.write_str(name)
    }
}

/// Everything that can go wrong while compiling a single filter
#[derive(Debug, Clone, PartialEq, Diagnostic, Error)]
pub enum CompileError {
    #[error("Syntax error at line {line}, column {col}: {expected_msg}")]
    #[diagnostic(code(flowfilter::syntax))]
    Syntax {
        #[source_code]
        src: String,
        #[label("{expected_msg}")]
        span: SourceSpan,
        #[help]
        help: Option<String>,
        expected_msg: String,
        line: usize,
        col: usize,
    },

    #[error("Malformed {kind} '{text}': {reason}")]
    #[diagnostic(code(flowfilter::format))]
    Format {
        kind: LiteralKind,
        text: String,
        reason: String,
    },

    #[error("Unknown column: '{alias}'")]
    #[diagnostic(code(flowfilter::unknown_column))]
    UnknownColumn {
        alias: String,
        #[help]
        suggestions: Option<String>,
    },

    #[error("Unknown column group: '{alias}'")]
    #[diagnostic(code(flowfilter::unknown_group))]
    UnknownGroup {
        alias: String,
        #[help]
        suggestions: Option<String>,
    },

    #[error("Unknown protocol: '{name}'")]
    #[diagnostic(
        code(flowfilter::unknown_protocol),
        help("Use a protocol number or one of: tcp, udp, icmp, icmpv6, gre, esp, ah, sctp, ...")
    )]
    UnknownProtocol { name: String },

    #[error("Cannot compare {column} with {literal}: {reason}")]
    #[diagnostic(code(flowfilter::type_mismatch))]
    TypeMismatch {
        column: String,
        literal: String,
        reason: String,
    },

    #[error("Internal compiler error: {message}")]
    #[diagnostic(code(flowfilter::internal))]
    Internal { message: String },
}

impl CompileError {
    pub(crate) fn format(kind: LiteralKind, text: &str, reason: impl Into<String>) -> Self {
        CompileError::Format {
            kind,
            text: text.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(
        column: impl Into<String>,
        literal: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CompileError::TypeMismatch {
            column: column.into(),
            literal: literal.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        CompileError::Internal {
            message: message.into(),
        }
    }

    /// Line and column for syntax errors
    pub fn location(&self) -> Option<(usize, usize)> {
        match self {
            CompileError::Syntax { line, col, .. } => Some((*line, *col)),
            _ => None,
        }
    }

    /// Build a syntax error from a pest failure, keeping the location for reporting
    pub fn from_pest(pest_err: pest::error::Error<Rule>, src: &str) -> Self {
        use pest::error::{ErrorVariant, InputLocation, LineColLocation};

        // miette needs a non-zero width to draw the arrow
        let span: SourceSpan = match pest_err.location {
            InputLocation::Pos(pos) if pos < src.len() => (pos, 1).into(),
            InputLocation::Pos(pos) if pos > 0 => (pos - 1, 1).into(),
            InputLocation::Pos(_) => (0, 0).into(),
            InputLocation::Span((start, end)) => (start, end.saturating_sub(start).max(1)).into(),
        };

        let (line, col) = match pest_err.line_col {
            LineColLocation::Pos(pos) => pos,
            LineColLocation::Span(start, _) => start,
        };

        let found_eoi = match pest_err.location {
            InputLocation::Pos(p) => p >= src.len(),
            InputLocation::Span((_, end)) => end >= src.len(),
        };

        let (expected_msg, help) = match &pest_err.variant {
            ErrorVariant::ParsingError { positives, .. } => {
                let expected_msg = match positives.as_slice() {
                    [] => "Unexpected input".to_string(),
                    [single] => format!("Expected {}", rule_to_friendly_name(single)),
                    many => {
                        let mut names: Vec<&str> = many.iter().map(rule_to_friendly_name).collect();
                        names.dedup();
                        if names.len() <= 3 {
                            format!("Expected one of: {}", names.join(", "))
                        } else {
                            format!("Expected one of: {}, ...", names[..3].join(", "))
                        }
                    }
                };
                (expected_msg, generate_help_text(positives, found_eoi))
            }
            ErrorVariant::CustomError { message } => (message.clone(), None),
        };

        CompileError::Syntax {
            src: src.to_string(),
            span,
            help,
            expected_msg,
            line,
            col,
        }
    }
}

fn rule_to_friendly_name(rule: &Rule) -> &'static str {
    match rule {
        Rule::program | Rule::expr => "expression",
        Rule::comparison => "comparison",
        Rule::and => "and",
        Rule::or => "or",
        Rule::neg => "not",
        Rule::column => "column (%alias)",
        Rule::raw_column => "raw column (e<N>id<M>)",
        Rule::bit_col_val => "bitwise expression",
        Rule::cmp_op => "comparison operator",
        Rule::bit_op => "bitwise operator",
        Rule::timestamp => "timestamp",
        Rule::ipv4 | Rule::ipv6 => "address",
        Rule::ipv4_subnet | Rule::ipv6_subnet => "subnet",
        Rule::number => "number",
        Rule::quoted_string | Rule::string_inner => "quoted string",
        Rule::word => "value",
        Rule::keyword => "keyword",
        Rule::EOI => "end of filter",
        _ => "token",
    }
}

fn generate_help_text(positives: &[Rule], found_eoi: bool) -> Option<String> {
    if positives.contains(&Rule::number) || positives.contains(&Rule::word) {
        if found_eoi {
            return Some("Add a value after the column, like: %dp 80".to_string());
        }
        return Some("Expected a value (number, address, timestamp, string or name)".to_string());
    }

    if found_eoi {
        return Some("Filter is incomplete. Add a comparison after the operator.".to_string());
    }

    if positives.contains(&Rule::EOI) {
        return Some("Unexpected input. Check for unbalanced parentheses or quotes.".to_string());
    }

    None
}

/// Returned when a filter cannot be constructed
///
/// Wraps the [`CompileError`] together with the filter text so the offending
/// token can be pointed at.
#[derive(Debug, Diagnostic, Error)]
#[error("Invalid filter: {cause}")]
#[diagnostic(code(flowfilter::invalid_filter))]
pub struct InvalidFilter {
    #[source_code]
    pub src: String,
    #[label("rejected here")]
    pub span: Option<SourceSpan>,
    #[source]
    pub cause: CompileError,
}

impl InvalidFilter {
    pub fn new(src: impl Into<String>, span: Option<SourceSpan>, cause: CompileError) -> Self {
        InvalidFilter {
            src: src.into(),
            span,
            cause,
        }
    }

    pub fn cause(&self) -> &CompileError {
        &self.cause
    }
}

pub trait SpanExt {
    fn to_location(&self) -> (usize, usize);
    fn to_source_span(&self) -> SourceSpan;
}

impl SpanExt for pest::Span<'_> {
    #[inline]
    fn to_location(&self) -> (usize, usize) {
        self.start_pos().line_col()
    }

    #[inline]
    fn to_source_span(&self) -> SourceSpan {
        (self.start(), self.end() - self.start()).into()
    }
}
