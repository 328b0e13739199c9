//! Flow record filter compiler
//!
//! Compiles a user filter such as `%sa 10.0.0.0/8 and %dp > 1024` against a
//! column [`Schema`] into two equivalent forms:
//!
//! - predicate text for a push-down query engine ([`Filter::get_filter`])
//! - a predicate tree evaluated directly against rows ([`Filter::is_valid`])
//!
//! ```
//! use flowfilter::{Configuration, Filter, Schema};
//!
//! let conf = Configuration::new("%port 53 and %pr udp", Schema::builtin());
//! let filter = Filter::new(&conf).unwrap();
//! assert_eq!(filter.get_filter(), "(e0id7 == 53 OR e0id11 == 53) AND e0id4 == 17");
//! ```

pub mod expr;
pub mod filter;
pub mod parser;
pub mod predicate;
pub mod row;
pub mod schema;

pub use expr::Expr;
pub use filter::Filter;
pub use parser::{CompileError, InvalidFilter, LiteralKind};
pub use predicate::{BitOp, CmpOp, Comparison, Literal, Operand};
pub use row::{Row, Value};
pub use schema::{
    ColumnDef, ColumnKind, Configuration, GroupDef, Schema, SchemaError, Semantics, TimeWindow,
};
