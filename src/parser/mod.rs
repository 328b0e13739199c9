pub mod columns;
pub mod compiler;
pub mod driver;
pub mod error;
pub mod literals;
pub mod time;

pub use columns::{suggest_aliases, Column, ColumnGroup, ColumnResolver, Resolved};
pub use compiler::{Fragment, ParseValue};
pub use driver::{Driver, FilterGrammar, Rule};
pub use error::{CompileError, InvalidFilter, LiteralKind};
