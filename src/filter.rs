//! Filter controller
//!
//! A [`Filter`] is compiled once from a [`Configuration`] and is read-only
//! afterwards: [`Filter::get_filter`] hands the predicate text to the query
//! engine, [`Filter::is_valid`] evaluates the predicate tree against a row.

use crate::expr::Expr;
use crate::parser::{Driver, InvalidFilter};
use crate::predicate::Comparison;
use crate::row::Row;
use crate::schema::Configuration;

#[derive(Debug, Clone, Default)]
pub struct Filter<'c> {
    text: String,
    tree: Option<Expr<Comparison>>,
    conf: Option<&'c Configuration>,
}

impl<'c> Filter<'c> {
    /// Compile the configured filter text against the configured schema
    ///
    /// Blank filter text compiles to a filter that accepts every row; the
    /// configured time window still applies to [`Filter::get_filter`].
    pub fn new(conf: &'c Configuration) -> Result<Self, InvalidFilter> {
        if conf.filter.trim().is_empty() {
            log::debug!("empty filter, matching all rows");
            return Ok(Filter {
                conf: Some(conf),
                ..Filter::default()
            });
        }

        let compiled = Driver::new(&conf.filter, &conf.schema).compile()?;
        let (text, tree) = match compiled {
            Some(fragment) => {
                let (text, tree) = fragment.into_parts();
                (text, Some(tree))
            }
            None => (String::new(), None),
        };

        log::info!("compiled filter '{}' into '{}'", conf.filter.trim(), text);

        Ok(Filter {
            text,
            tree,
            conf: Some(conf),
        })
    }

    /// Filter without configuration: no predicate and no time window
    pub fn empty() -> Self {
        Filter::default()
    }

    /// Predicate text for the query engine, including the time window clause
    pub fn get_filter(&self) -> String {
        let window = self.conf.and_then(|conf| {
            conf.time_window.map(|window| {
                format!(
                    "{column} >= {start} AND {column} <= {end}",
                    column = conf.schema.timestamp_column,
                    start = window.start,
                    end = window.end
                )
            })
        });

        match (self.text.is_empty(), window) {
            (true, Some(window)) => window,
            (true, None) => String::new(),
            (false, Some(window)) => format!("({}) AND {}", self.text, window),
            (false, None) => self.text.clone(),
        }
    }

    /// Evaluate the predicate tree against one row
    ///
    /// Missing or ill-typed values make the affected comparison false; this
    /// never fails.
    pub fn is_valid<R: Row + ?Sized>(&self, row: &R) -> bool {
        match &self.tree {
            Some(tree) => tree.eval(&|comparison: &Comparison| comparison.matches(row)),
            None => true,
        }
    }

    /// Engine text of the user predicate without the time window
    ///
    /// Matches a superset of the rows [`Filter::is_valid`] accepts; empty when
    /// nothing in the filter can be pushed down.
    pub fn predicate_text(&self) -> &str {
        &self.text
    }

    pub fn predicate_tree(&self) -> Option<&Expr<Comparison>> {
        self.tree.as_ref()
    }

    /// True if the text handed to the query engine is weaker than the
    /// predicate, so rows it returns must still be checked with [`Filter::is_valid`]
    pub fn requires_row_check(&self) -> bool {
        self.tree
            .as_ref()
            .map_or(false, |tree| tree.any_predicate(&Comparison::needs_row_check))
    }
}
