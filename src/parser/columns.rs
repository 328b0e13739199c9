//! Column and column-group resolution
//!
//! Turns `%alias` tokens into the storage columns registered in the schema.
//! Groups expand into their member columns in declaration order.

use crate::schema::{ColumnKind, Schema, Semantics};

use super::error::CompileError;

/// A resolved column: one or more storage parts sharing an alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub alias: String,
    /// Non-empty; IPv6 columns hold exactly the high and low halves
    pub parts: Vec<String>,
    /// `None` for raw columns, which bypass the schema and accept any literal
    pub kind: Option<ColumnKind>,
    pub semantics: Option<Semantics>,
    pub aggregation: Option<String>,
}

impl Column {
    /// Aggregation applied when this column is wrapped by an aggregate group
    pub fn aggregation_function(&self) -> &str {
        self.aggregation.as_deref().unwrap_or("sum")
    }
}

/// A schema group whose comparisons are broadcast over every member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnGroup {
    pub alias: String,
    pub members: Vec<Column>,
    pub aggregate: bool,
}

/// Column lookups against one schema
#[derive(Debug, Clone, Copy)]
pub struct ColumnResolver<'s> {
    schema: &'s Schema,
}

/// What a `%alias` token resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Column(Column),
    Group(ColumnGroup),
}

impl<'s> ColumnResolver<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        ColumnResolver { schema }
    }

    /// Resolve an alias that may name either a column or a group
    pub fn resolve(&self, alias: &str) -> Result<Resolved, CompileError> {
        if self.schema.column(alias).is_some() {
            return self.parse_column(alias).map(Resolved::Column);
        }

        match self.schema.group(alias) {
            Some(group) => self
                .parse_column_group(alias, group.aggregate)
                .map(Resolved::Group),
            None => Err(CompileError::UnknownColumn {
                alias: alias.to_string(),
                suggestions: self.suggestions_for(alias),
            }),
        }
    }

    pub fn parse_column(&self, alias: &str) -> Result<Column, CompileError> {
        let def = self
            .schema
            .column(alias)
            .ok_or_else(|| CompileError::UnknownColumn {
                alias: alias.to_string(),
                suggestions: self.suggestions_for(alias),
            })?;

        log::debug!("column {} resolved to {:?}", alias, def.parts);

        Ok(Column {
            alias: alias.to_string(),
            parts: def.parts.clone(),
            kind: Some(def.kind),
            semantics: def.semantics,
            aggregation: def.aggregation.clone(),
        })
    }

    pub fn parse_column_group(
        &self,
        alias: &str,
        aggregate: bool,
    ) -> Result<ColumnGroup, CompileError> {
        let def = self
            .schema
            .group(alias)
            .ok_or_else(|| CompileError::UnknownGroup {
                alias: alias.to_string(),
                suggestions: self.suggestions_for(alias),
            })?;

        let members = def
            .members
            .iter()
            .map(|member| self.parse_column(member))
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!(
            "group {} expanded to {} members (aggregate: {})",
            alias,
            members.len(),
            aggregate
        );

        Ok(ColumnGroup {
            alias: alias.to_string(),
            members,
            aggregate,
        })
    }

    /// Storage identifier used verbatim, without consulting the schema
    pub fn parse_raw_column(&self, name: &str) -> Column {
        Column {
            alias: name.to_string(),
            parts: vec![name.to_string()],
            kind: None,
            semantics: None,
            aggregation: None,
        }
    }

    fn suggestions_for(&self, word: &str) -> Option<String> {
        let suggestions = suggest_aliases(self.schema, word);
        if suggestions.is_empty() {
            None
        } else {
            Some(format!("Did you mean: {}?", suggestions.join(", ")))
        }
    }
}

/// Registered aliases within edit distance 2 of `word`
pub fn suggest_aliases(schema: &Schema, word: &str) -> Vec<String> {
    schema
        .aliases()
        .filter(|alias| levenshtein_distance(word, alias) <= 2)
        .map(str::to_string)
        .collect()
}

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row = vec![0; b_len + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;

        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (curr_row[j] + 1) // insertion
                .min(prev_row[j + 1] + 1) // deletion
                .min(prev_row[j] + cost); // substitution
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}
