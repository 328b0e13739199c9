//! Column schema and filter configuration
//!
//! The schema maps user-facing aliases (`%sa`, `%dp`, ...) to the underlying
//! storage columns and declares column groups. It is normally loaded from a
//! JSON document; [`Schema::builtin`] provides the standard IPFIX flow layout.

use std::fs;
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value domain of a column; decides which literals it can be compared with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    #[default]
    Number,
    Ipv4,
    /// Stored as two 64-bit parts, high half first
    Ipv6,
    Timestamp,
    String,
}

/// Interpretation applied to bare words compared against a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Semantics {
    Protocol,
    Flags,
    Url,
    Dns,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ColumnDef {
    pub aliases: Vec<String>,
    pub parts: Vec<String>,
    #[serde(default)]
    pub kind: ColumnKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantics: Option<Semantics>,
    /// Aggregation function used when the column appears in an aggregate group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<String>,
}

impl ColumnDef {
    pub fn new<A: Into<String>, P: Into<String>>(
        aliases: impl IntoIterator<Item = A>,
        parts: impl IntoIterator<Item = P>,
        kind: ColumnKind,
    ) -> Self {
        ColumnDef {
            aliases: aliases.into_iter().map(Into::into).collect(),
            parts: parts.into_iter().map(Into::into).collect(),
            kind,
            semantics: None,
            aggregation: None,
        }
    }

    pub fn with_semantics(mut self, semantics: Semantics) -> Self {
        self.semantics = Some(semantics);
        self
    }

    pub fn with_aggregation(mut self, function: impl Into<String>) -> Self {
        self.aggregation = Some(function.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GroupDef {
    pub alias: String,
    pub members: Vec<String>,
    #[serde(default)]
    pub aggregate: bool,
}

impl GroupDef {
    pub fn new<M: Into<String>>(
        alias: impl Into<String>,
        members: impl IntoIterator<Item = M>,
        aggregate: bool,
    ) -> Self {
        GroupDef {
            alias: alias.into(),
            members: members.into_iter().map(Into::into).collect(),
            aggregate,
        }
    }
}

fn default_timestamp_column() -> String {
    "e0id150".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Schema {
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub groups: Vec<GroupDef>,
    /// Storage column the configured time window is applied to
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Failed to read schema: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse schema: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid schema: {0}")]
    Invalid(String),
}

impl Default for Schema {
    fn default() -> Self {
        Schema {
            columns: Vec::new(),
            groups: Vec::new(),
            timestamp_column: default_timestamp_column(),
        }
    }
}

impl Schema {
    pub fn new(columns: Vec<ColumnDef>, groups: Vec<GroupDef>) -> Result<Self, SchemaError> {
        let schema = Schema {
            columns,
            groups,
            timestamp_column: default_timestamp_column(),
        };
        schema.validate()?;
        Ok(schema)
    }

    pub fn with_timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.timestamp_column = column.into();
        self
    }

    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schema: Schema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Find the column registered under `alias`
    pub fn column(&self, alias: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.aliases.iter().any(|a| a == alias))
    }

    /// Find the group registered under `alias`
    pub fn group(&self, alias: &str) -> Option<&GroupDef> {
        self.groups.iter().find(|g| g.alias == alias)
    }

    /// Every alias the schema knows, columns first
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .flat_map(|c| c.aliases.iter().map(String::as_str))
            .chain(self.groups.iter().map(|g| g.alias.as_str()))
    }

    /// Check the structural rules the compiler relies on
    pub fn validate(&self) -> Result<(), SchemaError> {
        let duplicates = self.aliases().duplicates().join(", ");
        if !duplicates.is_empty() {
            return Err(SchemaError::Invalid(format!(
                "aliases registered more than once: {duplicates}"
            )));
        }

        for column in &self.columns {
            let name = column
                .aliases
                .first()
                .ok_or_else(|| SchemaError::Invalid("column without alias".to_string()))?;

            if column.parts.is_empty() {
                return Err(SchemaError::Invalid(format!("column {name} has no parts")));
            }
            if column.kind == ColumnKind::Ipv6 && column.parts.len() != 2 {
                return Err(SchemaError::Invalid(format!(
                    "IPv6 column {name} must have exactly two parts, found {}",
                    column.parts.len()
                )));
            }
        }

        for group in &self.groups {
            if group.members.is_empty() {
                return Err(SchemaError::Invalid(format!(
                    "group {} has no members",
                    group.alias
                )));
            }
            if let Some(missing) = group.members.iter().find(|m| self.column(m).is_none()) {
                return Err(SchemaError::Invalid(format!(
                    "group {} refers to unknown column {missing}",
                    group.alias
                )));
            }
        }

        Ok(())
    }

    /// IPFIX flow columns as laid out by the flow collector's storage plugin
    pub fn builtin() -> Self {
        use ColumnKind::{Ipv4, Ipv6, Number, Timestamp};

        let columns = vec![
            ColumnDef::new(["%ts"], ["e0id150"], Timestamp),
            ColumnDef::new(["%te"], ["e0id151"], Timestamp),
            ColumnDef::new(["%sa4", "%srcip4"], ["e0id8"], Ipv4),
            ColumnDef::new(["%da4", "%dstip4"], ["e0id12"], Ipv4),
            ColumnDef::new(["%sa6", "%srcip6"], ["e0id27p0", "e0id27p1"], Ipv6),
            ColumnDef::new(["%da6", "%dstip6"], ["e0id28p0", "e0id28p1"], Ipv6),
            ColumnDef::new(["%sp", "%srcport"], ["e0id7"], Number),
            ColumnDef::new(["%dp", "%dstport"], ["e0id11"], Number),
            ColumnDef::new(["%pr", "%proto"], ["e0id4"], Number).with_semantics(Semantics::Protocol),
            ColumnDef::new(["%flg", "%tcpflags"], ["e0id6"], Number)
                .with_semantics(Semantics::Flags),
            ColumnDef::new(["%tos"], ["e0id5"], Number),
            ColumnDef::new(["%pkt", "%packets"], ["e0id2"], Number).with_aggregation("sum"),
            ColumnDef::new(["%byt", "%bytes"], ["e0id1"], Number).with_aggregation("sum"),
            ColumnDef::new(["%fl", "%flows"], ["e0id3"], Number).with_aggregation("sum"),
            ColumnDef::new(["%in"], ["e0id10"], Number),
            ColumnDef::new(["%out"], ["e0id14"], Number),
            ColumnDef::new(["%sas"], ["e0id16"], Number),
            ColumnDef::new(["%das"], ["e0id17"], Number),
            ColumnDef::new(["%url"], ["e39499id20"], ColumnKind::String).with_semantics(Semantics::Url),
            ColumnDef::new(["%host"], ["e39499id21"], ColumnKind::String),
            ColumnDef::new(["%dns"], ["e8057id4"], ColumnKind::String).with_semantics(Semantics::Dns),
        ];

        let groups = vec![
            GroupDef::new("%sa", ["%sa4", "%sa6"], false),
            GroupDef::new("%da", ["%da4", "%da6"], false),
            GroupDef::new("%ip", ["%sa4", "%da4", "%sa6", "%da6"], false),
            GroupDef::new("%port", ["%sp", "%dp"], false),
            GroupDef::new("%as", ["%sas", "%das"], false),
            GroupDef::new("%if", ["%in", "%out"], false),
            GroupDef::new("%volume", ["%pkt", "%byt"], true),
        ];

        Schema {
            columns,
            groups,
            timestamp_column: default_timestamp_column(),
        }
    }
}

/// Closed interval of epoch seconds a query is restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Self {
        TimeWindow { start, end }
    }
}

/// Everything a [`crate::Filter`] is built from
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Configuration {
    #[serde(default)]
    pub filter: String,
    pub schema: Schema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,
}

impl Configuration {
    pub fn new(filter: impl Into<String>, schema: Schema) -> Self {
        Configuration {
            filter: filter.into(),
            schema,
            time_window: None,
        }
    }

    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_schema_is_valid() {
        let schema = Schema::builtin();
        assert!(schema.validate().is_ok());
        assert!(schema.column("%srcip4").is_some());
        assert!(schema.group("%port").is_some());
        assert!(schema.aliases().any(|a| a == "%volume"));
    }

    #[test]
    fn test_ipv6_needs_two_parts() {
        let result = Schema::new(
            vec![ColumnDef::new(["%sa6"], ["e0id27"], ColumnKind::Ipv6)],
            vec![],
        );
        assert!(matches!(result, Err(SchemaError::Invalid(_))));
    }

    #[test]
    fn test_aliases_are_unique() {
        let result = Schema::new(
            vec![
                ColumnDef::new(["%sp"], ["e0id7"], ColumnKind::Number),
                ColumnDef::new(["%port"], ["e0id11"], ColumnKind::Number),
            ],
            vec![GroupDef::new("%port", ["%sp"], false)],
        );
        assert!(matches!(result, Err(SchemaError::Invalid(msg)) if msg.contains("%port")));
    }

    #[test]
    fn test_group_members_must_exist() {
        let result = Schema::new(
            vec![ColumnDef::new(["%sp"], ["e0id7"], ColumnKind::Number)],
            vec![GroupDef::new("%port", ["%sp", "%dp"], false)],
        );
        assert!(matches!(result, Err(SchemaError::Invalid(msg)) if msg.contains("%dp")));
    }
}
