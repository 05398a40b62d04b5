//! Statically registered description of the graph's tables.
//!
//! A [`GraphSchema`] is built once, before the database is opened, and
//! handed to the store. It fixes the node id type, the edge columns that
//! traversals may read as weights, and the relation that edge scope tags
//! point at. Nothing here is discovered by inspecting the database at query
//! time.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{DagError, Result};
use crate::types::IdKind;

/// Edge columns every schema has. Extra columns may not reuse these names.
pub const CORE_EDGE_COLUMNS: &[&str] = &["id", "parent_id", "child_id", "weight", "attributes"];

// ---------------------------------------------------------------------------
// Column descriptors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Real,
    Integer,
    Text,
}

impl ColumnKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Real | Self::Integer)
    }

    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Real => "REAL",
            Self::Integer => "INTEGER",
            Self::Text => "TEXT",
        }
    }
}

/// An extra, caller-declared edge column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeColumn {
    pub name: String,
    pub kind: ColumnKind,
}

/// The relation edge scope tags reference: `edges.<column>` points at
/// `<table>.id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeRelation {
    pub table: String,
    pub column: String,
}

impl Default for ScopeRelation {
    fn default() -> Self {
        Self {
            table: "edge_scopes".into(),
            column: "scope_id".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// GraphSchema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphSchema {
    id_kind: IdKind,
    extra_columns: Vec<EdgeColumn>,
    scope: ScopeRelation,
}

impl Default for GraphSchema {
    fn default() -> Self {
        Self {
            id_kind: IdKind::default(),
            extra_columns: Vec::new(),
            scope: ScopeRelation::default(),
        }
    }
}

impl GraphSchema {
    pub fn builder() -> GraphSchemaBuilder {
        GraphSchemaBuilder::default()
    }

    /// Default tables with the given id kind.
    pub fn with_id_kind(id_kind: IdKind) -> Self {
        Self {
            id_kind,
            ..Self::default()
        }
    }

    pub fn id_kind(&self) -> IdKind {
        self.id_kind
    }

    pub fn scope(&self) -> &ScopeRelation {
        &self.scope
    }

    pub fn extra_columns(&self) -> &[EdgeColumn] {
        &self.extra_columns
    }

    /// Kind of any edge column, core or extra.
    pub fn column_kind(&self, name: &str) -> Option<ColumnKind> {
        match name {
            "id" => Some(ColumnKind::Integer),
            "parent_id" | "child_id" => Some(match self.id_kind {
                IdKind::Uuid => ColumnKind::Text,
                _ => ColumnKind::Integer,
            }),
            "weight" => Some(ColumnKind::Real),
            "attributes" => Some(ColumnKind::Text),
            _ if name == self.scope.column => Some(ColumnKind::Integer),
            _ => self
                .extra_columns
                .iter()
                .find(|c| c.name == name)
                .map(|c| c.kind),
        }
    }

    /// Check that `field` can be summed as an edge weight.
    ///
    /// Returns the column name to splice into the query. Only names that
    /// pass this check ever reach generated SQL.
    pub fn validate_weight_field<'a>(&self, field: &'a str) -> Result<&'a str> {
        let invalid = |reason: &str| DagError::InvalidWeightField {
            field: field.to_string(),
            reason: reason.to_string(),
        };
        if matches!(field, "id" | "parent_id" | "child_id") || field == self.scope.column {
            return Err(invalid("it is a structural column, not a weight"));
        }
        match self.column_kind(field) {
            None => Err(invalid("it does not exist on the edge schema")),
            Some(kind) if !kind.is_numeric() => Err(invalid("it is not numeric")),
            Some(_) => Ok(field),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct GraphSchemaBuilder {
    id_kind: IdKind,
    extra_columns: Vec<EdgeColumn>,
    scope: Option<ScopeRelation>,
}

impl GraphSchemaBuilder {
    pub fn id_kind(mut self, kind: IdKind) -> Self {
        self.id_kind = kind;
        self
    }

    pub fn numeric_column(self, name: &str) -> Self {
        self.column(name, ColumnKind::Real)
    }

    pub fn integer_column(self, name: &str) -> Self {
        self.column(name, ColumnKind::Integer)
    }

    pub fn text_column(self, name: &str) -> Self {
        self.column(name, ColumnKind::Text)
    }

    pub fn column(mut self, name: &str, kind: ColumnKind) -> Self {
        self.extra_columns.push(EdgeColumn {
            name: name.to_string(),
            kind,
        });
        self
    }

    pub fn scope_relation(mut self, table: &str, column: &str) -> Self {
        self.scope = Some(ScopeRelation {
            table: table.to_string(),
            column: column.to_string(),
        });
        self
    }

    /// Validate every identifier and freeze the descriptor.
    pub fn build(self) -> Result<GraphSchema> {
        let scope = self.scope.unwrap_or_default();
        check_identifier(&scope.table)?;
        check_identifier(&scope.column)?;
        if matches!(scope.table.as_str(), "nodes" | "edges") {
            return Err(DagError::Config(format!(
                "scope table `{}` collides with a graph table",
                scope.table
            )));
        }
        if CORE_EDGE_COLUMNS.contains(&scope.column.as_str()) {
            return Err(DagError::Config(format!(
                "scope column `{}` collides with a core edge column",
                scope.column
            )));
        }

        let mut seen: Vec<&str> = Vec::new();
        for column in &self.extra_columns {
            check_identifier(&column.name)?;
            let name = column.name.as_str();
            if CORE_EDGE_COLUMNS.contains(&name) || name == scope.column || seen.contains(&name) {
                return Err(DagError::Config(format!(
                    "edge column `{name}` is already declared"
                )));
            }
            seen.push(name);
        }

        Ok(GraphSchema {
            id_kind: self.id_kind,
            extra_columns: self.extra_columns,
            scope,
        })
    }
}

fn identifier_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").ok())
        .as_ref()
}

fn check_identifier(name: &str) -> Result<()> {
    if identifier_pattern().is_some_and(|re| re.is_match(name)) {
        Ok(())
    } else {
        Err(DagError::Config(format!("`{name}` is not a valid SQL identifier")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn default_schema_has_numeric_weight() {
        let schema = GraphSchema::default();
        assert_eq!(schema.validate_weight_field("weight").unwrap(), "weight");
        assert_eq!(schema.scope().column, "scope_id");
        assert_eq!(schema.id_kind(), IdKind::BigInteger);
    }

    #[test_case("missing", "does not exist" ; "absent column")]
    #[test_case("attributes", "not numeric" ; "text column")]
    #[test_case("parent_id", "structural" ; "endpoint column")]
    #[test_case("scope_id", "structural" ; "scope column")]
    fn weight_field_rejections(field: &str, reason: &str) {
        let err = GraphSchema::default().validate_weight_field(field).unwrap_err();
        match err {
            DagError::InvalidWeightField { field: f, reason: r } => {
                assert_eq!(f, field);
                assert!(r.contains(reason), "unexpected reason: {r}");
            }
            other => panic!("expected InvalidWeightField, got {other:?}"),
        }
    }

    #[test]
    fn extra_columns_are_registered_with_their_kind() {
        let schema = GraphSchema::builder()
            .numeric_column("cost")
            .integer_column("hops")
            .text_column("label")
            .build()
            .unwrap();
        assert_eq!(schema.validate_weight_field("cost").unwrap(), "cost");
        assert_eq!(schema.validate_weight_field("hops").unwrap(), "hops");
        assert!(schema.validate_weight_field("label").is_err());
    }

    #[test_case("cost; DROP TABLE edges" ; "injection attempt")]
    #[test_case("1cost" ; "leading digit")]
    #[test_case("" ; "empty")]
    fn invalid_identifiers_are_rejected(name: &str) {
        let result = GraphSchema::builder().numeric_column(name).build();
        assert!(matches!(result, Err(DagError::Config(_))));
    }

    #[test]
    fn duplicate_and_core_names_are_rejected() {
        assert!(GraphSchema::builder()
            .numeric_column("cost")
            .numeric_column("cost")
            .build()
            .is_err());
        assert!(GraphSchema::builder().numeric_column("weight").build().is_err());
        assert!(GraphSchema::builder()
            .scope_relation("edges", "kind_id")
            .build()
            .is_err());
    }

    #[test]
    fn custom_scope_relation_is_structural() {
        let schema = GraphSchema::builder()
            .scope_relation("edge_sets", "edge_set_id")
            .build()
            .unwrap();
        assert_eq!(schema.column_kind("edge_set_id"), Some(ColumnKind::Integer));
        assert!(schema.validate_weight_field("edge_set_id").is_err());
    }

    #[test]
    fn uuid_endpoints_are_text() {
        let schema = GraphSchema::with_id_kind(IdKind::Uuid);
        assert_eq!(schema.column_kind("parent_id"), Some(ColumnKind::Text));
    }
}
