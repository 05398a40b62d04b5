//! Core domain types for dagstore.
//!
//! Node identities, edges, traversal results, and the [`SqlValue`] wire
//! type that carries parameters and result cells between the query layer
//! and a storage adapter.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DagError, Result};

// ---------------------------------------------------------------------------
// Node identity
// ---------------------------------------------------------------------------

/// Opaque, stable node identity.
///
/// Integer ids cover both the 32-bit and 64-bit schemas; which one is in
/// force is decided by the registered [`IdKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeId {
    Int(i64),
    Uuid(Uuid),
}

impl NodeId {
    /// Fresh random UUID identity.
    pub fn new_uuid() -> Self {
        Self::Uuid(Uuid::new_v4())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Uuid(_) => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(u) => Some(*u),
            Self::Int(_) => None,
        }
    }

    pub fn to_sql(self) -> SqlValue {
        match self {
            Self::Int(n) => SqlValue::Integer(n),
            Self::Uuid(u) => SqlValue::Text(u.hyphenated().to_string()),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Uuid(u) => write!(f, "{}", u.hyphenated()),
        }
    }
}

impl From<i64> for NodeId {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for NodeId {
    fn from(n: i32) -> Self {
        Self::Int(n.into())
    }
}

impl From<Uuid> for NodeId {
    fn from(u: Uuid) -> Self {
        Self::Uuid(u)
    }
}

// ---------------------------------------------------------------------------
// IdKind
// ---------------------------------------------------------------------------

/// The storage type of node identities.
///
/// Reflected into every generated query as the cast applied to anchor
/// parameters, so that recursive CTE columns carry the same type as the
/// `nodes.id` column they are compared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Integer,
    #[default]
    BigInteger,
    Uuid,
}

impl IdKind {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "integer" | "int" | "int32" => Some(Self::Integer),
            "biginteger" | "bigint" | "int64" => Some(Self::BigInteger),
            "uuid" => Some(Self::Uuid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::BigInteger => "big_integer",
            Self::Uuid => "uuid",
        }
    }

    /// Column type used in DDL and casts.
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Integer | Self::BigInteger => "INTEGER",
            Self::Uuid => "TEXT",
        }
    }

    /// `CAST(<expr> AS <type>)` for this id kind.
    pub fn cast(&self, expr: &str) -> String {
        format!("CAST({expr} AS {})", self.sql_type())
    }

    /// Text key for `expr` whose byte order matches the order of the ids.
    ///
    /// Integer ids become a sign marker plus 19 zero-padded digits, with
    /// negatives shifted onto the non-negative range. UUIDs compare as text.
    pub fn sort_key(&self, expr: &str) -> String {
        match self {
            Self::Integer | Self::BigInteger => format!(
                "(CASE WHEN {expr} < 0 \
THEN '-' || printf('%019d', 9223372036854775807 + {expr} + 1) \
ELSE '0' || printf('%019d', {expr}) END)"
            ),
            Self::Uuid => expr.to_string(),
        }
    }

    /// Reject ids that do not belong to this schema.
    pub fn check(&self, id: NodeId) -> Result<NodeId> {
        match (self, id) {
            (Self::Integer, NodeId::Int(n)) if i32::try_from(n).is_ok() => Ok(id),
            (Self::Integer, NodeId::Int(n)) => Err(DagError::UnrecognizedGraphEntity(format!(
                "node id {n} does not fit the 32-bit integer id schema"
            ))),
            (Self::BigInteger, NodeId::Int(_)) | (Self::Uuid, NodeId::Uuid(_)) => Ok(id),
            (kind, other) => Err(DagError::UnrecognizedGraphEntity(format!(
                "node id {other} is not a {} id",
                kind.as_str()
            ))),
        }
    }

    /// Decode a result cell into a node id of this kind.
    pub fn decode(&self, value: &SqlValue) -> Result<NodeId> {
        match (self, value) {
            (Self::Integer | Self::BigInteger, SqlValue::Integer(n)) => Ok(NodeId::Int(*n)),
            (_, SqlValue::Text(s)) => self.parse(s),
            (kind, other) => Err(DagError::UnrecognizedGraphEntity(format!(
                "cannot read {other:?} as a {} node id",
                kind.as_str()
            ))),
        }
    }

    /// Parse the textual form of an id, as found inside encoded paths.
    pub fn parse(&self, s: &str) -> Result<NodeId> {
        let parsed = match self {
            Self::Integer | Self::BigInteger => s.trim().parse::<i64>().ok().map(NodeId::Int),
            Self::Uuid => Uuid::parse_str(s.trim()).ok().map(NodeId::Uuid),
        };
        parsed.ok_or_else(|| {
            DagError::UnrecognizedGraphEntity(format!("`{s}` is not a {} node id", self.as_str()))
        })
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SqlValue
// ---------------------------------------------------------------------------

/// A single bound parameter or result cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(*n as f64),
            Self::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<u32> for SqlValue {
    fn from(n: u32) -> Self {
        Self::Integer(n.into())
    }
}

impl From<f64> for SqlValue {
    fn from(r: f64) -> Self {
        Self::Real(r)
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<NodeId> for SqlValue {
    fn from(id: NodeId) -> Self {
        id.to_sql()
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

/// Surrogate edge identity. Unique per edge, unlike the (parent, child) pair.
pub type EdgeId = i64;

/// Reference to a row of the registered edge-scope relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeTag(pub i64);

impl From<ScopeTag> for SqlValue {
    fn from(tag: ScopeTag) -> Self {
        Self::Integer(tag.0)
    }
}

/// A persisted directed edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub parent: NodeId,
    pub child: NodeId,
    pub weight: Option<f64>,
    pub scope: Option<ScopeTag>,
    pub attributes: Option<serde_json::Value>,
    /// Values of extra columns registered in the schema descriptor.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub columns: BTreeMap<String, SqlValue>,
}

impl Edge {
    pub fn pair(&self) -> (NodeId, NodeId) {
        (self.parent, self.child)
    }
}

/// An edge that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewEdge {
    pub parent: Option<NodeId>,
    pub child: Option<NodeId>,
    pub weight: Option<f64>,
    pub scope: Option<ScopeTag>,
    pub attributes: Option<serde_json::Value>,
    #[serde(default)]
    pub columns: BTreeMap<String, SqlValue>,
}

impl NewEdge {
    pub fn new(parent: impl Into<NodeId>, child: impl Into<NodeId>) -> Self {
        Self {
            parent: Some(parent.into()),
            child: Some(child.into()),
            ..Self::default()
        }
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn scope(mut self, scope: ScopeTag) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn attributes(mut self, attributes: serde_json::Value) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Set an extra schema column.
    pub fn column(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        self.columns.insert(name.to_string(), value.into());
        self
    }

    /// Copy of `edge` re-pointed at a new pair, keeping every payload field.
    pub fn cloned_from(edge: &Edge, parent: NodeId, child: NodeId) -> Self {
        Self {
            parent: Some(parent),
            child: Some(child),
            weight: edge.weight,
            scope: edge.scope,
            attributes: edge.attributes.clone(),
            columns: edge.columns.clone(),
        }
    }

    /// Both endpoints, or [`DagError::MisconfiguredQuery`] when one is missing.
    pub fn endpoints(&self) -> Result<(NodeId, NodeId)> {
        match (self.parent, self.child) {
            (Some(p), Some(c)) => Ok((p, c)),
            _ => Err(DagError::MisconfiguredQuery(
                "an edge needs both a parent and a child".into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Traversal results
// ---------------------------------------------------------------------------

/// Which way a path search walks the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Parent to child.
    Downward,
    /// Child to parent.
    Upward,
}

/// An ordered path from the requested start node to the requested end node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathResult {
    pub nodes: Vec<NodeId>,
    pub direction: Direction,
}

impl PathResult {
    pub fn single(node: NodeId) -> Self {
        Self {
            nodes: vec![node],
            direction: Direction::Downward,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of edges walked.
    pub fn hops(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    pub fn start(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    pub fn end(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    /// The same nodes ordered from the root side to the leaf side.
    pub fn root_to_leaf(&self) -> Vec<NodeId> {
        match self.direction {
            Direction::Downward => self.nodes.clone(),
            Direction::Upward => self.nodes.iter().rev().copied().collect(),
        }
    }
}

/// A path paired with its cumulative edge weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedPath {
    pub path: PathResult,
    pub total_weight: f64,
}

impl WeightedPath {
    pub fn empty() -> Self {
        Self {
            path: PathResult {
                nodes: Vec::new(),
                direction: Direction::Downward,
            },
            total_weight: 0.0,
        }
    }
}

/// A node annotated with its depth relative to a traversal anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeDepth {
    pub id: NodeId,
    pub depth: u32,
}

/// Nested ancestor or descendant structure rooted at one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn leaf(id: NodeId) -> Self {
        Self {
            id,
            children: Vec::new(),
        }
    }

    /// Total node occurrences in the tree, including repeats under diamonds.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeNode::size).sum::<usize>()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("integer", Some(IdKind::Integer) ; "integer")]
    #[test_case("INT32", Some(IdKind::Integer) ; "int32 upper")]
    #[test_case("big_integer", Some(IdKind::BigInteger) ; "big integer snake")]
    #[test_case("bigint", Some(IdKind::BigInteger) ; "bigint")]
    #[test_case(" UUID ", Some(IdKind::Uuid) ; "uuid padded")]
    #[test_case("float", None ; "unknown")]
    fn id_kind_from_str_loose(input: &str, expected: Option<IdKind>) {
        assert_eq!(IdKind::from_str_loose(input), expected);
    }

    #[test]
    fn id_kind_roundtrips_through_as_str() {
        for kind in [IdKind::Integer, IdKind::BigInteger, IdKind::Uuid] {
            assert_eq!(IdKind::from_str_loose(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn cast_reflects_the_id_type() {
        assert_eq!(IdKind::BigInteger.cast("?1"), "CAST(?1 AS INTEGER)");
        assert_eq!(IdKind::Uuid.cast("?1"), "CAST(?1 AS TEXT)");
    }

    #[test]
    fn sort_keys_order_like_the_ids() {
        assert_eq!(IdKind::Uuid.sort_key("n.id"), "n.id");

        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let sql = format!("SELECT {}", IdKind::BigInteger.sort_key("?1"));
        let ids = [i64::MIN, -10, -9, -1, 0, 9, 10, 11, i64::MAX];
        let keys: Vec<String> = ids
            .iter()
            .map(|id| conn.query_row(&sql, [id], |row| row.get(0)).unwrap())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(keys.iter().all(|k| k.len() == 20));
    }

    #[test]
    fn integer_kind_rejects_ids_beyond_32_bits() {
        assert!(IdKind::Integer.check(NodeId::Int(12)).is_ok());
        let err = IdKind::Integer.check(NodeId::Int(i64::from(i32::MAX) + 1));
        assert!(matches!(err, Err(DagError::UnrecognizedGraphEntity(_))));
        assert!(IdKind::BigInteger.check(NodeId::Int(i64::MAX)).is_ok());
    }

    #[test]
    fn kinds_reject_foreign_ids() {
        let uuid = NodeId::new_uuid();
        assert!(IdKind::BigInteger.check(uuid).is_err());
        assert!(IdKind::Uuid.check(NodeId::Int(1)).is_err());
        assert!(IdKind::Uuid.check(uuid).is_ok());
    }

    #[test]
    fn decode_accepts_integer_and_text_cells() {
        assert_eq!(
            IdKind::BigInteger.decode(&SqlValue::Integer(7)).unwrap(),
            NodeId::Int(7)
        );
        assert_eq!(
            IdKind::BigInteger.decode(&SqlValue::Text("7".into())).unwrap(),
            NodeId::Int(7)
        );
        let uuid = NodeId::new_uuid();
        assert_eq!(IdKind::Uuid.decode(&uuid.to_sql()).unwrap(), uuid);
        assert!(IdKind::BigInteger.decode(&SqlValue::Null).is_err());
    }

    #[test]
    fn upward_paths_flip_for_root_to_leaf_reading() {
        let path = PathResult {
            nodes: vec![NodeId::Int(3), NodeId::Int(2), NodeId::Int(1)],
            direction: Direction::Upward,
        };
        assert_eq!(path.hops(), 2);
        assert_eq!(path.start(), Some(NodeId::Int(3)));
        assert_eq!(
            path.root_to_leaf(),
            vec![NodeId::Int(1), NodeId::Int(2), NodeId::Int(3)]
        );
    }

    #[test]
    fn new_edge_without_child_is_misconfigured() {
        let edge = NewEdge {
            parent: Some(NodeId::Int(1)),
            ..NewEdge::default()
        };
        assert!(matches!(
            edge.endpoints(),
            Err(DagError::MisconfiguredQuery(_))
        ));
    }

    #[test]
    fn node_id_serializes_untagged() {
        assert_eq!(serde_json::to_string(&NodeId::Int(5)).unwrap(), "5");
        let back: NodeId = serde_json::from_str("5").unwrap();
        assert_eq!(back, NodeId::Int(5));
    }
}
