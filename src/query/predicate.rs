//! Predicate AST shared by every traversal builder.
//!
//! Filters never reach SQL as text. Each hook becomes a [`Predicate`] whose
//! values are bound parameters; only column expressions chosen by the
//! builders (and identifiers validated by the schema descriptor) are
//! spliced into the statement.

use crate::filter::{FilterKind, FilterSpec};
use crate::types::{EdgeId, NodeId, ScopeTag, SqlValue};

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Numbered parameter list. Each pushed value gets its own `?N`.
#[derive(Debug, Default)]
pub struct ParamList {
    values: Vec<SqlValue>,
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` and return its placeholder.
    pub fn bind(&mut self, value: impl Into<SqlValue>) -> String {
        self.values.push(value.into());
        format!("?{}", self.values.len())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

// ---------------------------------------------------------------------------
// Predicate
// ---------------------------------------------------------------------------

/// One restriction on a traversal step.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    AllowNodes { column: String, ids: Vec<NodeId> },
    DisallowNodes { column: String, ids: Vec<NodeId> },
    AllowEdges { column: String, ids: Vec<EdgeId> },
    DisallowEdges { column: String, ids: Vec<EdgeId> },
    ScopeTag { column: String, tag: ScopeTag },
    /// `column < max` (or `<=` when inclusive).
    DepthBound { column: String, max: u32, inclusive: bool },
}

impl Predicate {
    /// Render to a boolean SQL expression, binding values into `params`.
    pub fn compile(&self, params: &mut ParamList) -> String {
        match self {
            Self::AllowNodes { column, ids } => {
                let list = bind_all(params, ids.iter().map(|id| id.to_sql()));
                // An empty allow-list admits nothing.
                list.map_or_else(|| "0".to_string(), |l| format!("{column} IN ({l})"))
            }
            Self::DisallowNodes { column, ids } => {
                let list = bind_all(params, ids.iter().map(|id| id.to_sql()));
                list.map_or_else(|| "1".to_string(), |l| format!("{column} NOT IN ({l})"))
            }
            Self::AllowEdges { column, ids } => {
                let list = bind_all(params, ids.iter().map(|id| SqlValue::Integer(*id)));
                list.map_or_else(|| "0".to_string(), |l| format!("{column} IN ({l})"))
            }
            Self::DisallowEdges { column, ids } => {
                let list = bind_all(params, ids.iter().map(|id| SqlValue::Integer(*id)));
                list.map_or_else(|| "1".to_string(), |l| format!("{column} NOT IN ({l})"))
            }
            Self::ScopeTag { column, tag } => {
                format!("{column} = {}", params.bind(*tag))
            }
            Self::DepthBound {
                column,
                max,
                inclusive,
            } => {
                let op = if *inclusive { "<=" } else { "<" };
                format!("{column} {op} {}", params.bind(*max))
            }
        }
    }

    pub fn kind(&self) -> Option<FilterKind> {
        match self {
            Self::AllowNodes { .. } => Some(FilterKind::AllowNodes),
            Self::DisallowNodes { .. } => Some(FilterKind::DisallowNodes),
            Self::AllowEdges { .. } => Some(FilterKind::AllowEdges),
            Self::DisallowEdges { .. } => Some(FilterKind::DisallowEdges),
            Self::ScopeTag { .. } => Some(FilterKind::EdgeScope),
            Self::DepthBound { .. } => None,
        }
    }
}

fn bind_all(params: &mut ParamList, values: impl Iterator<Item = SqlValue>) -> Option<String> {
    let placeholders: Vec<String> = values.map(|v| params.bind(v)).collect();
    if placeholders.is_empty() {
        None
    } else {
        Some(placeholders.join(", "))
    }
}

/// Join compiled predicates as extra `AND` terms (leading ` AND ` included).
pub fn and_all(predicates: &[Predicate], params: &mut ParamList) -> String {
    predicates
        .iter()
        .map(|p| format!("\n      AND {}", p.compile(params)))
        .collect()
}

// ---------------------------------------------------------------------------
// Hook targets
// ---------------------------------------------------------------------------

/// Column expressions the filter hooks constrain in one traversal step.
#[derive(Debug, Clone)]
pub struct HookTargets {
    /// The node a step reaches.
    pub node: String,
    /// The edge a step walks.
    pub edge: String,
    /// Scope column of that edge.
    pub scope: String,
}

impl HookTargets {
    /// Targets for a step walking edge alias `alias` and reaching
    /// `node_expr`.
    pub fn for_edge(alias: &str, node_expr: &str, scope_column: &str) -> Self {
        Self {
            node: node_expr.to_string(),
            edge: format!("{alias}.id"),
            scope: format!("{alias}.{scope_column}"),
        }
    }
}

/// Translate the hooks of `filter` into predicates for one step.
///
/// Runs the hooks in [`FilterKind::HOOK_ORDER`]. A hook that is set but not
/// in `supported` contributes nothing and is pushed onto `ignored` (once).
pub fn hook_predicates(
    filter: &FilterSpec,
    supported: &[FilterKind],
    targets: &HookTargets,
    ignored: &mut Vec<FilterKind>,
) -> Vec<Predicate> {
    let mut out = Vec::new();
    for kind in FilterKind::HOOK_ORDER {
        if !filter.is_set(kind) {
            continue;
        }
        if !supported.contains(&kind) {
            if !ignored.contains(&kind) {
                ignored.push(kind);
            }
            continue;
        }
        let predicate = match kind {
            FilterKind::NodeScope => None,
            FilterKind::EdgeScope => filter.edge_scope_tag().map(|tag| Predicate::ScopeTag {
                column: targets.scope.clone(),
                tag,
            }),
            FilterKind::DisallowNodes => filter.disallowed_nodes().map(|ids| {
                Predicate::DisallowNodes {
                    column: targets.node.clone(),
                    ids: ids.iter().copied().collect(),
                }
            }),
            FilterKind::DisallowEdges => filter.disallowed_edges().map(|ids| {
                Predicate::DisallowEdges {
                    column: targets.edge.clone(),
                    ids: ids.iter().copied().collect(),
                }
            }),
            FilterKind::AllowNodes => filter.allowed_nodes().map(|ids| Predicate::AllowNodes {
                column: targets.node.clone(),
                ids: ids.iter().copied().collect(),
            }),
            FilterKind::AllowEdges => filter.allowed_edges().map(|ids| Predicate::AllowEdges {
                column: targets.edge.clone(),
                ids: ids.iter().copied().collect(),
            }),
        };
        out.extend(predicate);
    }
    out
}
