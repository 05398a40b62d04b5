//! Error type shared by every layer of dagstore.

use thiserror::Error;

use crate::types::NodeId;

/// Everything that can go wrong while querying or mutating a graph.
///
/// The graph-level variants are local and synchronous. A caller that wants to
/// force an edge through after a guard rejection disables that guard in
/// [`GuardOptions`](crate::guard::GuardOptions) and retries.
#[derive(Debug, Error)]
pub enum DagError {
    /// No path exists between the two nodes under the requested directionality.
    #[error("node {to} is not reachable from node {from}")]
    NodeNotReachable { from: NodeId, to: NodeId },

    #[error("The object is an ancestor. ({child} is already above {parent})")]
    CyclicEdgeRejected { parent: NodeId, child: NodeId },

    #[error("An edge already exists between these nodes. ({parent} -> {child})")]
    DuplicateEdgeRejected { parent: NodeId, child: NodeId },

    #[error("The child is already reachable from the parent. ({parent} -> {child})")]
    RedundantEdgeRejected { parent: NodeId, child: NodeId },

    /// The requested weight attribute is absent or not numeric.
    #[error("invalid weight field `{field}`: {reason}")]
    InvalidWeightField { field: String, reason: String },

    /// A query was built without the anchors it needs.
    #[error("misconfigured query: {0}")]
    MisconfiguredQuery(String),

    /// An id or row does not match the registered graph schema.
    #[error("unrecognized graph entity: {0}")]
    UnrecognizedGraphEntity(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DagError {
    /// True for the three rejections raised by the mutation guard.
    pub fn is_guard_rejection(&self) -> bool {
        matches!(
            self,
            Self::CyclicEdgeRejected { .. }
                | Self::DuplicateEdgeRejected { .. }
                | Self::RedundantEdgeRejected { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_messages_keep_their_wording() {
        let err = DagError::CyclicEdgeRejected {
            parent: NodeId::Int(2),
            child: NodeId::Int(1),
        };
        assert!(err.to_string().starts_with("The object is an ancestor."));
        assert!(err.is_guard_rejection());

        let err = DagError::DuplicateEdgeRejected {
            parent: NodeId::Int(1),
            child: NodeId::Int(2),
        };
        assert!(err
            .to_string()
            .starts_with("An edge already exists between these nodes."));
    }

    #[test]
    fn database_errors_convert_with_question_mark() {
        fn fails() -> Result<()> {
            Err(rusqlite::Error::QueryReturnedNoRows)?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert!(matches!(err, DagError::Database(_)));
        assert!(!err.is_guard_rejection());
    }
}
