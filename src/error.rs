//! Error types for hierarchy construction and cycling.
//!
//! Structural and configuration problems are detected eagerly while the
//! hierarchy is built. A stalled coarsening is not an error: the builder
//! truncates the hierarchy and records a
//! [`HierarchyStop`](crate::hierarchy::HierarchyStop) instead.

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AmgError>;

#[derive(Debug, thiserror::Error)]
pub enum AmgError {
    /// The matrix cannot be used by the strength measure (non-square, not
    /// stored by rows, or a zero/missing diagonal entry).
    #[error("invalid matrix: {0}")]
    InvalidMatrix(String),

    /// Contradictory or non-positive coarsening bounds.
    #[error("invalid coarsening criterion: {0}")]
    InvalidCriterion(String),

    /// A vector or ownership provider does not match the level it is used on.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Propagated from the coarsest level solver, never retried.
    #[error("coarse level solver failed: {0}")]
    DirectSolver(String),

    #[error("failed to read matrix market file: {0}")]
    MatrixMarket(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse json: {0}")]
    Json(#[from] serde_json::Error),
}
