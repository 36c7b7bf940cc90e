//! Error types for dependency graph operations.

/// Result type for dependency graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building a dependency graph.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// An edge was added before one of its endpoints.
    ///
    /// The finalized graph must never contain an edge whose endpoint is not
    /// in the node set; builders resolve wildcard selectors into concrete
    /// nodes before emitting edges, so hitting this means the builder
    /// skipped that resolution step.
    #[error("edge endpoint '{task}' in build variant '{variant}' is not a node in the graph")]
    MissingEndpoint {
        /// Task name of the missing endpoint.
        task: String,
        /// Variant name of the missing endpoint.
        variant: String,
    },
}
