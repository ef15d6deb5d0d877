use thiserror::Error;

/// Errors returned by the recombination engines, point indices and history consumers.
#[derive(Debug, Error)]
pub enum Error {
    /// A point handed to a nearest-neighbour index has non-finite coordinates.
    #[error("invalid point {index}: rapidity {rapidity}, azimuth {azimuth}")]
    InvalidPoint {
        /// Index the point would have received.
        index: usize,
        /// Offending rapidity.
        rapidity: f64,
        /// Offending azimuth.
        azimuth: f64,
    },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Human-readable explanation.
        message: &'static str,
    },

    /// A point's nearest neighbour is its own periodic image and the index runs in
    /// strict mode.
    #[error("point {index} has its own mirror image as nearest neighbour")]
    AmbiguousNeighbour {
        /// The point whose neighbour is ambiguous.
        index: usize,
    },

    /// Requested cluster count is incompatible with the clustered inputs.
    #[error("invalid cluster count: requested {requested}, but there were only {n_items} inputs")]
    InvalidClusterCount {
        /// Requested number of clusters.
        requested: usize,
        /// Number of original inputs.
        n_items: usize,
    },

    /// The merge forest violates its structural invariants.
    #[error("inconsistent history at node {node}: {message}")]
    InconsistentHistory {
        /// Node where the inconsistency was detected.
        node: usize,
        /// Human-readable explanation.
        message: &'static str,
    },
}

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;
