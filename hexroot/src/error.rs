//! Crate-wide error type
use thiserror::Error;

/// Universal error type for hexroot
///
/// Geometric degeneracies (zero-area triangles, rays parallel to a triangle's
/// plane) are *not* errors; the predicates report them as defined outcomes.
/// Only structural invariant violations and I/O failures end up here.
#[derive(Error, Debug)]
pub enum Error {
    /// Octree depth exceeds the supported maximum
    #[error("octree depth {0} exceeds the supported maximum of {1}")]
    BadDepth(u8, u8),

    /// Surface has no triangles, so no bounding cube can be computed
    #[error("surface has no triangles")]
    EmptySurface,

    /// Triangle refers to a vertex that does not exist
    #[error("triangle {0} refers to out-of-range vertex {1}")]
    BadTriangle(usize, u32),

    /// Balancing did not reach a fixed point within the sweep bound
    #[error("octree balancing did not converge after {0} sweeps")]
    BalanceOverflow(usize),

    /// File is not a binary STL
    #[error("not a binary STL file")]
    BadStl,

    /// Octree snapshot is internally inconsistent
    #[error("octree snapshot is inconsistent: {0}")]
    BadSnapshot(&'static str),

    /// IO error; see inner code for details
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization failure during octree persistence
    #[error("serialization error: {0}")]
    SerializeError(#[from] bincode::Error),
}
