//! Error types for model construction and algorithm inputs.

use thiserror::Error;

/// Errors raised by the rigid-body layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RigidError {
    /// A model must contain at least one joint.
    #[error("model has no joints")]
    EmptyModel,

    /// Joint or frame names must be unique within a model.
    #[error("duplicate name: {0}")]
    DuplicateName(String),

    /// A joint's parent must be a previously added joint.
    #[error("joint {joint} references invalid parent {parent}")]
    InvalidParent {
        /// Index of the offending joint.
        joint: usize,
        /// The out-of-range parent index.
        parent: usize,
    },

    /// A frame's parent joint is out of range.
    #[error("frame '{name}' references invalid parent joint {parent}")]
    InvalidFrameParent {
        /// Name of the offending frame.
        name: String,
        /// The out-of-range parent joint index.
        parent: usize,
    },

    /// Only the first joint of a tree may be a free-flyer.
    #[error("free-flyer joint '{0}' must be the root of the tree")]
    FreeFlyerNotRoot(String),

    /// A configuration vector had the wrong length.
    #[error("configuration size mismatch: expected {expected}, got {got}")]
    ConfigurationSize {
        /// Expected length (`nq`).
        expected: usize,
        /// Provided length.
        got: usize,
    },

    /// A velocity vector had the wrong length.
    #[error("velocity size mismatch: expected {expected}, got {got}")]
    VelocitySize {
        /// Expected length (`nv`).
        expected: usize,
        /// Provided length.
        got: usize,
    },

    /// Position bounds with `min > max`.
    #[error("joint '{0}' has inverted position bounds")]
    InvertedBounds(String),
}

/// Result alias for rigid-body operations.
pub type Result<T> = std::result::Result<T, RigidError>;
