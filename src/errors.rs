//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`AnimError`] covers every fatal failure mode of the
//! animation pipeline:
//! - Clip file lookup and `.anim` decoding errors
//! - Skeleton definition errors
//! - Blend tree construction errors (cycles, unknown inputs)
//!
//! Two conditions are deliberately *not* errors:
//! - A clip bone with no match in the target skeleton is skipped and logged.
//! - Registering an already-known skeleton returns the existing instance.
//!
//! # Usage
//!
//! All fallible APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, AnimError>`.
//!
//! ```rust,ignore
//! use skelblend::errors::{AnimError, Result};
//!
//! fn load_clip() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the animation pipeline.
#[derive(Error, Debug)]
pub enum AnimError {
    // ========================================================================
    // Clip Loading Errors
    // ========================================================================
    /// The clip file was not found, neither under its own name nor with the
    /// `.anim` suffix appended.
    #[error("Animation file not found: {0}")]
    FileNotFound(String),

    /// The stream is not a valid `.anim` file (bad magic, truncated data,
    /// unterminated string, ...).
    #[error("Animation format error: {0}")]
    Format(String),

    // ========================================================================
    // Skeleton Errors
    // ========================================================================
    /// The bone hierarchy is malformed (bad parent, duplicate name, singular rest pose).
    #[error("Invalid skeleton `{skeleton}`: {reason}")]
    InvalidSkeleton {
        /// Skeleton name
        skeleton: String,
        /// Human readable reason
        reason: String,
    },

    /// A bone name referenced by a definition does not exist in the skeleton.
    #[error("Bone `{bone}` not found in skeleton `{skeleton}`")]
    UnknownBone {
        /// Skeleton name
        skeleton: String,
        /// Missing bone name
        bone: String,
    },

    /// A clip sequence referenced by a blend node has not been loaded.
    #[error("Animation `{0}` is not registered on the skeleton")]
    UnknownClip(String),

    /// No ordered skeleton has been registered for the unit.
    #[error("Unit `{0}` does not have an OrderedSkeleton")]
    UnknownSkeleton(String),

    // ========================================================================
    // Blend Tree Errors
    // ========================================================================
    /// The blend graph contains a cycle. Detected at construction time only.
    #[error("Blend graph contains a cycle through: {}", nodes.join(" -> "))]
    CyclicBlendGraph {
        /// Names of the nodes that participate in the cycle
        nodes: Vec<String>,
    },

    /// A blend node input references a node that does not exist.
    #[error("Blend node `{0}` does not exist")]
    UnknownNode(String),

    /// Two blend nodes share one name.
    #[error("Blend node `{0}` is declared twice")]
    DuplicateNode(String),

    /// A blend weight was set on a node that is not a blend node.
    #[error("Blend node `{0}` has no blend value")]
    NotBlendNode(String),

    /// A blend node references a mask that does not exist.
    #[error("Animation mask `{0}` does not exist")]
    UnknownMask(String),

    /// A node was given the wrong number of inputs.
    #[error("Blend node `{node}` expects {expected} inputs, got {actual}")]
    InputArity {
        /// Node name
        node: String,
        /// Expected input count
        expected: usize,
        /// Provided input count
        actual: usize,
    },

    // ========================================================================
    // I/O & Parsing Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error (skeleton definitions, settings).
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnimError {
    /// Maps a read failure inside a `.anim` stream.
    ///
    /// Running out of bytes means the file is truncated, which is a format
    /// problem rather than an I/O problem.
    pub(crate) fn from_stream(err: std::io::Error, what: &str) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            AnimError::Format(format!("unexpected end of stream while reading {what}"))
        } else {
            AnimError::Io(err)
        }
    }
}

/// Alias for `Result<T, AnimError>`.
pub type Result<T> = std::result::Result<T, AnimError>;
