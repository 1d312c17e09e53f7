//! ## Custom Errors for Ikd
//!
//! This module defines the errors raised when an `IkdTree` is configured with
//! out-of-range parameters.

use std::error::Error;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Represents errors specific to invalid configuration parameters in Ikd.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug)]
pub enum IkdError {
    /// Occurs when the delete criterion lies outside `(0, 1]`.
    InvalidDeleteCriterion {
        /// The value that was provided.
        value: f64,
    },
    /// Occurs when the balance criterion lies outside `(0.5, 1)`.
    InvalidBalanceCriterion {
        /// The value that was provided.
        value: f64,
    },
    /// Occurs when the downsampling voxel size is not positive and finite.
    InvalidVoxelSize {
        /// The value that was provided.
        value: f64,
    },
}

impl fmt::Display for IkdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IkdError::InvalidDeleteCriterion { value } => {
                write!(
                    f,
                    "Invalid delete criterion: {value}. Value must be within (0, 1]."
                )
            }
            IkdError::InvalidBalanceCriterion { value } => {
                write!(
                    f,
                    "Invalid balance criterion: {value}. Value must be within (0.5, 1)."
                )
            }
            IkdError::InvalidVoxelSize { value } => {
                write!(
                    f,
                    "Invalid voxel size: {value}. Value must be positive and finite."
                )
            }
        }
    }
}

impl Error for IkdError {}
