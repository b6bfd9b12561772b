// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains error and Result definitions.

use thiserror::Error;

/// Represents all kinds of errors the servoing core can report.
///
/// Failures inside the periodic tick never propagate out of the control
/// loop; they are logged and the affected cycle is suppressed or replaced by
/// a halt publication. `ServoError` therefore surfaces only through the
/// construction and configuration APIs.
#[derive(Error, Debug)]
pub enum ServoError {
    /// A parameter file could not be read.
    #[error("cannot read parameter file: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// A parameter file could not be parsed.
    #[error("cannot parse parameter file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A parameter set is inconsistent.
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Explanatory string.
        message: String,
    },

    /// A frame transform could not be resolved.
    #[error("transform from {reference:?} to {frame:?} is unavailable")]
    TransformUnavailable {
        /// The frame that was requested.
        frame: String,
        /// The frame the transform was requested relative to.
        reference: String,
    },

    /// An increment vector does not match the active joint count.
    #[error("increment length {got} does not match joint count {expected}")]
    ShapeMismatch { expected: usize, got: usize },

    /// The thin SVD of the Jacobian did not converge.
    #[error("Jacobian SVD did not converge")]
    SvdFailure,
}

/// Result type which can have [`ServoError`] as Error.
pub type ServoResult<T> = Result<T, ServoError>;

pub(crate) fn config_error(message: &str) -> ServoError {
    ServoError::ConfigInvalid {
        message: message.to_string(),
    }
}
