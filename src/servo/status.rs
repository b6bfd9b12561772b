// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the wire-stable servo status codes.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::fmt;

/// Condition of the servo loop, published every cycle on the status channel.
///
/// The integer values are part of the wire format and must not change.
/// A status other than [`StatusCode::NoWarning`] persists until it is
/// cleared through [`ServoHandle::reset_status`](`crate::ServoHandle::reset_status`).
#[derive(
    Serialize_repr, Deserialize_repr, FromPrimitive, Debug, Copy, Clone, PartialEq, Eq, Default,
)]
#[repr(i8)]
pub enum StatusCode {
    #[default]
    NoWarning = 0,
    DecelerateForSingularity = 1,
    HaltForSingularity = 2,
    HaltForCollision = 3,
    JointBound = 4,
}

impl StatusCode {
    /// The integer published on the status channel.
    pub fn as_i8(self) -> i8 {
        self as i8
    }

    /// Decodes a status integer received from the status channel.
    pub fn from_wire(raw: i8) -> Option<Self> {
        StatusCode::from_i8(raw)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StatusCode::NoWarning => "No warnings",
            StatusCode::DecelerateForSingularity => "Close to a singularity, decelerating",
            StatusCode::HaltForSingularity => "Very close to a singularity, halting",
            StatusCode::HaltForCollision => "Collision detected, halting",
            StatusCode::JointBound => "Close to a joint bound, halting",
        };
        f.write_str(text)
    }
}
