// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the servoing calculation core.

pub mod calcs;
pub mod config;
pub mod frame;
pub mod inverse;
pub mod kinematics;
pub mod low_pass_filter;
pub mod rate_limiting;
pub mod scaling;
pub mod status;
pub mod types;
