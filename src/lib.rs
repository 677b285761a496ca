// Copyright 2025
// Licensed under the Elastic License v2.0

//! Routing and typed projection of multiplexed change-data-capture records.

pub mod config;
pub mod core;
pub mod pipeline;
pub mod sink;
pub mod source;
