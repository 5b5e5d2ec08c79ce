//! Mag7 Intel Library
//!
//! Feature, regime and signal engine over daily price bars and
//! macro/sentiment feeds

pub mod config;
pub mod features;
pub mod macro_risk;
pub mod persistence;
pub mod pipeline;
pub mod regime;
pub mod research;
pub mod sentiment;
pub mod signal;
pub mod types;
