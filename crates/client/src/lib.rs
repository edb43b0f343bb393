//! Client code for the meilisearch proxy.
//!
//! This crate provides the upstream side of the proxy: target URL joining,
//! request forwarding, response capture with content-encoding normalization,
//! and the upstream liveness probe.

pub mod upstream;

pub use reqwest::Body;
pub use upstream::{CapturedResponse, UpstreamClient, UpstreamConfig, UpstreamRequest};
