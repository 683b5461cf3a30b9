//! # screenflow-cli
//!
//! Operator tooling around `screenflow-core` that needs no device:
//!
//! - **locate**: one-shot template localization in a screenshot
//! - **compare**: change ratio between two screenshots and the static verdict
//! - **probe**: pipe a raw video file through the transcoder and count the
//!   decoded frames
//!
//! Settings come from a TOML file (see [`config::CliConfig`]).

pub mod commands;
pub mod config;
