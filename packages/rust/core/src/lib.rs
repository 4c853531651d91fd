//! Core pipeline orchestration and domain logic for SiteBuilder.
//!
//! This crate ties together the content services, the quality gate, workspace
//! materialization and the build tool into one run per request
//! ([`pipeline::Pipeline`]).

pub mod gate;
pub mod pipeline;
pub mod registry;
pub mod supervisor;
pub mod workspace;
