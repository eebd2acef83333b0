//! Core workflow for flexdocs.
//!
//! This crate ties together classification, city mapping, show matching,
//! upload, and consolidation into the end-to-end `run` workflow.

pub mod city;
pub mod classifier;
pub mod consolidate;
pub mod dates;
pub mod fetch;
pub mod pipeline;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_support;
