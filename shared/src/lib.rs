//! Finding anchoring for document review.
//!
//! A processed document arrives as rendered markup plus a list of findings,
//! each pairing an original passage with a suggested rewrite. This crate
//! locates every finding inside the markup, overlays the suggestion on the
//! leaf it came from, and tracks the reviewer's decisions until export.

pub mod anchor;
pub mod backend;
pub mod config;
pub mod decision;
pub mod dto;
pub mod error;
pub mod matcher;
pub mod normalize;
pub mod overlay;
pub mod schedule;
pub mod session;
pub mod similarity;
pub mod tree;
