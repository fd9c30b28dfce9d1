//! Vascular tree synthesis by constrained constructive optimization.
//!
//! Layers, innermost first: `domain` (tree model, hydraulics, growth
//! domains, scoring), `application` (the staged growth loop), `infrastructure`
//! (snapshot persistence) and `cli`.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod tree_traits;
pub mod util;
