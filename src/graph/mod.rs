//! Commit-graph construction and rendering.
//!
//! [`build`] loads a project's variations and produces a topologically
//! ordered DAG view plus HEAD location; [`render`] turns that view into an
//! ASCII graph log or pretty JSON. Rendering is pure presentation and never
//! affects the ordering contract.

pub mod build;
pub mod render;

pub use build::{CommitGraph, CommitGraphNode, build};
pub use render::{render_ascii, render_json};
