//! Test doubles for the inference seam and Python snippets shared by the
//! workspace's test suites.

pub mod doubles;
pub mod fixtures;

pub use doubles::{FailingInference, ScriptedInference};
