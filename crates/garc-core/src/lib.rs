//! # garc-core
//!
//! Shared types for the runner controller:
//!
//! - [`Runner`] - the namespaced custom resource users declare
//! - [`naming`] - canonical names, keys and labels of the children a Runner owns
//! - [`image_ref`] - content-addressed naming of the private build cache repository

pub mod error;
pub mod image_ref;
pub mod naming;
pub mod runner;

pub use error::{CoreError, Result};
pub use image_ref::{normalize_name, repository_id};
pub use runner::{ContainerOverrides, PodTemplateOverrides, Runner, RunnerSpec, TemplateMetadata, TemplatePodSpec};
