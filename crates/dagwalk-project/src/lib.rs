//! Project scanning and the entity catalog
//!
//! This crate handles:
//! - Discovering seed, query and config-definition files under a project root
//! - Building model entities from query templates
//! - Merging config-definition files into models and creating test entities
//! - Exposing the result as a read-only catalog

pub mod entity;
pub mod classifier;
pub mod config_file;
pub mod catalog;

pub use entity::{selector, ConfigSource, Entity, EntityConfig, EntityKind};
pub use classifier::{discover, FileClass, ProjectFiles, ScanError};
pub use catalog::{Catalog, CatalogBuilder};
