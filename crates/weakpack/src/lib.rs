//! weakpack: a minimal JavaScript module bundler
//!
//! Starting from an entry module, weakpack follows static relative imports,
//! runs matching loaders, lowers ES module syntax, and emits one
//! self-contained script that carries its own module loader. Plugins extend
//! the build through four lifecycle hooks.

pub mod assets;
pub mod code_generator;
pub mod config;
pub mod error;
pub mod graph;
pub mod graph_builder;
pub mod hooks;
pub mod loader;
pub mod orchestrator;
pub mod plugins;
pub mod resolver;
pub mod transform;
pub mod writer;

pub use crate::{
    config::{BundleOptions, Config},
    error::{BundleError, Result},
    orchestrator::{BuildSummary, Bundler},
};
