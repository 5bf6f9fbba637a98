//! Build orchestration
//!
//! A [`Bundler`] owns validated options, its hooks, and the resolved loader
//! chain. [`Bundler::bundle`] drives one build through its fixed phases:
//!
//! 1. `compile` hook
//! 2. dependency graph construction
//! 3. `afterCompile` hook
//! 4. bundle generation and packaging under the output filename
//! 5. `emit` hook (asynchronous, may add, replace or remove assets)
//! 6. writing every asset to the output directory
//! 7. `done` hook
//!
//! Any error stops the build at the phase where it happened. Nothing is
//! written unless every `emit` callback completed successfully.

use std::{fmt, path::PathBuf, sync::Arc};

use log::{debug, info};
use serde::Serialize;

use crate::{
    assets::{Asset, AssetCollection, content_hash},
    code_generator,
    config::BundleOptions,
    error::Result,
    graph::ModuleId,
    graph_builder::GraphBuilder,
    hooks::Hooks,
    loader::{LoaderChain, LoaderRegistry, LoaderResolver},
    plugins::Plugin,
    resolver::ModuleResolver,
    transform::{EsmTransformer, ModuleTransformer},
    writer::{self, WrittenAsset},
};

/// Replaced in the output filename by a digest of the bundle
pub const CONTENT_HASH_PLACEHOLDER: &str = "[contenthash]";
const CONTENT_HASH_LEN: usize = 8;

/// Outcome of a successful build, handed to the `done` hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    pub entry: ModuleId,
    pub module_count: usize,
    pub output_dir: PathBuf,
    pub assets: Vec<WrittenAsset>,
}

pub struct Bundler {
    options: BundleOptions,
    hooks: Hooks,
    loaders: LoaderChain,
    transformer: Arc<dyn ModuleTransformer>,
    plugins: Vec<String>,
}

impl fmt::Debug for Bundler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundler")
            .field("options", &self.options)
            .field("hooks", &self.hooks)
            .field("loaders", &self.loaders)
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

impl Bundler {
    /// Bundler with the built-in loaders and the ES module transformer
    pub fn new(options: BundleOptions, plugins: Vec<Box<dyn Plugin>>) -> Result<Self> {
        Self::with_collaborators(
            options,
            plugins,
            &LoaderRegistry::default(),
            Arc::new(EsmTransformer),
        )
    }

    /// Resolve every configured loader through `loaders`, then apply
    /// `plugins` in order
    pub fn with_collaborators(
        options: BundleOptions,
        plugins: Vec<Box<dyn Plugin>>,
        loaders: &dyn LoaderResolver,
        transformer: Arc<dyn ModuleTransformer>,
    ) -> Result<Self> {
        let loaders = LoaderChain::new(&options.rules, loaders)?;
        let mut bundler = Self {
            options,
            hooks: Hooks::default(),
            loaders,
            transformer,
            plugins: Vec::with_capacity(plugins.len()),
        };

        for plugin in &plugins {
            debug!("Applying plugin {}", plugin.name());
            plugin.apply(&mut bundler);
            bundler.plugins.push(plugin.name().to_owned());
        }
        Ok(bundler)
    }

    pub fn options(&self) -> &BundleOptions {
        &self.options
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut Hooks {
        &mut self.hooks
    }

    /// Names of the applied plugins, in application order
    pub fn plugin_names(&self) -> &[String] {
        &self.plugins
    }

    /// Run one complete build
    pub async fn bundle(&self) -> Result<BuildSummary> {
        debug!("Starting build from {}", self.options.entry.display());
        self.hooks.compile.call(&self.options)?;

        let (entry, module_count, code) = {
            let resolver = ModuleResolver::new(&self.options.context);
            let graph = GraphBuilder::new(&resolver, &self.loaders, self.transformer.as_ref())
                .build(&self.options.entry)?;
            self.hooks.after_compile.call(&graph)?;
            let code = code_generator::generate(&graph, graph.entry());
            (graph.entry().clone(), graph.len(), code)
        };
        let filename = self.output_filename(&code);

        let mut assets = AssetCollection::new();
        assets.insert(filename, Asset::from_string(code));
        debug!("Running emit hook with {} callbacks", self.hooks.emit.len());
        self.hooks.emit.call_async(&mut assets).await?;

        let assets = assets.freeze();
        let written = writer::write_assets(&self.options.output.path, &assets)?;

        let summary = BuildSummary {
            entry,
            module_count,
            output_dir: self.options.output.path.clone(),
            assets: written,
        };
        info!(
            "Bundled {} modules into {} assets in {}",
            summary.module_count,
            summary.assets.len(),
            summary.output_dir.display()
        );
        self.hooks.done.call(&summary)?;
        Ok(summary)
    }

    fn output_filename(&self, code: &str) -> String {
        let filename = &self.options.output.filename;
        if filename.contains(CONTENT_HASH_PLACEHOLDER) {
            let hash = content_hash(code.as_bytes());
            filename.replace(CONTENT_HASH_PLACEHOLDER, &hash[..CONTENT_HASH_LEN])
        } else {
            filename.clone()
        }
    }
}
