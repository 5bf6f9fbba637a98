//! Breadth-first dependency graph construction
//!
//! Starting from the entry, every discovered module is read, run through the
//! loader chain, transformed, and its specifiers resolved. A module is
//! enqueued the first time its canonical id is seen and never again, so each
//! file is processed once no matter how many importers it has or whether the
//! imports form a cycle.

use std::{collections::VecDeque, fs, path::Path};

use indexmap::IndexMap;
use log::{debug, trace, warn};
use rustc_hash::FxHashSet;

use crate::{
    error::{BundleError, Result},
    graph::{DependencyGraph, ModuleId, ModuleRecord},
    loader::LoaderChain,
    resolver::ModuleResolver,
    transform::ModuleTransformer,
};

pub struct GraphBuilder<'a> {
    resolver: &'a ModuleResolver,
    loaders: &'a LoaderChain,
    transformer: &'a dyn ModuleTransformer,
}

impl std::fmt::Debug for GraphBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphBuilder")
            .field("context", &self.resolver.context())
            .finish_non_exhaustive()
    }
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        resolver: &'a ModuleResolver,
        loaders: &'a LoaderChain,
        transformer: &'a dyn ModuleTransformer,
    ) -> Self {
        Self {
            resolver,
            loaders,
            transformer,
        }
    }

    /// Build the complete graph reachable from `entry`
    ///
    /// Any failure aborts the build; no partial graph is returned.
    pub fn build(&self, entry: &Path) -> Result<DependencyGraph> {
        let entry_id = self.resolver.entry_id(entry)?;
        debug!("Building dependency graph from {entry_id}");

        let mut graph = DependencyGraph::new(entry_id.clone());
        let mut discovered = FxHashSet::default();
        discovered.insert(entry_id.clone());
        let mut queue = VecDeque::from([entry_id]);

        while let Some(id) = queue.pop_front() {
            let record = self.process_module(&id)?;
            for target in record.dependencies.values() {
                if discovered.insert(target.clone()) {
                    trace!("Discovered {target} via {id}");
                    queue.push_back(target.clone());
                }
            }
            graph.insert(record);
        }

        for cycle in graph.circular_dependencies() {
            let members: Vec<&str> = cycle.iter().map(ModuleId::as_str).collect();
            warn!(
                "Circular import between {}; bindings read during initialization may be \
                 incomplete",
                members.join(" -> ")
            );
        }

        debug!("Dependency graph has {} modules", graph.len());
        Ok(graph)
    }

    fn process_module(&self, id: &ModuleId) -> Result<ModuleRecord> {
        let path = self.resolver.file_path(id);
        debug!("Processing {id}");

        let source = fs::read_to_string(&path).map_err(|e| BundleError::io(&path, e))?;
        let source = self.loaders.apply(id.as_str(), &path, source)?;
        let output = self
            .transformer
            .transform(&source, id.as_str())
            .map_err(|source| BundleError::Parse {
                path: id.to_string(),
                source,
            })?;

        let dependencies = output
            .specifiers
            .into_iter()
            .map(|specifier| {
                let target = self.resolver.resolve(id, &specifier)?;
                Ok((specifier, target))
            })
            .collect::<Result<IndexMap<_, _>>>()?;

        Ok(ModuleRecord {
            id: id.clone(),
            dependencies,
            code: output.code,
        })
    }
}
