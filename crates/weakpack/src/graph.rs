//! Module-level dependency graph produced by a single build
//!
//! The graph is keyed by canonical module id and keeps discovery order. Once
//! the builder hands it over it is never mutated again.

use std::fmt;

use indexmap::IndexMap;
use petgraph::{algo::tarjan_scc, graph::DiGraph};
use rustc_hash::FxHashMap;
use serde::Serialize;

/// Canonical module identifier, e.g. `./src/index.js`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments of the id without the leading `./`
    pub(crate) fn segments(&self) -> Vec<String> {
        self.0
            .strip_prefix("./")
            .unwrap_or(&self.0)
            .split('/')
            .map(str::to_owned)
            .collect()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One transformed module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub id: ModuleId,
    /// Raw specifier as written in source -> canonical id
    pub dependencies: IndexMap<String, ModuleId>,
    /// Runtime-executable code
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    entry: ModuleId,
    modules: IndexMap<ModuleId, ModuleRecord>,
}

impl DependencyGraph {
    pub(crate) fn new(entry: ModuleId) -> Self {
        Self {
            entry,
            modules: IndexMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, record: ModuleRecord) {
        self.modules.insert(record.id.clone(), record);
    }

    pub fn entry(&self) -> &ModuleId {
        &self.entry
    }

    pub fn get(&self, id: &ModuleId) -> Option<&ModuleRecord> {
        self.modules.get(id)
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.modules.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.modules.values()
    }

    /// Dependency targets that have no record in the graph
    ///
    /// Always empty for a graph produced by the builder.
    pub fn dangling_dependencies(&self) -> Vec<(&ModuleId, &str, &ModuleId)> {
        self.iter()
            .flat_map(|record| {
                record
                    .dependencies
                    .iter()
                    .filter(|(_, target)| !self.contains(target))
                    .map(move |(specifier, target)| (&record.id, specifier.as_str(), target))
            })
            .collect()
    }

    /// Groups of modules that import each other, directly or transitively
    ///
    /// Each group is reported in discovery order. A module importing itself
    /// forms a group of one.
    pub fn circular_dependencies(&self) -> Vec<Vec<ModuleId>> {
        let mut graph = DiGraph::<usize, ()>::new();
        let mut nodes = FxHashMap::default();
        for (position, id) in self.modules.keys().enumerate() {
            nodes.insert(id, graph.add_node(position));
        }

        let mut self_imports = Vec::new();
        for record in self.iter() {
            let from = nodes[&record.id];
            for target in record.dependencies.values() {
                if target == &record.id {
                    self_imports.push(vec![record.id.clone()]);
                } else if let Some(&to) = nodes.get(target) {
                    graph.update_edge(from, to, ());
                }
            }
        }

        let mut cycles: Vec<Vec<ModuleId>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut positions: Vec<usize> =
                    component.into_iter().map(|node| graph[node]).collect();
                positions.sort_unstable();
                positions
                    .into_iter()
                    .filter_map(|position| self.modules.get_index(position))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .collect();
        self_imports.dedup();
        cycles.extend(self_imports);
        cycles.sort_by_key(|cycle| {
            cycle
                .first()
                .and_then(|id| self.modules.get_index_of(id))
                .unwrap_or(usize::MAX)
        });
        cycles
    }
}
