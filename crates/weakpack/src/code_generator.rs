//! Bundle generation
//!
//! The bundle is one script: a small module loader followed by a table of
//! module factories keyed by canonical id. The table is assembled as sorted
//! structured data first and serialized in a single pass, so the same graph
//! always produces byte-identical output regardless of discovery order.

use std::collections::BTreeMap;

use log::debug;
use serde_json::{Map, Value};

use crate::{
    graph::{DependencyGraph, ModuleId},
    transform::js_string,
};

/// Loader prelude. The cache entry is created before a factory runs, so a
/// module re-required while it is still executing (a cycle) returns its
/// partially populated exports instead of running again.
const RUNTIME_PRELUDE: &str = r#"(function (modules) {
  var cache = {};
  function require(id) {
    var cached = cache[id];
    if (cached) {
      return cached.exports;
    }
    var record = modules[id];
    if (!record) {
      throw new Error("weakpack: module '" + id + "' is not part of this bundle");
    }
    var module = (cache[id] = { id: id, exports: {} });
    function scopedRequire(specifier) {
      if (!Object.prototype.hasOwnProperty.call(record.dependencies, specifier)) {
        throw new Error("weakpack: cannot find module '" + specifier + "' from '" + id + "'");
      }
      return require(record.dependencies[specifier]);
    }
    record.factory.call(module.exports, scopedRequire, module.exports, module);
    return module.exports;
  }
  return require("#;

const FACTORY_OPEN: &str = "  factory: function (require, exports, module) {\n";

struct RuntimeModule<'a> {
    dependencies: BTreeMap<&'a str, &'a ModuleId>,
    code: &'a str,
}

/// Sorted, serialization-ready view of a dependency graph
pub struct RuntimeProgram<'a> {
    entry: &'a ModuleId,
    modules: BTreeMap<&'a ModuleId, RuntimeModule<'a>>,
}

impl std::fmt::Debug for RuntimeProgram<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeProgram")
            .field("entry", &self.entry)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<'a> RuntimeProgram<'a> {
    pub fn new(graph: &'a DependencyGraph, entry: &'a ModuleId) -> Self {
        let modules = graph
            .iter()
            .map(|record| {
                let module = RuntimeModule {
                    dependencies: record
                        .dependencies
                        .iter()
                        .map(|(specifier, target)| (specifier.as_str(), target))
                        .collect(),
                    code: &record.code,
                };
                (&record.id, module)
            })
            .collect();
        Self { entry, modules }
    }

    pub fn render(&self) -> String {
        let table_size: usize = self
            .modules
            .values()
            .map(|module| module.code.len() + 128)
            .sum();
        let mut out = String::with_capacity(RUNTIME_PRELUDE.len() + table_size);

        out.push_str(RUNTIME_PRELUDE);
        out.push_str(&js_string(self.entry.as_str()));
        out.push_str(");\n})({\n");

        for (index, (id, module)) in self.modules.iter().enumerate() {
            if index > 0 {
                out.push_str(",\n");
            }
            out.push_str(&js_string(id.as_str()));
            out.push_str(": {\n  dependencies: ");
            out.push_str(&dependencies_json(&module.dependencies));
            out.push_str(",\n");
            out.push_str(FACTORY_OPEN);
            out.push_str(module.code);
            if !module.code.is_empty() && !module.code.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("  }\n}");
        }

        out.push_str("\n});\n");
        out
    }
}

fn dependencies_json(dependencies: &BTreeMap<&str, &ModuleId>) -> String {
    let map: Map<String, Value> = dependencies
        .iter()
        .map(|(specifier, target)| ((*specifier).to_owned(), Value::from(target.as_str())))
        .collect();
    Value::Object(map).to_string()
}

/// Serialize `graph` into a self-executing bundle that starts at `entry`
pub fn generate(graph: &DependencyGraph, entry: &ModuleId) -> String {
    debug!("Generating bundle for {} modules", graph.len());
    RuntimeProgram::new(graph, entry).render()
}
