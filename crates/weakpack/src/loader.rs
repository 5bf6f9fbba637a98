//! Loader chain: text-to-text transforms applied before module transformation
//!
//! Loader references from the configuration are resolved to callables once,
//! when the chain is built, so an unknown loader or bad loader options are
//! reported before the build touches any module.

use std::{fmt, path::Path, sync::Arc};

use anyhow::bail;
use indexmap::IndexMap;
use log::trace;
use regex::Regex;

use crate::{
    config::{LoaderRef, ModuleRule},
    error::{BundleError, Result},
    transform::js_string,
};

/// A text-to-text transform
pub trait Loader: Send + Sync {
    fn run(&self, source: String, path: &Path) -> anyhow::Result<String>;
}

impl<F> Loader for F
where
    F: Fn(String, &Path) -> anyhow::Result<String> + Send + Sync,
{
    fn run(&self, source: String, path: &Path) -> anyhow::Result<String> {
        self(source, path)
    }
}

/// Turns a configured loader reference into a callable
pub trait LoaderResolver {
    fn resolve(&self, reference: &LoaderRef) -> Result<Arc<dyn Loader>>;
}

type LoaderFactory = Arc<dyn Fn(&toml::Table) -> anyhow::Result<Arc<dyn Loader>> + Send + Sync>;

/// Name-based loader lookup
///
/// [`LoaderRegistry::default`] carries the built-in `css-loader`,
/// `raw-loader` and `style-loader`.
#[derive(Clone)]
pub struct LoaderRegistry {
    factories: IndexMap<String, LoaderFactory>,
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("loaders", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_factory("css-loader", |options| {
            reject_options("css-loader", options)?;
            Ok(Arc::new(text_module) as Arc<dyn Loader>)
        });
        registry.register_factory("raw-loader", |options| {
            reject_options("raw-loader", options)?;
            Ok(Arc::new(text_module) as Arc<dyn Loader>)
        });
        registry.register_factory("style-loader", |options| {
            Ok(Arc::new(StyleLoader::from_options(options)?) as Arc<dyn Loader>)
        });
        registry
    }
}

impl LoaderRegistry {
    /// A registry without the built-in loaders
    pub fn empty() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// Register a loader that takes no options; replaces any loader of the
    /// same name
    pub fn register(&mut self, name: impl Into<String>, loader: impl Loader + 'static) {
        let name = name.into();
        let loader: Arc<dyn Loader> = Arc::new(loader);
        let label = name.clone();
        self.factories.insert(
            name,
            Arc::new(move |options: &toml::Table| -> anyhow::Result<Arc<dyn Loader>> {
                reject_options(&label, options)?;
                Ok(Arc::clone(&loader))
            }),
        );
    }

    /// Register a loader built from its configured options
    pub fn register_factory<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&toml::Table) -> anyhow::Result<Arc<dyn Loader>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl LoaderResolver for LoaderRegistry {
    fn resolve(&self, reference: &LoaderRef) -> Result<Arc<dyn Loader>> {
        let name = reference.name();
        let factory = self.factories.get(name).ok_or_else(|| {
            BundleError::configuration(format!(
                "unknown loader `{name}` (available: {})",
                self.factories
                    .keys()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;
        let empty = toml::Table::new();
        factory(reference.options().unwrap_or(&empty))
            .map_err(|e| BundleError::configuration(format!("loader `{name}`: {e:#}")))
    }
}

struct ResolvedRule {
    test: Regex,
    /// In execution order, i.e. reversed from the configuration
    loaders: Vec<(String, Arc<dyn Loader>)>,
}

/// Configured rules with every loader resolved
///
/// The default chain has no rules and passes source through unchanged.
#[derive(Default)]
pub struct LoaderChain {
    rules: Vec<ResolvedRule>,
}

impl fmt::Debug for LoaderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|rule| {
                (
                    rule.test.as_str(),
                    rule.loaders
                        .iter()
                        .map(|(name, _)| name.as_str())
                        .collect::<Vec<_>>(),
                )
            }))
            .finish()
    }
}

impl LoaderChain {
    pub fn new(rules: &[ModuleRule], resolver: &dyn LoaderResolver) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let loaders = rule
                    .loaders
                    .iter()
                    .rev()
                    .map(|reference| {
                        Ok((reference.name().to_owned(), resolver.resolve(reference)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(ResolvedRule {
                    test: rule.test.clone(),
                    loaders,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Run every matching rule's loaders over `source`
    ///
    /// `id` is what rule patterns are matched against; `path` is handed to
    /// the loaders.
    pub fn apply(&self, id: &str, path: &Path, source: String) -> Result<String> {
        let mut processed = source;
        for rule in self.rules.iter().filter(|rule| rule.test.is_match(id)) {
            for (name, loader) in &rule.loaders {
                trace!("Applying {name} to {id}");
                processed = loader
                    .run(processed, path)
                    .map_err(|source| BundleError::Loader {
                        loader: name.clone(),
                        path: id.to_owned(),
                        source,
                    })?;
            }
        }
        Ok(processed)
    }
}

fn reject_options(name: &str, options: &toml::Table) -> anyhow::Result<()> {
    if let Some(key) = options.keys().next() {
        bail!("{name} does not accept options (got `{key}`)");
    }
    Ok(())
}

/// Wrap arbitrary text as a module whose default export is that text
fn text_module(source: String, _path: &Path) -> anyhow::Result<String> {
    Ok(format!("export default {};\n", js_string(&source)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StyleTarget {
    Head,
    Body,
}

/// Injects the stylesheet produced by the previous loader into the page
#[derive(Debug)]
struct StyleLoader {
    target: StyleTarget,
}

impl StyleLoader {
    fn from_options(options: &toml::Table) -> anyhow::Result<Self> {
        let mut target = StyleTarget::Head;
        for (key, value) in options {
            match (key.as_str(), value.as_str()) {
                ("insert", Some("head")) => target = StyleTarget::Head,
                ("insert", Some("body")) => target = StyleTarget::Body,
                ("insert", _) => bail!("`insert` must be \"head\" or \"body\""),
                (other, _) => bail!("style-loader does not accept option `{other}`"),
            }
        }
        Ok(Self { target })
    }
}

impl Loader for StyleLoader {
    fn run(&self, source: String, _path: &Path) -> anyhow::Result<String> {
        // Reuse the previous loader's default export when there is one
        let css = match source.trim_start().strip_prefix("export default ") {
            Some(expression) => expression.trim_end().trim_end_matches(';').to_owned(),
            None => js_string(&source),
        };
        let parent = match self.target {
            StyleTarget::Head => "document.head",
            StyleTarget::Body => "document.body",
        };
        Ok(format!(
            "const __weakpack_css__ = {css};\n\
             if (typeof document !== \"undefined\") {{\n  \
               const style = document.createElement(\"style\");\n  \
               style.textContent = __weakpack_css__;\n  \
               {parent}.appendChild(style);\n\
             }}\n\
             export default __weakpack_css__;\n"
        ))
    }
}
