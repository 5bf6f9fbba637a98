//! Build configuration
//!
//! [`Config`] is the raw, layered form read from TOML files, the environment
//! and the command line. [`Config::into_options`] validates it eagerly into
//! [`BundleOptions`], the only form the bundler accepts, so malformed rules
//! are reported before any module is read.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use etcetera::BaseStrategy;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BundleError, Result};

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "weakpack.toml";

pub const DEFAULT_ENTRY: &str = "./src/index.js";
pub const DEFAULT_OUTPUT_PATH: &str = "dist";
pub const DEFAULT_OUTPUT_FILENAME: &str = "bundle.js";

/// Raw configuration, every field optional so layers can be merged
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Entry module, relative to `context`
    pub entry: Option<PathBuf>,
    /// Directory module ids are relative to
    pub context: Option<PathBuf>,
    pub output: OutputConfig,
    pub module: ModuleConfig,
    pub plugins: Vec<PluginConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub path: Option<PathBuf>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleConfig {
    pub rules: Vec<RuleConfig>,
}

/// `{ test = "<regex>", use = <loader spec> }`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub test: String,
    #[serde(rename = "use")]
    pub loaders: UseConfig,
}

/// A single loader entry or an ordered list of them
///
/// `Many` must stay first: a table-shaped entry would otherwise also accept
/// an array positionally.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum UseConfig {
    Many(Vec<LoaderEntry>),
    One(LoaderEntry),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LoaderEntry {
    Name(String),
    Object {
        loader: Option<String>,
        #[serde(default)]
        options: toml::Table,
    },
}

/// A plugin by name plus its options
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PluginConfig {
    pub name: String,
    #[serde(flatten)]
    pub options: toml::Table,
}

/// Validated reference to a loader
#[derive(Debug, Clone, PartialEq)]
pub enum LoaderRef {
    Named(String),
    WithOptions { loader: String, options: toml::Table },
}

impl LoaderRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::WithOptions { loader, .. } => loader,
        }
    }

    pub fn options(&self) -> Option<&toml::Table> {
        match self {
            Self::Named(_) => None,
            Self::WithOptions { options, .. } => Some(options),
        }
    }
}

/// A rule whose pattern has been compiled
#[derive(Debug, Clone)]
pub struct ModuleRule {
    pub test: Regex,
    /// Loaders in declared order; they run last to first
    pub loaders: Vec<LoaderRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    pub path: PathBuf,
    pub filename: String,
}

/// Validated options for one bundler instance
#[derive(Debug, Clone)]
pub struct BundleOptions {
    pub entry: PathBuf,
    pub context: PathBuf,
    pub output: OutputOptions,
    pub rules: Vec<ModuleRule>,
    pub plugins: Vec<PluginConfig>,
}

impl BundleOptions {
    /// Options for `entry` with every other setting at its default
    pub fn new(entry: impl Into<PathBuf>) -> Self {
        Self {
            entry: entry.into(),
            context: PathBuf::from("."),
            output: OutputOptions {
                path: PathBuf::from(DEFAULT_OUTPUT_PATH),
                filename: DEFAULT_OUTPUT_FILENAME.to_owned(),
            },
            rules: Vec::new(),
            plugins: Vec::new(),
        }
    }
}

impl Config {
    /// Parse a TOML document; `origin` names it in error messages
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| BundleError::configuration(format!("failed to parse {origin}: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| BundleError::io(path, e))?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Load configuration with the full precedence chain:
    /// defaults < user config < project config < explicit file < environment
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config) = user_config_path()
            && user_config.is_file()
        {
            debug!("Loading user config from {}", user_config.display());
            config = config.merge(Self::from_file(&user_config)?);
        }

        let project_config = PathBuf::from(CONFIG_FILE_NAME);
        if project_config.is_file() {
            debug!("Loading project config from {}", project_config.display());
            config = config.merge(Self::from_file(&project_config)?);
        }

        if let Some(path) = explicit {
            debug!("Loading config from {}", path.display());
            config = config.merge(Self::from_file(path)?);
        }

        config.apply_env();
        Ok(config)
    }

    /// Overlay `other` on top of `self`; set fields in `other` win
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            entry: other.entry.or(self.entry),
            context: other.context.or(self.context),
            output: OutputConfig {
                path: other.output.path.or(self.output.path),
                filename: other.output.filename.or(self.output.filename),
            },
            module: if other.module.rules.is_empty() {
                self.module
            } else {
                other.module
            },
            plugins: if other.plugins.is_empty() {
                self.plugins
            } else {
                other.plugins
            },
        }
    }

    /// Apply `WEAKPACK_*` environment overrides
    pub fn apply_env(&mut self) {
        let var = |name: &str| env::var(name).ok().filter(|value| !value.is_empty());
        if let Some(entry) = var("WEAKPACK_ENTRY") {
            self.entry = Some(PathBuf::from(entry));
        }
        if let Some(context) = var("WEAKPACK_CONTEXT") {
            self.context = Some(PathBuf::from(context));
        }
        if let Some(path) = var("WEAKPACK_OUTPUT_PATH") {
            self.output.path = Some(PathBuf::from(path));
        }
        if let Some(filename) = var("WEAKPACK_OUTPUT_FILENAME") {
            self.output.filename = Some(filename);
        }
    }

    /// Validate into options the bundler can run with
    pub fn into_options(self) -> Result<BundleOptions> {
        let entry = self.entry.unwrap_or_else(|| PathBuf::from(DEFAULT_ENTRY));
        if entry.as_os_str().is_empty() {
            return Err(BundleError::configuration("`entry` must not be empty"));
        }

        let filename = self
            .output
            .filename
            .unwrap_or_else(|| DEFAULT_OUTPUT_FILENAME.to_owned());
        validate_asset_name(&filename, "output.filename")?;

        let rules = self
            .module
            .rules
            .into_iter()
            .enumerate()
            .map(|(index, rule)| rule.validate(index))
            .collect::<Result<Vec<_>>>()?;

        for plugin in &self.plugins {
            if plugin.name.trim().is_empty() {
                return Err(BundleError::configuration("plugin entries need a `name`"));
            }
        }

        Ok(BundleOptions {
            entry,
            context: self.context.unwrap_or_else(|| PathBuf::from(".")),
            output: OutputOptions {
                path: self
                    .output
                    .path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH)),
                filename,
            },
            rules,
            plugins: self.plugins,
        })
    }
}

impl RuleConfig {
    fn validate(self, index: usize) -> Result<ModuleRule> {
        let test = Regex::new(&self.test).map_err(|e| {
            BundleError::configuration(format!(
                "module.rules[{index}].test `{}` is not a valid pattern: {e}",
                self.test
            ))
        })?;

        let entries = match self.loaders {
            UseConfig::One(entry) => vec![entry],
            UseConfig::Many(entries) => entries,
        };
        if entries.is_empty() {
            return Err(BundleError::configuration(format!(
                "module.rules[{index}].use must name at least one loader"
            )));
        }

        let loaders = entries
            .into_iter()
            .map(|entry| match entry {
                LoaderEntry::Name(name) if !name.trim().is_empty() => Ok(LoaderRef::Named(name)),
                LoaderEntry::Object {
                    loader: Some(loader),
                    options,
                } if !loader.trim().is_empty() => Ok(LoaderRef::WithOptions { loader, options }),
                other => Err(BundleError::configuration(format!(
                    "module.rules[{index}].use: invalid loader configuration {other:?}; expected \
                     a loader name or a table with a `loader` field"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ModuleRule { test, loaders })
    }
}

/// Asset names become file names directly under the output directory
pub(crate) fn validate_asset_name(name: &str, field: &str) -> Result<()> {
    let path = Path::new(name);
    let is_plain = path.components().count() == 1
        && matches!(path.components().next(), Some(std::path::Component::Normal(_)));
    if name.is_empty() || !is_plain {
        return Err(BundleError::configuration(format!(
            "{field} `{name}` must be a plain file name"
        )));
    }
    Ok(())
}

/// `<config dir>/weakpack/weakpack.toml` for the current user
fn user_config_path() -> Option<PathBuf> {
    etcetera::choose_base_strategy()
        .ok()
        .map(|strategy| strategy.config_dir().join("weakpack").join(CONFIG_FILE_NAME))
}
