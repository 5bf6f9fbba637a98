//! Plugin interface and built-in plugins
//!
//! A plugin is applied once, when the bundler is constructed, and extends the
//! build by tapping the bundler's hooks. Plugins are applied in configured
//! order, which is also the order their callbacks run within each hook.

mod html;

use log::debug;

pub use self::html::{HtmlPlugin, HtmlPluginOptions};
use crate::{
    config::PluginConfig,
    error::{BundleError, Result},
    orchestrator::Bundler,
};

pub trait Plugin: Send + Sync {
    /// Name used in logs and hook error messages
    fn name(&self) -> &str;

    /// Register this plugin's hook callbacks
    fn apply(&self, bundler: &mut Bundler);
}

/// Names of the plugins that can be enabled from configuration
pub const BUILTIN_PLUGINS: &[&str] = &[HtmlPlugin::NAME];

/// Instantiate configured plugins, preserving their order
pub fn from_config(configs: &[PluginConfig]) -> Result<Vec<Box<dyn Plugin>>> {
    configs
        .iter()
        .map(|config| {
            debug!("Instantiating plugin {}", config.name);
            match config.name.as_str() {
                HtmlPlugin::NAME => {
                    Ok(Box::new(HtmlPlugin::from_options(&config.options)?) as Box<dyn Plugin>)
                }
                other => Err(BundleError::configuration(format!(
                    "unknown plugin `{other}` (available: {})",
                    BUILTIN_PLUGINS.join(", ")
                ))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn plugin_config(name: &str, options: &str) -> PluginConfig {
        PluginConfig {
            name: name.to_owned(),
            options: toml::from_str(options).expect("options table"),
        }
    }

    #[test]
    fn test_builtin_plugins_resolve_in_order() -> Result<()> {
        let plugins = from_config(&[
            plugin_config("html", ""),
            plugin_config("html", "filename = \"about.html\""),
        ])?;
        assert_eq!(
            plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            vec!["html", "html"]
        );
        Ok(())
    }

    #[test]
    fn test_unknown_plugin_is_configuration_error() {
        let err = from_config(&[plugin_config("minify", "")])
            .err()
            .expect("unknown plugin");
        assert_eq!(err.kind(), "ConfigurationError");
        assert!(err.to_string().contains("minify"));
    }
}
