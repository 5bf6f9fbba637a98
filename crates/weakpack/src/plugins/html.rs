//! HTML page generation
//!
//! On `emit`, renders a template with the page title and one `<script>` tag
//! per JavaScript asset, then adds the page to the asset collection.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use futures::FutureExt;
use log::debug;
use regex::{NoExpand, Regex};
use serde::Deserialize;

use super::Plugin;
use crate::{
    assets::{Asset, AssetCollection},
    config::validate_asset_name,
    error::{BundleError, Result},
    orchestrator::Bundler,
};

const TITLE_PLACEHOLDER: &str = r"<%=\s*htmlWebpackPlugin\.options\.title\s*%>";
const SCRIPTS_PLACEHOLDER: &str = r"<%=\s*htmlWebpackPlugin\.files\.js\s*%>";

/// Template looked up in the context directory when none is configured
pub const DEFAULT_TEMPLATE_FILE: &str = "index.html";

/// Used when the template file does not exist
pub const DEFAULT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title><%= htmlWebpackPlugin.options.title %></title>
</head>
<body>
  <div id="root"></div>
  <%= htmlWebpackPlugin.files.js %>
</body>
</html>
"#;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HtmlPluginOptions {
    /// Name of the emitted page
    pub filename: String,
    /// Relative to the context directory; `index.html` there when unset
    pub template: Option<PathBuf>,
    pub title: String,
}

impl Default for HtmlPluginOptions {
    fn default() -> Self {
        Self {
            filename: "index.html".to_owned(),
            template: None,
            title: "weakpack".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HtmlPlugin {
    options: Arc<HtmlPluginOptions>,
}

impl HtmlPlugin {
    pub const NAME: &'static str = "html";

    pub fn new(options: HtmlPluginOptions) -> Result<Self> {
        validate_asset_name(&options.filename, "html plugin filename")?;
        Ok(Self {
            options: Arc::new(options),
        })
    }

    /// Build from the option table of a `[[plugins]]` entry
    pub fn from_options(table: &toml::Table) -> Result<Self> {
        let options: HtmlPluginOptions = toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e| {
                BundleError::configuration(format!("invalid options for html plugin: {e}"))
            })?;
        Self::new(options)
    }

    pub fn options(&self) -> &HtmlPluginOptions {
        &self.options
    }
}

impl Plugin for HtmlPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, bundler: &mut Bundler) {
        let options = Arc::clone(&self.options);
        let context = &bundler.options().context;
        let template_path: Arc<Path> = options
            .template
            .as_deref()
            .map_or_else(|| context.join(DEFAULT_TEMPLATE_FILE), |path| context.join(path))
            .into();
        bundler
            .hooks_mut()
            .emit
            .tap_async(Self::NAME, move |assets: &mut AssetCollection| {
                let options = Arc::clone(&options);
                let template_path = Arc::clone(&template_path);
                async move {
                    let template = load_template(&template_path).await?;
                    let page = render(&template, &options.title, assets)?;
                    debug!("Adding {} ({} bytes)", options.filename, page.len());
                    assets.insert(options.filename.clone(), Asset::from_string(page));
                    Ok(())
                }
                .boxed()
            });
    }
}

async fn load_template(path: &Path) -> anyhow::Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Template {} not found, using the default page", path.display());
            Ok(DEFAULT_TEMPLATE.to_owned())
        }
        Err(e) => Err(e).with_context(|| format!("failed to read template {}", path.display())),
    }
}

/// Substitute the title and the script tags for every `.js` asset
pub fn render(template: &str, title: &str, assets: &AssetCollection) -> anyhow::Result<String> {
    let scripts = assets
        .names()
        .filter(|name| name.ends_with(".js"))
        .map(|name| format!(r#"<script src="{name}"></script>"#))
        .collect::<Vec<_>>()
        .join("\n");

    let page = Regex::new(TITLE_PLACEHOLDER)?.replace_all(template, NoExpand(title));
    let page = Regex::new(SCRIPTS_PLACEHOLDER)?.replace_all(&page, NoExpand(&scripts));
    Ok(page.into_owned())
}
