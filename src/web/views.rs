//! View rendering
//!
//! `FileViews` registers every `{root}/**/*.html` file with Handlebars
//! under its slash path without extension (`pages/home`). Files below
//! `partials/` and `components/` are also registered by their path inside
//! that directory, so templates can write `{{> nav }}`.
//!
//! Pages are wrapped in a layout (the `layout` data field, or the default
//! one) which receives the rendered page as `{{{ body }}}`.

use async_trait::async_trait;
use handlebars::Handlebars;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::config::ViewsConfig;
use crate::error::AppError;

const TEMPLATE_EXTENSION: &str = "html";

/// Directories whose templates are also reachable by their short name
const PARTIAL_DIRS: [&str; 2] = ["partials", "components"];

/// Template backend used by `Ctx::render`
#[async_trait]
pub trait ViewEngine: Send + Sync {
    /// Render `view` (a slash-separated path) with `data`
    async fn render(&self, view: &str, data: &Value) -> Result<String, AppError>;
}

/// File-based view engine
pub struct FileViews {
    registry: Handlebars<'static>,
    default_layout: String,
}

impl FileViews {
    /// Register every template below `config.root`
    ///
    /// With `dev_mode` on, templates are re-read from disk on each render.
    ///
    /// # Errors
    /// Returns `AppError::Render` if the directory cannot be read or a
    /// template does not parse
    pub fn new(config: &ViewsConfig, dev_mode: bool) -> Result<Self, AppError> {
        let mut registry = Handlebars::new();
        // Must be set before registering so file sources are kept for reloads
        registry.set_dev_mode(dev_mode);
        registry.register_escape_fn(|text: &str| html_escape::encode_safe(text).into_owned());

        let mut files = Vec::new();
        collect_templates(&config.root, &mut files)?;
        files.sort();

        for path in &files {
            let Some(name) = template_name(&config.root, path) else {
                continue;
            };
            register(&mut registry, &name, path)?;

            for dir in PARTIAL_DIRS {
                if let Some(short) = name.strip_prefix(dir).and_then(|n| n.strip_prefix('/')) {
                    register(&mut registry, short, path)?;
                }
            }
        }

        tracing::info!(
            root = %config.root.display(),
            templates = files.len(),
            dev_mode,
            "Views registered"
        );

        Ok(Self {
            registry,
            default_layout: config.default_layout.clone(),
        })
    }

    fn render_named(&self, name: &str, data: &Value) -> Result<String, AppError> {
        if !self.registry.has_template(name) {
            return Err(AppError::Render(format!("view '{name}' not found")));
        }
        self.registry
            .render(name, data)
            .map_err(|e| AppError::Render(format!("view '{name}' failed to render: {e}")))
    }

    fn layout_for<'a>(&'a self, data: &'a Value) -> Option<&'a str> {
        match data.get("layout") {
            Some(Value::String(layout)) => Some(layout.as_str()),
            Some(Value::Bool(false)) => None,
            _ => Some(self.default_layout.as_str()),
        }
    }
}

#[async_trait]
impl ViewEngine for FileViews {
    async fn render(&self, view: &str, data: &Value) -> Result<String, AppError> {
        let page = self.render_named(view, data)?;

        let Some(layout) = self.layout_for(data) else {
            return Ok(page);
        };

        let mut layout_data = match data {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        layout_data.insert("body".to_string(), Value::String(page));
        self.render_named(layout, &Value::Object(layout_data))
    }
}

fn register(registry: &mut Handlebars<'static>, name: &str, path: &Path) -> Result<(), AppError> {
    tracing::debug!(name, path = %path.display(), "Registering template");
    registry
        .register_template_file(name, path)
        .map_err(|e| AppError::Render(format!("template '{name}' is invalid: {e}")))
}

fn collect_templates(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), AppError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        AppError::Render(format!("views directory {} unreadable: {e}", dir.display()))
    })?;

    for entry in entries {
        let path = entry
            .map_err(|e| AppError::Render(format!("views directory entry unreadable: {e}")))?
            .path();
        if path.is_dir() {
            collect_templates(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == TEMPLATE_EXTENSION) {
            files.push(path);
        }
    }
    Ok(())
}

/// `{root}/pages/home.html` -> `pages/home`
fn template_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let segments: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(segments.join("/"))
}
