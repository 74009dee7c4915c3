/// Template renderer using Tera for Jinja2-style template rendering
use super::embedded_templates;
use crate::provisioner::ProvisionError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};

/// Variable naming a directory whose templates replace the embedded ones
pub const TEMPLATES_DIR_ENV_VAR: &str = "DEVSTACK_TEMPLATES_DIR";

/// Simple recursive directory walker
fn walkdir(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut results = Vec::new();
    if dir.is_dir() {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                results.extend(walkdir(&path)?);
            } else {
                results.push(path);
            }
        }
    }
    Ok(results)
}

pub struct TemplateRenderer {
    tera: Tera,
    templates_dir: PathBuf,
}

impl TemplateRenderer {
    /// Create a TemplateRenderer from embedded templates (compiled into the binary).
    pub fn from_embedded() -> Result<Self, ProvisionError> {
        tracing::debug!("[TemplateRenderer] Initializing Tera from embedded templates");

        let mut tera = Tera::default();
        for (name, content) in embedded_templates::ALL_TEMPLATES {
            tera.add_raw_template(name, content).map_err(|e| {
                ProvisionError::Template(format!("embedded template {}: {}", name, e))
            })?;
        }

        tracing::debug!(
            "[TemplateRenderer] Loaded {} embedded templates",
            embedded_templates::ALL_TEMPLATES.len()
        );

        Ok(Self {
            tera,
            templates_dir: PathBuf::from("(embedded)"),
        })
    }

    /// Embedded templates, overlaid with `$DEVSTACK_TEMPLATES_DIR` when set
    pub fn from_env_or_embedded() -> Result<Self, ProvisionError> {
        match std::env::var(TEMPLATES_DIR_ENV_VAR) {
            Ok(dir) if !dir.trim().is_empty() => Self::new(PathBuf::from(dir)),
            _ => Self::from_embedded(),
        }
    }

    /// Embedded templates overlaid with every `.j2` file under `templates_dir`.
    pub fn new(templates_dir: PathBuf) -> Result<Self, ProvisionError> {
        tracing::debug!(
            "[TemplateRenderer] Initializing Tera with templates_dir: {}",
            templates_dir.display()
        );

        let mut renderer = Self::from_embedded()?;
        let mut template_count = 0;

        for path in walkdir(&templates_dir)? {
            let is_template = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(".j2"))
                .unwrap_or(false);
            if !is_template {
                continue;
            }
            let Ok(rel_path) = path.strip_prefix(&templates_dir) else {
                continue;
            };

            // Template names use forward slashes on every platform
            let template_name = rel_path.to_string_lossy().replace('\\', "/");
            let content = std::fs::read_to_string(&path)?;
            if let Err(e) = renderer.tera.add_raw_template(&template_name, &content) {
                tracing::warn!(
                    "[TemplateRenderer] Failed to add template {}: {}",
                    template_name,
                    e
                );
            } else {
                template_count += 1;
            }
        }

        tracing::info!(
            "[TemplateRenderer] Loaded {} templates from {}",
            template_count,
            templates_dir.display()
        );

        renderer.templates_dir = templates_dir;
        Ok(renderer)
    }

    /// Render a template with variables using Tera context
    pub fn render(
        &self,
        template_name: &str,
        vars: &HashMap<String, String>,
    ) -> Result<String, ProvisionError> {
        let mut context = Context::new();
        for (key, value) in vars {
            context.insert(key, value);
        }

        let rendered = self.tera.render(template_name, &context).map_err(|e| {
            ProvisionError::Template(format!(
                "Failed to render template {}: {}",
                template_name, e
            ))
        })?;

        tracing::debug!(
            "[TemplateRenderer] Rendered template {} ({} bytes)",
            template_name,
            rendered.len()
        );

        Ok(rendered)
    }

    /// List all loaded template names
    pub fn list_templates(&self) -> Vec<String> {
        self.tera.get_template_names().map(String::from).collect()
    }

    /// Get templates directory path
    pub fn templates_dir(&self) -> &Path {
        &self.templates_dir
    }
}
