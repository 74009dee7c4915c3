//! Embedded templates - compiled into the binary so the CLI is self-contained.
//!
//! Templates are loaded at compile time via `include_str!` and registered with the
//! TemplateRenderer.

/// Name of the site virtual-host template
pub const NGINX_VHOST: &str = "nginx/default.conf.j2";

/// Site virtual host for a non-default document root
pub const NGINX_DEFAULT_CONF: &str = include_str!("templates/nginx/default.conf.j2");

/// All embedded templates as (name, content) pairs for registration with Tera.
pub const ALL_TEMPLATES: &[(&str, &str)] = &[(NGINX_VHOST, NGINX_DEFAULT_CONF)];
