/// Container bootstrap: resources, proxy, sites, provisioning tasks, and workflows.
pub mod archive;
pub mod config;
pub mod drift;
pub mod embedded_templates;
pub mod image_manager;
pub mod lock;
pub mod ports;
pub mod proxy;
pub mod resources;
pub mod site;
pub mod tasks;
pub mod template_renderer;
pub mod utility_runner;
pub mod workflow;
pub mod workflows;

pub use config::{DevstackConfig, SiteSpec};
pub use lock::EnvironmentLocks;
pub use ports::{PortBindings, PortRole};
pub use proxy::{EnvironmentHandle, ProxyBootstrapper};
pub use site::{RebuildState, SiteAction, SiteOutcome, SiteReconciler};
pub use tasks::{ContainerTask, ExecTask};
pub use template_renderer::TemplateRenderer;
pub use utility_runner::{TaskSpec, UtilityOutcome, UtilityRunner};
pub use workflow::{run_tasks, TaskExecutor, TaskResult};
pub use workflows::{InitOptions, InitReport, Workflows};
