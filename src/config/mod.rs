// Configuration module
// Public interface for configuration loading

pub mod constants;
mod loader;
pub mod persona;
mod settings;

pub use loader::{apply_env_fallbacks, default_config_path, load_config, load_config_from};
pub use persona::Persona;
pub use settings::{
    Config, MonitorConfig, PipelineConfig, ProviderConfig, ProviderKind, PublisherConfig,
    SearchConfig,
};
