mod config;

pub use config::{AuthConfig, ChainConfig, Config, PersistenceConfig, ServerConfig, TuningConfig};
