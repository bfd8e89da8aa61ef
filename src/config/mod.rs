//! Configuration system
//!
//! - `macros`: the `config_struct!` definition helper
//! - `schemas`: every config section with its defaults
//! - `utils`: loading, reloading and global access

pub mod macros;
pub mod schemas;
pub mod utils;

pub use schemas::{
    CapitalConfig, Config, DrpConfig, FounderConfig, KillSwitchConfig, NonceConfig, OpsConfig,
    OrchestratorConfig, RpcConfig, TxConfig,
};
pub use utils::{
    get_config_clone, load_config_from_path, read_config, reload_config_from_path, with_config,
    CONFIG,
};
