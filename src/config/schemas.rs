/// Configuration schemas - all config structures defined once with defaults
///
/// Relative paths are resolved against the base directory (see `crate::paths`).
use crate::config_struct;

// ============================================================================
// RPC CONFIGURATION
// ============================================================================

config_struct! {
    /// JSON-RPC endpoint used for nonce seeding, gas estimation and submission
    pub struct RpcConfig {
        url: String = "http://127.0.0.1:8545".to_string(),
        /// Fixed per-request timeout
        timeout_secs: u64 = 10,
    }
}

// ============================================================================
// TRANSACTION ENGINE
// ============================================================================

config_struct! {
    pub struct TxConfig {
        max_attempts: u32 = 3,
        /// Delay before retry N is `retry_base_delay_ms * N`
        retry_base_delay_ms: u64 = 500,
        /// Safety margin applied on top of the gas estimate
        gas_margin_pct: u64 = 20,
        tx_log_file: String = "logs/tx_log.json".to_string(),
    }
}

config_struct! {
    pub struct NonceConfig {
        cache_file: String = "state/nonce_cache.json".to_string(),
        log_file: String = "logs/nonce_log.json".to_string(),
    }
}

config_struct! {
    pub struct KillSwitchConfig {
        /// Environment variable that triggers the switch when set to "1"
        env_var: String = "KILL_SWITCH".to_string(),
        /// Flag file; overridden by KILL_SWITCH_FLAG_FILE when set
        flag_file: String = "flags/kill_switch.txt".to_string(),
        log_file: String = "logs/kill_log.json".to_string(),
    }
}

// ============================================================================
// RISK AGENTS
// ============================================================================

config_struct! {
    pub struct CapitalConfig {
        enabled: bool = true,
        starting_capital_usd: f64 = 0.0,
        max_drawdown_pct: f64 = 5.0,
        max_loss_usd: f64 = 100.0,
    }
}

config_struct! {
    pub struct OpsConfig {
        /// Alert webhook; OPS_ALERT_WEBHOOK takes precedence when set
        alert_webhook: Option<String> = None,
        notify_timeout_secs: u64 = 5,
    }
}

config_struct! {
    pub struct FounderConfig {
        token_env: String = "FOUNDER_TOKEN".to_string(),
        token_file: String = "founder.token".to_string(),
        /// Live mode requires a `live_trading` approval token
        require_for_live: bool = true,
    }
}

// ============================================================================
// DISASTER RECOVERY
// ============================================================================

config_struct! {
    pub struct DrpConfig {
        export_dir: String = "export".to_string(),
        /// Directories bundled into each snapshot, relative to the base directory
        include_dirs: Vec<String> = vec![
            "logs".to_string(),
            "state".to_string(),
            "active".to_string(),
        ],
        export_log_file: String = "logs/export_log.json".to_string(),
        rollback_log_file: String = "logs/rollback_log.json".to_string(),
        /// Environment variable holding the archive encryption passphrase
        encryption_key_env: String = "DRP_ENC_KEY".to_string(),
        /// Staleness window before auto-recovery triggers a rollback
        recover_timeout_secs: u64 = 3600,
        /// Upper bound for external export/rollback procedures
        procedure_timeout_secs: u64 = 60,
        /// External export command; empty means the in-process exporter
        export_command: Vec<String> = Vec::new(),
        /// External rollback command; empty means the in-process restorer
        rollback_command: Vec<String> = Vec::new(),
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

config_struct! {
    pub struct OrchestratorConfig {
        /// "live" or "dry-run"
        mode: String = "dry-run".to_string(),
        interval_secs: u64 = 5,
        wallet_address: String = String::new(),
        enabled_strategies: Vec<String> = Vec::new(),
        /// Per-strategy parameter tables keyed by strategy id
        strategy_params: toml::Table = toml::Table::new(),
    }
}

// ============================================================================
// ROOT
// ============================================================================

config_struct! {
    pub struct Config {
        rpc: RpcConfig = RpcConfig::default(),
        tx: TxConfig = TxConfig::default(),
        nonce: NonceConfig = NonceConfig::default(),
        kill_switch: KillSwitchConfig = KillSwitchConfig::default(),
        capital: CapitalConfig = CapitalConfig::default(),
        ops: OpsConfig = OpsConfig::default(),
        founder: FounderConfig = FounderConfig::default(),
        drp: DrpConfig = DrpConfig::default(),
        orchestrator: OrchestratorConfig = OrchestratorConfig::default(),
    }
}

impl OrchestratorConfig {
    pub fn is_live(&self) -> bool {
        self.mode.eq_ignore_ascii_case("live")
    }
}
