/// Log tags identify the subsystem a message comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Nonce,
    KillSwitch,
    Capital,
    Gate,
    Founder,
    Ops,
    Drp,
    Tx,
    Chain,
    Notify,
    Orchestrator,
}

impl LogTag {
    /// Plain label used in the log file and console column
    pub fn to_plain_string(&self) -> &'static str {
        match self {
            LogTag::System => "SYSTEM",
            LogTag::Config => "CONFIG",
            LogTag::Nonce => "NONCE",
            LogTag::KillSwitch => "KILLSW",
            LogTag::Capital => "CAPITAL",
            LogTag::Gate => "GATE",
            LogTag::Founder => "FOUNDER",
            LogTag::Ops => "OPS",
            LogTag::Drp => "DRP",
            LogTag::Tx => "TX",
            LogTag::Chain => "CHAIN",
            LogTag::Notify => "NOTIFY",
            LogTag::Orchestrator => "ORCH",
        }
    }

    /// Key matched against --debug <key> flags
    pub fn to_debug_key(&self) -> String {
        match self {
            LogTag::KillSwitch => "kill-switch".to_string(),
            other => other.to_plain_string().to_lowercase(),
        }
    }

    pub fn all() -> &'static [LogTag] {
        &[
            LogTag::System,
            LogTag::Config,
            LogTag::Nonce,
            LogTag::KillSwitch,
            LogTag::Capital,
            LogTag::Gate,
            LogTag::Founder,
            LogTag::Ops,
            LogTag::Drp,
            LogTag::Tx,
            LogTag::Chain,
            LogTag::Notify,
            LogTag::Orchestrator,
        ]
    }
}
