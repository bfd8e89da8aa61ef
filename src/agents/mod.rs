//! Risk agents and the composite gate
//!
//! Each agent owns one signal and publishes it to the shared [`GateState`];
//! the [`Gatekeeper`] composes them with the kill switch.

pub mod capital_lock;
pub mod drp_agent;
pub mod founder_gate;
pub mod gatekeeper;
pub mod ops_agent;
pub mod state;

pub use capital_lock::{CapitalLock, CapitalSnapshot};
pub use drp_agent::DrpAgent;
pub use founder_gate::FounderGate;
pub use gatekeeper::{GateDecision, GateFailure, Gatekeeper, PauseSignal, RecoveryReadiness, TradeGate};
pub use ops_agent::{HealthCheck, OpsAgent};
pub use state::GateState;
