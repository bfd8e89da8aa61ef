pub mod builder;
pub mod kill_switch;
pub mod nonce_manager;
pub mod types;

pub use builder::TransactionBuilder;
pub use kill_switch::{KillSource, KillSwitch};
pub use nonce_manager::NonceManager;
pub use types::{TxContext, TxRecord, TxStatus};
