pub mod db;
pub mod ports;

pub use db::MonitorDb;
pub use ports::{
    AlertLedger, CheckStore, CooldownStore, IncidentStore, TargetStore, WalletStore,
};
