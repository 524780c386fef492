pub mod actor;
pub mod check;
pub mod config;
pub mod constants;
pub mod error;
pub mod incident;
pub mod target;
pub mod types;
pub mod wallet;

pub use actor::*;
pub use check::*;
pub use config::*;
pub use constants::*;
pub use error::VigilError;
pub use incident::*;
pub use target::*;
pub use types::*;
pub use wallet::*;
