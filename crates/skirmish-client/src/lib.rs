pub mod adapter;
pub mod net_client;

pub use adapter::{AdapterEvent, BattleAdapter, LocalBattle};
pub use net_client::{ClientError, PvpConnection};
