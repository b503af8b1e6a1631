//! Tabular value learning layered over the network's decisions

mod persistence;
mod state;
mod table;

pub use persistence::{ValueRecord, load_table, save_table};
pub use state::{ActionKey, ActionPattern, StateKey, state_key};
pub use table::{QEntry, QLearningConfig, QStats, QTable};
