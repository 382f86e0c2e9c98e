#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(clippy::use_self, rust_2018_idioms)]
#![allow(clippy::multiple_crate_versions, clippy::module_name_repetitions)]

//! Fixed and interval alarms that survive restarts: alarms are kept in a
//! TOML table, their wake-ups in a second table that the `run` daemon
//! watches and rings from.

pub mod alarm;
/// validated construction of alarms from user input
pub mod alarm_edit;
pub mod communication;
pub mod config;
pub mod daemon;
mod disk;
pub mod error;
pub mod logging;
pub mod power;
pub mod receiver;
pub mod ringing;
pub mod schedule;
pub mod store;
pub mod view_model;
pub mod wakeup;

#[cfg(test)]
mod testing;

pub use alarm::{Alarm, AlarmId, AlarmKind};
pub use alarm_edit::AlarmBuilder;
pub use config::Config;
pub use error::{Error, Result};
pub use view_model::{AlarmViewModel, Pending};
