//! QuickPoll backend: poll storage and REST handlers in front of a
//! real-time fan-out core, plus the reconnecting client used to consume it.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod polls;
pub mod realtime;
pub mod startup;
