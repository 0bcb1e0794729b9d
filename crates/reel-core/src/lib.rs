pub mod config;
pub mod logging;

pub mod checksum;
pub mod control;
pub mod delivery;
pub mod job;
pub mod naming;
pub mod overlay;
pub mod planner;
pub mod probe;
pub mod progress;
pub mod remux;
pub mod retry;
pub mod storage;
pub mod tools;
pub mod transfer;
