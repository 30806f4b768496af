pub mod config;
pub mod control;
pub mod death;
pub mod detect;
pub mod error;
pub mod explore;
pub mod logger;
pub mod platform;
pub mod probes;
pub mod sleep;
pub mod state;
pub mod switch;
pub mod tracker;
pub mod types;
pub mod worker;
pub mod zone;

#[cfg(test)]
mod fakes;
