//! Composition root for revmon: configuration, the HTTP trigger and admin
//! API, the periodic run scheduler and the CLI subcommands.

pub mod api;
pub mod app;
pub mod bootstrap;
pub mod config;
pub mod logging;
pub mod rule_seed;
pub mod scheduler;
pub mod state;
