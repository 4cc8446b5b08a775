pub(crate) mod bootstrap;
mod config;
mod demo;
mod events;
pub(crate) mod loop_runner;
