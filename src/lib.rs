pub mod actions;
pub mod config;
pub mod connstring;
pub mod domain;
pub mod error;
pub mod monitor;
pub mod probe;
pub mod shell;
pub mod web;
