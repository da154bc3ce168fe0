// ABOUTME: Operator-side helpers for the sndbx command line
// ABOUTME: Recipe discovery, env declaration parsing, port parsing, console output and logging

pub mod env_file;
pub mod logging;
pub mod ports;
pub mod recipe;
pub mod reporter;
