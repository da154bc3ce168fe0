// ABOUTME: Shared configuration surface for sndbx packages
// ABOUTME: Exposes environment variable names, naming defaults and env parsing helpers

pub mod constants;
pub mod env;
