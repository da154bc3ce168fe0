// ABOUTME: Environment variable name constants and naming defaults
// ABOUTME: Centralized definitions of every name sndbx reads from the environment or stamps on resources

// Logging
pub const SNDBX_LOG: &str = "SNDBX_LOG";

// Naming and container layout overrides
pub const SNDBX_NAME_PREFIX: &str = "SNDBX_NAME_PREFIX";
pub const SNDBX_CONTAINER_WORKDIR: &str = "SNDBX_CONTAINER_WORKDIR";
pub const SNDBX_SHELL: &str = "SNDBX_SHELL";

// Defaults used when the overrides above are unset
pub const DEFAULT_NAME_PREFIX: &str = "sndbx";
pub const DEFAULT_CONTAINER_WORKDIR: &str = "/app";
pub const DEFAULT_SHELL: &str = "/bin/sh";
pub const DEFAULT_LOG_FILTER: &str = "warn";

// Ownership labels stamped on every container and network
pub const LABEL_CREATED_BY: &str = "created_by";
pub const LABEL_APP: &str = "app";
pub const LABEL_SESSION: &str = "sndbx.session";
pub const LABEL_VALUE: &str = "sndbx";

// Recipe lookup candidates, matched by exact name
pub const RECIPE_CANDIDATES: &[&str] = &["Dockerfile", "Dockerfile.*"];

// Images suggested when no remote image is given
pub const SUGGESTED_ENVIRONMENTS: &[&str] = &[
    "ubuntu:latest",
    "debian:latest",
    "alpine:latest",
    "centos:latest",
    "fedora:latest",
];
