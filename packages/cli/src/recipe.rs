// ABOUTME: Build recipe discovery in the operator's directory
// ABOUTME: Candidates are compared by exact file name; patterns are never glob-expanded

use sndbx_config::constants::RECIPE_CANDIDATES;
use std::fs;
use std::io;
use std::path::Path;

/// First recipe candidate present in `dir`, in candidate order
///
/// `Dockerfile.*` only matches a file literally named `Dockerfile.*`.
pub fn find_recipe(dir: &Path) -> io::Result<Option<String>> {
    let names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| !t.is_dir()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();

    Ok(RECIPE_CANDIDATES
        .iter()
        .find(|candidate| names.iter().any(|name| name == *candidate))
        .map(|candidate| candidate.to_string()))
}
