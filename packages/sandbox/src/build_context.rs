// ABOUTME: Build context archiving for image builds
// ABOUTME: Packs a directory tree into an in-memory tar with paths relative to its root

use std::fs;
use std::io;
use std::path::Path;
use tar::Builder;

/// Tar every file below `dir`, named relative to `dir`
///
/// Directories are implied by their files; symlinks are stored as links.
pub fn archive_directory(dir: &Path) -> io::Result<Vec<u8>> {
    let mut archive = Builder::new(Vec::new());
    archive.follow_symlinks(false);

    append_tree(&mut archive, dir, Path::new(""))?;

    archive.into_inner()
}

fn append_tree(archive: &mut Builder<Vec<u8>>, root: &Path, relative: &Path) -> io::Result<()> {
    let mut entries = fs::read_dir(root.join(relative))?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = relative.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            append_tree(archive, root, &name)?;
        } else {
            archive.append_path_with_name(entry.path(), &name)?;
        }
    }

    Ok(())
}
