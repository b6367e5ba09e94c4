//! Filesystem helpers for Tabula artefacts, built on `cap-std` and `camino`.
//!
//! Each helper splits its target into an ambient parent directory and a file
//! name, then performs the operation through the directory capability.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use std::io;
use std::path::Component;

/// Create (or truncate) the file at `path` for writing.
pub fn create_file(path: &Utf8Path) -> io::Result<fs_utf8::File> {
    let (dir, name) = parent_and_name(path)?;
    dir.create(name.as_str())
}

/// Replace the contents of the file at `path` with `contents`.
pub fn write_text(path: &Utf8Path, contents: &str) -> io::Result<()> {
    let (dir, name) = parent_and_name(path)?;
    dir.write(name.as_str(), contents)
}

/// Read the file at `path` as UTF-8 text.
pub fn read_text(path: &Utf8Path) -> io::Result<String> {
    let (dir, name) = parent_and_name(path)?;
    dir.read_to_string(name.as_str())
}

/// Whether `path` names an existing regular file.
///
/// A missing parent directory or file is reported as `NotFound`.
pub fn is_file(path: &Utf8Path) -> io::Result<bool> {
    let (dir, name) = parent_and_name(path)?;
    dir.metadata(name.as_str()).map(|meta| meta.is_file())
}

/// Create `path` and any missing ancestors as directories.
pub fn ensure_dir(path: &Utf8Path) -> io::Result<()> {
    if path.as_str().is_empty() {
        return Ok(());
    }
    let (root, relative) = ambient_root(path)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }
    root.create_dir_all(&relative)
}

fn parent_and_name(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::other(format!("{path} does not name a file")))?
        .to_owned();
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, name))
}

/// Open the root a path hangs from (filesystem root, drive prefix or the
/// working directory) and return the remainder relative to it.
fn ambient_root(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_path = path.as_std_path();
    let base = match std_path.components().next() {
        Some(Component::Prefix(prefix)) => {
            let prefix = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;
            Utf8PathBuf::from(prefix).join(std::path::MAIN_SEPARATOR.to_string())
        }
        Some(Component::RootDir) => Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string()),
        _ => Utf8PathBuf::from("."),
    };
    let relative = if base.as_str() == "." {
        path.to_path_buf()
    } else {
        path.strip_prefix(&base)
            .map_err(|_| io::Error::other(format!("failed to strip {base} from {path}")))?
            .to_path_buf()
    };
    let dir = fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?;
    Ok((dir, relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::io::Write;
    use tempfile::TempDir;

    #[fixture]
    fn workspace() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 tempdir");
        (dir, root)
    }

    #[rstest]
    fn created_files_are_writable(workspace: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = workspace;
        let target = root.join("out.csv");
        let mut file = create_file(&target).expect("create file");
        file.write_all(b"a,b\n").expect("write file");
        drop(file);
        assert_eq!(std::fs::read_to_string(&target).expect("read back"), "a,b\n");
        assert!(is_file(&target).expect("inspect file"));
    }

    #[rstest]
    fn nested_directories_are_created(workspace: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = workspace;
        let nested = root.join("a/b/c");
        ensure_dir(&nested).expect("create nested dirs");
        write_text(&nested.join("bounds.txt"), "minLatitude=1\n").expect("write text");
        assert_eq!(
            read_text(&nested.join("bounds.txt")).expect("read text"),
            "minLatitude=1\n"
        );
    }

    #[rstest]
    fn missing_files_report_not_found(workspace: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = workspace;
        let err = is_file(&root.join("absent/file.pbf")).expect_err("parent is missing");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!is_file(&root).expect("root is a directory"));
    }
}
