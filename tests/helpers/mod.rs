use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

/// Creates a temporary directory and returns it with its UTF-8 path.
#[allow(dead_code)]
pub fn utf8_tempdir() -> (TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("temp dir path is UTF-8");
    (dir, path)
}

/// Writes `content` to `path`, creating parent directories.
#[allow(dead_code)]
pub fn write_file(path: &Utf8Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create parent directory");
    }
    fs::write(path, content).expect("failed to write file");
}

/// Creates `roles/<name>/tasks/main.yml` under `base` and returns the roles directory.
#[allow(dead_code)]
pub fn write_role(base: &Utf8Path, name: &str) -> Utf8PathBuf {
    let roles = base.join("roles");
    write_file(
        &roles.join(name).join("tasks/main.yml"),
        &format!("- name: {name}\n  debug:\n    msg: {name}\n"),
    );
    roles
}

/// Writes a profile next to a `roles/` directory and returns its path.
#[allow(dead_code)]
pub fn write_profile(base: &Utf8Path, yaml: &str) -> Utf8PathBuf {
    let path = base.join("profile.yml");
    write_file(&path, yaml);
    path
}
