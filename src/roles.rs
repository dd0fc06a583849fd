//! Role file gathering.
//!
//! Walks Ansible role directories on the host and keys every file by its
//! path relative to the parent of the declared root, so `roles/web` yields
//! keys like `web/tasks/main.yml` when declared as `roles/web`, and
//! `roles/web/tasks/main.yml` when declared as `roles`.

use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, trace};

use crate::error::BootstrapError;

/// A file collected from a role directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleFile {
    /// Final path component.
    pub file_name: String,
    /// Whether the entry itself is a symbolic link.
    pub is_symlink: bool,
    /// Location on the host, as walked from the declared root.
    pub absolute_file_location: Utf8PathBuf,
}

/// Role files keyed by relative path. Iteration order is key order.
pub type RoleFiles = BTreeMap<String, RoleFile>;

/// Recursively collects regular files and symlinks beneath each root.
///
/// Directories are descended into but not collected; symlinks to
/// directories are collected as entries and not followed. When two roots
/// produce the same key, the later root wins.
pub fn gather_role_files(role_paths: &[Utf8PathBuf]) -> Result<RoleFiles, BootstrapError> {
    let mut result = RoleFiles::new();

    for role_path in role_paths {
        let root: Utf8PathBuf = role_path.components().collect();
        let metadata = fs::metadata(&root)
            .map_err(|e| BootstrapError::io(format!("failed to read role path: {}", root), e))?;
        if !metadata.is_dir() {
            return Err(BootstrapError::Validation(format!(
                "role path is not a directory: {}",
                root
            )));
        }

        let prefix = root.parent().unwrap_or(Utf8Path::new(""));
        let mut walked = Vec::new();
        walk(&root, &mut walked)?;
        debug!("gathered {} file(s) from role path {}", walked.len(), root);

        for (path, is_symlink) in walked {
            let key = path
                .strip_prefix(prefix)
                .unwrap_or(&path)
                .as_str()
                .trim_start_matches('/')
                .to_string();
            let file_name = path.file_name().unwrap_or_default().to_string();
            if let Some(previous) = result.get(&key) {
                trace!(
                    "role file {} from {} replaces {}",
                    key, path, previous.absolute_file_location
                );
            }
            result.insert(
                key,
                RoleFile {
                    file_name,
                    is_symlink,
                    absolute_file_location: path,
                },
            );
        }
    }

    Ok(result)
}

/// Depth-first walk in sorted name order.
fn walk(dir: &Utf8Path, files: &mut Vec<(Utf8PathBuf, bool)>) -> Result<(), BootstrapError> {
    let read_dir = dir
        .read_dir_utf8()
        .map_err(|e| BootstrapError::io(format!("failed to read directory: {}", dir), e))?;
    let mut entries = read_dir
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| BootstrapError::io(format!("failed to read directory entry in {}", dir), e))?;
    entries.sort_by(|a, b| a.file_name().cmp(b.file_name()));

    for entry in entries {
        let path = entry.path().to_path_buf();
        let file_type = entry
            .file_type()
            .map_err(|e| BootstrapError::io(format!("failed to read file type: {}", path), e))?;

        if file_type.is_dir() {
            walk(&path, files)?;
        } else if file_type.is_file() || file_type.is_symlink() {
            files.push((path, file_type.is_symlink()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8(path: &std::path::Path) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path.to_path_buf()).expect("path should be valid UTF-8")
    }

    fn write(path: &Utf8Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn keys_keep_root_directory_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = utf8(temp_dir.path());
        write(&base.join("roles/web/tasks/main.yml"), "- debug: msg=hi\n");
        write(&base.join("roles/web/templates/index.html.j2"), "<h1/>\n");
        fs::create_dir_all(base.join("roles/empty/dir")).unwrap();

        let files = gather_role_files(&[base.join("roles")]).unwrap();

        let keys: Vec<&str> = files.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["roles/web/tasks/main.yml", "roles/web/templates/index.html.j2"]);
        let main = &files["roles/web/tasks/main.yml"];
        assert_eq!(main.file_name, "main.yml");
        assert!(!main.is_symlink);
        assert_eq!(main.absolute_file_location, base.join("roles/web/tasks/main.yml"));
    }

    #[test]
    fn trailing_slash_is_normalized() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = utf8(temp_dir.path());
        write(&base.join("roles/db/tasks/main.yml"), "[]\n");

        let root = Utf8PathBuf::from(format!("{}/roles/", base));
        let files = gather_role_files(&[root]).unwrap();

        assert!(files.contains_key("roles/db/tasks/main.yml"));
    }

    #[test]
    fn later_root_wins_on_collision() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = utf8(temp_dir.path());
        write(&base.join("a/roles/web/tasks/main.yml"), "first\n");
        write(&base.join("b/roles/web/tasks/main.yml"), "second\n");
        write(&base.join("a/roles/web/vars/main.yml"), "only-a\n");

        let files = gather_role_files(&[base.join("a/roles"), base.join("b/roles")]).unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(
            files["roles/web/tasks/main.yml"].absolute_file_location,
            base.join("b/roles/web/tasks/main.yml")
        );
        assert_eq!(
            files["roles/web/vars/main.yml"].absolute_file_location,
            base.join("a/roles/web/vars/main.yml")
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_collected_not_followed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = utf8(temp_dir.path());
        write(&base.join("shared/defaults.yml"), "x: 1\n");
        write(&base.join("roles/web/tasks/main.yml"), "[]\n");
        std::os::unix::fs::symlink(base.join("shared/defaults.yml"), base.join("roles/web/defaults.yml"))
            .unwrap();
        std::os::unix::fs::symlink(base.join("shared"), base.join("roles/web/shared")).unwrap();

        let files = gather_role_files(&[base.join("roles")]).unwrap();

        assert!(files["roles/web/defaults.yml"].is_symlink);
        assert!(files["roles/web/shared"].is_symlink);
        assert!(!files.contains_key("roles/web/shared/defaults.yml"));
    }

    #[test]
    fn missing_root_fails() {
        let result = gather_role_files(&[Utf8PathBuf::from("/non/existent/roles")]);
        let err = result.unwrap_err();
        assert!(matches!(err, BootstrapError::Io { .. }));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn file_root_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = utf8(temp_dir.path());
        write(&base.join("site.yml"), "[]\n");

        let err = gather_role_files(&[base.join("site.yml")]).unwrap_err();
        assert!(matches!(err, BootstrapError::Validation(_)));
    }
}
