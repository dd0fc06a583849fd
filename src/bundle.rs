//! Inline bundle packing.
//!
//! A bundle is a gzip-compressed tar of the playbook, the optional
//! requirements manifest and every role file, encoded as base64 so it can be
//! embedded in a boot script. Entry metadata is fixed (mode 0644, owner 0,
//! mtime 0) and the gzip header carries no timestamp, so identical inputs
//! always produce byte-identical output.

use std::fs;
use std::io::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::{Compression, GzBuilder};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::error::BootstrapError;
use crate::roles::RoleFiles;
use crate::script::build_remote_path_init_command;

/// Archive name of the playbook.
pub const PLAYBOOK_FILE: &str = "main.yml";

/// Archive name of the requirements manifest.
pub const REQUIREMENTS_FILE: &str = "requirements.yml";

/// Ordered archive entries.
///
/// Entries are packed in insertion order. Pushing a name that already exists
/// replaces its content without moving it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleFiles {
    entries: Vec<(String, Vec<u8>)>,
}

impl BundleFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) {
        let name = name.into();
        let content = content.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = content,
            None => self.entries.push((name, content)),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, content)| content.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(name, content)| (name.as_str(), content.as_slice()))
    }
}

/// Collects the playbook, the requirements manifest and the role files.
///
/// Role files are read to completion in key order; symlinks are read through
/// to their targets.
pub fn build_bundle_files(
    playbook_yaml: &str,
    requirements_yaml: Option<&str>,
    role_files: &RoleFiles,
) -> Result<BundleFiles, BootstrapError> {
    let mut files = BundleFiles::new();
    files.push(PLAYBOOK_FILE, playbook_yaml);
    if let Some(requirements) = requirements_yaml {
        files.push(REQUIREMENTS_FILE, requirements);
    }

    for (key, role_file) in role_files {
        let content = fs::read(&role_file.absolute_file_location).map_err(|e| {
            BootstrapError::io(
                format!("failed to read role file: {}", role_file.absolute_file_location),
                e,
            )
        })?;
        trace!("bundling {} ({} bytes)", key, content.len());
        files.push(key.as_str(), content);
    }

    Ok(files)
}

/// Packs the entries into a gzip-compressed tar and returns it base64 encoded.
pub fn build_tar_data(files: &BundleFiles) -> Result<String, BootstrapError> {
    let encoder = GzBuilder::new()
        .mtime(0)
        .write(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, content) in files.iter() {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(0);
        builder
            .append_data(&mut header, name, content)
            .map_err(|e| BootstrapError::io(format!("failed to append {} to bundle", name), e))?;
    }

    let mut encoder = builder
        .into_inner()
        .map_err(|e| BootstrapError::io("failed to finalize bundle archive", e))?;
    encoder
        .flush()
        .map_err(|e| BootstrapError::io("failed to flush bundle archive", e))?;
    let compressed = encoder
        .finish()
        .map_err(|e| BootstrapError::io("failed to compress bundle archive", e))?;

    debug!("packed {} file(s) into {} compressed bytes", files.len(), compressed.len());
    Ok(STANDARD.encode(compressed))
}

/// Builds the commands that unpack an encoded bundle into `remote_path`.
pub fn build_tar_extract_command(remote_path: &str, b64data: &str) -> String {
    format!(
        "{}echo -n '{b64data}' | base64 -d | tar -z -x -C \"{remote_path}\" -f -\n",
        build_remote_path_init_command(remote_path)
    )
}

/// Hex SHA-256 of an encoded bundle.
pub fn bundle_fingerprint(b64data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b64data.as_bytes());
    format!("{:x}", hasher.finalize())
}
