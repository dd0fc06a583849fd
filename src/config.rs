//! Profile loading and validation.
//!
//! A profile describes one EC2 instance or launch template and how Ansible
//! reaches it. Profiles are YAML; relative paths inside them are resolved
//! against the profile's own directory when loaded.

use std::fs::File;
use std::io::BufReader;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{debug, info, warn};

use crate::ami::{AmiConfig, AmiLookup, lookup_ami};
use crate::error::BootstrapError;
use crate::provisioner::{self, AnsibleMethod, Payload, ProvisionContext, s3};
use crate::tags::Tags;

const HOSTNAME_PATTERN: &str =
    r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$";

const MAX_HOSTNAME_LEN: usize = 253;

/// Characters that would break out of the double-quoted remote path.
const REMOTE_PATH_FORBIDDEN: [char; 6] = ['"', '$', '`', '\\', '\n', '\r'];

/// What kind of EC2 resource the profile describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Target {
    #[default]
    Instance,
    /// Shared by many instances; has no hostname of its own.
    LaunchTemplate,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    /// Instance name.
    pub name: String,
    /// DNS hostname; takes precedence over `name` as the default hostname.
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub target: Target,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub ami: AmiConfig,
    pub ansible: AnsibleMethod,
}

impl Profile {
    /// Hostname applied when `set_hostname` does not name one.
    ///
    /// Launch templates have none, so they never set a hostname.
    pub fn default_hostname(&self) -> Option<&str> {
        match self.target {
            Target::Instance => Some(self.hostname.as_deref().unwrap_or(&self.name)),
            Target::LaunchTemplate => None,
        }
    }

    pub fn ami_lookup(&self) -> AmiLookup {
        lookup_ami(&self.ami)
    }

    pub fn context<'a>(&'a self, ami: &'a AmiLookup) -> ProvisionContext<'a> {
        ProvisionContext {
            instance_name: &self.name,
            default_hostname: self.default_hostname(),
            ami,
            tags: &self.tags,
        }
    }

    /// Assembles the payload for the profile's delivery method.
    pub fn assemble(&self) -> Result<Payload, BootstrapError> {
        let ami = self.ami_lookup();
        provisioner::assemble(&self.ansible, &self.context(&ami))
    }

    /// Validates the profile configuration.
    pub fn validate(&self) -> Result<(), BootstrapError> {
        if self.name.trim().is_empty() {
            return Err(BootstrapError::Validation("name must not be empty".to_string()));
        }

        let hostname_pattern = Regex::new(HOSTNAME_PATTERN)
            .map_err(|e| BootstrapError::Validation(format!("invalid hostname pattern: {}", e)))?;
        let check_hostname = |field: &str, value: &str| {
            if value.len() > MAX_HOSTNAME_LEN || !hostname_pattern.is_match(value) {
                return Err(BootstrapError::Validation(format!(
                    "{} '{}' is not a valid hostname",
                    field, value
                )));
            }
            Ok(())
        };
        if let Some(hostname) = &self.hostname {
            check_hostname("hostname", hostname)?;
        }

        let common = self.ansible.common();
        common.reject_unknown_fields()?;
        if let Some(name) = common.set_hostname.explicit() {
            check_hostname("ansible.set_hostname", name)?;
            if self.target == Target::LaunchTemplate {
                warn!("ansible.set_hostname {} is ignored for launch template {}", name, self.name);
            }
        }

        let remote_path = common.remote_path();
        if !remote_path.starts_with('/') {
            return Err(BootstrapError::Validation(format!(
                "ansible.remote_path must be absolute: {}",
                remote_path
            )));
        }
        if remote_path.contains(REMOTE_PATH_FORBIDDEN) {
            return Err(BootstrapError::Validation(format!(
                "ansible.remote_path contains shell metacharacters: {:?}",
                remote_path
            )));
        }

        for role_path in &common.role_paths {
            if !role_path.is_dir() {
                return Err(BootstrapError::Validation(format!(
                    "role path does not exist or is not a directory: {}",
                    role_path
                )));
            }
        }

        common.playbook_spec()?;

        match &self.ansible {
            AnsibleMethod::UserData(_) => {}
            AnsibleMethod::S3UserData(config) => {
                let name = s3::resolve_bucket_name(&config.bucket, &self.name)?;
                s3::validate_bucket_name(&name)?;
                if config.create_role_policy == Some(true) && config.role.is_none() {
                    return Err(BootstrapError::Config(
                        "create_role_policy requires an IAM role".to_string(),
                    ));
                }
            }
            AnsibleMethod::RemoteSsh(config) => {
                if self.target == Target::LaunchTemplate {
                    return Err(BootstrapError::Validation(
                        "remote-ssh cannot be used with a launch template".to_string(),
                    ));
                }
                if config.connection.host.trim().is_empty() {
                    return Err(BootstrapError::Validation(
                        "ansible.connection.host must not be empty".to_string(),
                    ));
                }
                if let Some(identity_file) = &config.connection.identity_file {
                    if !identity_file.is_file() {
                        return Err(BootstrapError::Validation(format!(
                            "identity file not found: {}",
                            identity_file
                        )));
                    }
                }
            }
        }

        debug!("profile {} is valid", self.name);
        Ok(())
    }

    /// Resolves relative role paths and identity files against `base`.
    fn resolve_paths(&mut self, base: &Utf8Path) {
        let resolve = |path: &mut Utf8PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        let common = match &mut self.ansible {
            AnsibleMethod::UserData(config) => &mut config.common,
            AnsibleMethod::S3UserData(config) => &mut config.common,
            AnsibleMethod::RemoteSsh(config) => {
                if let Some(identity_file) = config.connection.identity_file.as_mut() {
                    resolve(identity_file);
                }
                &mut config.common
            }
        };
        common.role_paths.iter_mut().for_each(resolve);
    }
}

/// Loads a profile from a YAML file.
pub fn load_profile(path: &Utf8Path) -> Result<Profile, BootstrapError> {
    let file = File::open(path)
        .map_err(|e| BootstrapError::io(format!("failed to load file: {}", path), e))?;
    let reader = BufReader::new(file);
    let mut profile: Profile = serde_yaml::from_reader(reader)
        .map_err(|e| BootstrapError::Config(format!("failed to parse YAML {}: {}", path, e)))?;

    let base = path
        .parent()
        .filter(|p| !p.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    profile.resolve_paths(base);

    info!("loaded profile {} ({} via {})", profile.name, profile.target, profile.ansible.name());
    Ok(profile)
}
