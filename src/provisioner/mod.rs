//! Delivery variants and payload assembly.
//!
//! An instance is provisioned through exactly one [`AnsibleMethod`]. Each
//! method has its own assembler module; [`assemble`] dispatches to them and
//! returns a [`Payload`] describing everything the method needs on the
//! target. Assembly is pure apart from reading role files from disk.

pub mod remote_ssh;
pub mod s3;
pub mod user_data;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::info;

use crate::ami::AmiLookup;
use crate::error::BootstrapError;
use crate::hostname::{SetHostname, make_set_hostname_command};
use crate::playbook::{PlaybookSpec, to_yaml};
use crate::roles::{RoleFiles, gather_role_files};
use crate::tags::Tags;

pub use remote_ssh::{
    ConnectionConfig, HostKeyChecking, RemoteSshConfig, RemoteSshPayload, SessionPlan,
    SessionStep, SshTarget, run_session,
};
pub use s3::{BucketConfig, BucketObject, BucketPlan, S3UserDataConfig, S3UserDataPayload};
pub use user_data::{UserDataConfig, UserDataPayload};

/// Default directory on the target for the playbook and role files.
pub const DEFAULT_REMOTE_PATH: &str = "/opt/ansible";

/// Playbook file stem used by every variant.
pub const PLAYBOOK_ID: &str = "main";

/// Settings shared by every delivery method.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProvisionerConfig {
    /// Role names for a generated playbook.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// Host directories holding role sources.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role_paths: Vec<Utf8PathBuf>,
    /// Variables for a generated playbook.
    #[serde(default, skip_serializing_if = "Mapping::is_empty")]
    pub vars: Mapping,
    /// Explicit playbook document, used instead of `roles`/`vars`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook: Option<Value>,
    /// Galaxy requirements written to `requirements.yml`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<String>,
    #[serde(default)]
    pub set_hostname: SetHostname,
    /// Custom hostname command with a `$hostname` placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_hostname_command: Option<String>,
    /// Overrides the AMI family's Ansible install command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_command: Option<String>,
    /// Keys not recognized by the method; rejected by validation.
    #[serde(flatten)]
    pub unknown: Mapping,
}

impl ProvisionerConfig {
    pub fn remote_path(&self) -> &str {
        self.remote_path.as_deref().unwrap_or(DEFAULT_REMOTE_PATH)
    }

    pub fn playbook_spec(&self) -> Result<PlaybookSpec, BootstrapError> {
        PlaybookSpec::from_parts(self.playbook.as_ref(), &self.roles, &self.vars)
    }

    pub fn playbook_yaml(&self, play_name: &str) -> Result<String, BootstrapError> {
        self.playbook_spec()?.to_yaml(play_name)
    }

    pub fn requirements_yaml(&self) -> Result<Option<String>, BootstrapError> {
        self.requirements.as_ref().map(to_yaml).transpose()
    }

    pub fn install_command<'a>(&'a self, ami: &'a AmiLookup) -> &'a str {
        self.install_command
            .as_deref()
            .unwrap_or(&ami.ansible_install_command)
    }

    pub fn set_hostname_command(&self, default_hostname: Option<&str>) -> Option<String> {
        make_set_hostname_command(
            &self.set_hostname,
            self.set_hostname_command.as_deref(),
            default_hostname,
        )
    }

    pub fn gather_role_files(&self) -> Result<RoleFiles, BootstrapError> {
        gather_role_files(&self.role_paths)
    }

    /// Fails when the method settings carried keys nothing consumed.
    pub fn reject_unknown_fields(&self) -> Result<(), BootstrapError> {
        if self.unknown.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = self
            .unknown
            .keys()
            .map(|key| match key.as_str() {
                Some(name) => name.to_string(),
                None => format!("{:?}", key),
            })
            .collect();
        Err(BootstrapError::Config(format!(
            "unknown field(s) under ansible: {}",
            keys.join(", ")
        )))
    }
}

/// How the playbook and its role files reach the target.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum AnsibleMethod {
    /// Everything embedded in instance user-data as a base64 tarball.
    UserData(UserDataConfig),
    /// Role files pulled from an S3 bucket at boot.
    S3UserData(S3UserDataConfig),
    /// Commands run over SSH against a reachable host.
    RemoteSsh(RemoteSshConfig),
}

impl AnsibleMethod {
    pub fn common(&self) -> &ProvisionerConfig {
        match self {
            Self::UserData(config) => &config.common,
            Self::S3UserData(config) => &config.common,
            Self::RemoteSsh(config) => &config.common,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UserData(_) => "user-data",
            Self::S3UserData(_) => "s3-user-data",
            Self::RemoteSsh(_) => "remote-ssh",
        }
    }
}

/// Instance-level inputs to assembly.
#[derive(Debug, Clone, Copy)]
pub struct ProvisionContext<'a> {
    /// Instance name; names the generated play and derives bucket names.
    pub instance_name: &'a str,
    /// Hostname used when the setting does not name one explicitly.
    pub default_hostname: Option<&'a str>,
    pub ami: &'a AmiLookup,
    pub tags: &'a Tags,
}

/// Assembled output of a delivery method.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    UserData(UserDataPayload),
    S3UserData(S3UserDataPayload),
    RemoteSsh(RemoteSshPayload),
}

impl Payload {
    /// The boot script, for methods that produce one.
    pub fn user_data(&self) -> Option<&str> {
        match self {
            Self::UserData(payload) => Some(&payload.user_data),
            Self::S3UserData(payload) => Some(&payload.user_data),
            Self::RemoteSsh(_) => None,
        }
    }
}

/// Builds the payload for the selected method.
pub fn assemble(method: &AnsibleMethod, ctx: &ProvisionContext<'_>) -> Result<Payload, BootstrapError> {
    info!("assembling {} payload for {}", method.name(), ctx.instance_name);
    let payload = match method {
        AnsibleMethod::UserData(config) => Payload::UserData(user_data::build_user_data(config, ctx)?),
        AnsibleMethod::S3UserData(config) => Payload::S3UserData(s3::build_payload(config, ctx)?),
        AnsibleMethod::RemoteSsh(config) => Payload::RemoteSsh(remote_ssh::build_payload(config, ctx)?),
    };
    Ok(payload)
}

/// Encodes a boot script for APIs that take base64 user-data.
pub fn user_data_base64(user_data: &str) -> String {
    STANDARD.encode(user_data.as_bytes())
}
