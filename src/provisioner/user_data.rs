//! Inline-bundle delivery.
//!
//! The playbook, requirements and role files are packed into a base64
//! tarball that is embedded directly in the boot script.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{PLAYBOOK_ID, ProvisionContext, ProvisionerConfig};
use crate::bundle::{build_bundle_files, build_tar_data, build_tar_extract_command, bundle_fingerprint};
use crate::error::BootstrapError;
use crate::script::{
    BASH_HEADER, Backoff, RunCommand, STRICT_MODE, WITH_BACKOFF_DEFINITION, build_run_command,
    concat_commands,
};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct UserDataConfig {
    #[serde(flatten)]
    pub common: ProvisionerConfig,
}

/// Boot script with the embedded bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct UserDataPayload {
    pub user_data: String,
    /// Base64 gzip tarball embedded in `user_data`.
    pub tar_data: String,
    /// Hex SHA-256 of `tar_data`.
    pub fingerprint: String,
    /// Archive entry names in pack order.
    pub files: Vec<String>,
}

pub fn build_user_data(
    config: &UserDataConfig,
    ctx: &ProvisionContext<'_>,
) -> Result<UserDataPayload, BootstrapError> {
    let common = &config.common;
    let remote_path = common.remote_path();

    let playbook = common.playbook_yaml(ctx.instance_name)?;
    let requirements = common.requirements_yaml()?;
    let role_files = common.gather_role_files()?;
    let files = build_bundle_files(&playbook, requirements.as_deref(), &role_files)?;
    let tar_data = build_tar_data(&files)?;
    let fingerprint = bundle_fingerprint(&tar_data);
    debug!("bundle fingerprint for {}: {}", ctx.instance_name, fingerprint);

    let user_data = concat_commands([
        Some(BASH_HEADER.to_string()),
        Some(STRICT_MODE.to_string()),
        Some(WITH_BACKOFF_DEFINITION.to_string()),
        Some(common.install_command(ctx.ami).to_string()),
        common.set_hostname_command(ctx.default_hostname),
        Some(build_tar_extract_command(remote_path, &tar_data)),
        Some(build_run_command(&RunCommand {
            remote_path,
            id: PLAYBOOK_ID,
            backoff: Backoff::Disabled,
        })),
    ]);

    Ok(UserDataPayload {
        user_data,
        files: files.names().map(str::to_string).collect(),
        tar_data,
        fingerprint,
    })
}
