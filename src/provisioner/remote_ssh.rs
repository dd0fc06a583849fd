//! Direct-session delivery over SSH.
//!
//! Nothing is baked into the instance's boot sequence. Instead a
//! [`SessionPlan`] of self-contained bash scripts is run one by one against a
//! host that is already reachable.

use anyhow::Result;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{PLAYBOOK_ID, ProvisionContext, ProvisionerConfig};
use crate::bundle::{build_bundle_files, build_tar_data, build_tar_extract_command, bundle_fingerprint};
use crate::error::BootstrapError;
use crate::executor::{CommandExecutor, CommandSpec};
use crate::script::{
    Backoff, RunCommand, STRICT_MODE, WITH_BACKOFF_DEFINITION, build_run_command, concat_commands,
};

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

const CONNECT_TIMEOUT_SECS: u16 = 10;

/// Remote command for every step; the script itself arrives on stdin.
pub const REMOTE_SHELL: &str = "bash -s";

/// Host key verification policy passed to `ssh`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyChecking {
    /// Record unknown keys, reject changed ones.
    #[default]
    AcceptNew,
    /// Require the key to be in known_hosts already.
    Strict,
    /// Skip verification entirely.
    Off,
}

impl HostKeyChecking {
    fn option_value(self) -> &'static str {
        match self {
            Self::AcceptNew => "accept-new",
            Self::Strict => "yes",
            Self::Off => "no",
        }
    }
}

/// SSH connection settings from the profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    pub host: String,
    /// Login user. Defaults to the AMI family's default user.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub identity_file: Option<Utf8PathBuf>,
    #[serde(default)]
    pub host_key_checking: HostKeyChecking,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RemoteSshConfig {
    #[serde(flatten)]
    pub common: ProvisionerConfig,
    pub connection: ConnectionConfig,
}

/// A resolved SSH destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<Utf8PathBuf>,
    pub host_key_checking: HostKeyChecking,
}

impl SshTarget {
    pub fn from_connection(connection: &ConnectionConfig, default_user: &str) -> Self {
        Self {
            host: connection.host.clone(),
            user: connection
                .user
                .clone()
                .unwrap_or_else(|| default_user.to_string()),
            port: connection.port.unwrap_or(DEFAULT_SSH_PORT),
            identity_file: connection.identity_file.clone(),
            host_key_checking: connection.host_key_checking,
        }
    }

    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Builds the `ssh` invocation that runs `script` under bash on the target.
    ///
    /// The script is streamed over stdin, so the command line stays the same
    /// size however large the embedded bundle is. It is wrapped in a group
    /// that bash parses in full before running, with the group's own stdin
    /// redirected, so no command inside can consume the rest of the script.
    pub fn command_spec(&self, script: &str) -> CommandSpec {
        let mut args = vec![
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", CONNECT_TIMEOUT_SECS),
            "-o".to_string(),
            "ConnectionAttempts=1".to_string(),
            "-o".to_string(),
            format!("StrictHostKeyChecking={}", self.host_key_checking.option_value()),
        ];
        if self.host_key_checking == HostKeyChecking::Off {
            args.push("-o".to_string());
            args.push("UserKnownHostsFile=/dev/null".to_string());
        }
        args.push("-o".to_string());
        args.push("BatchMode=yes".to_string());
        if let Some(key) = &self.identity_file {
            args.push("-i".to_string());
            args.push(key.to_string());
            args.push("-o".to_string());
            args.push("IdentitiesOnly=yes".to_string());
        }
        args.push("--".to_string());
        args.push(self.destination());
        args.push(REMOTE_SHELL.to_string());

        let mut input = String::with_capacity(script.len() + 16);
        input.push_str("{\n");
        input.push_str(script);
        if !script.ends_with('\n') {
            input.push('\n');
        }
        input.push_str("} </dev/null\n");

        CommandSpec::new("ssh", args).with_stdin(input)
    }
}

/// A named script run as one SSH invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStep {
    pub name: String,
    pub script: String,
}

/// Ordered steps that provision a host over SSH.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPlan {
    pub steps: Vec<SessionStep>,
}

impl SessionPlan {
    fn push(&mut self, name: &str, body: &str) {
        self.steps.push(SessionStep {
            name: name.to_string(),
            script: concat_commands([Some(STRICT_MODE), Some(body)]),
        });
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSshPayload {
    pub plan: SessionPlan,
    pub target: SshTarget,
    /// Hex SHA-256 of the uploaded bundle.
    pub fingerprint: String,
}

/// Builds the install, set-hostname, upload and run steps.
pub fn build_session_plan(
    common: &ProvisionerConfig,
    ctx: &ProvisionContext<'_>,
) -> Result<(SessionPlan, String), BootstrapError> {
    let remote_path = common.remote_path();
    let playbook = common.playbook_yaml(ctx.instance_name)?;
    let requirements = common.requirements_yaml()?;
    let role_files = common.gather_role_files()?;
    let files = build_bundle_files(&playbook, requirements.as_deref(), &role_files)?;
    let tar_data = build_tar_data(&files)?;
    let fingerprint = bundle_fingerprint(&tar_data);

    let with_definition =
        |command: &str| concat_commands([Some(WITH_BACKOFF_DEFINITION), Some(command)]);

    let mut plan = SessionPlan::default();
    let install = common.install_command(ctx.ami);
    if !install.is_empty() {
        plan.push("install", &with_definition(install));
    }
    if let Some(hostname) = common.set_hostname_command(ctx.default_hostname) {
        plan.push("set-hostname", &with_definition(&hostname));
    }
    plan.push(
        "upload",
        &with_definition(&build_tar_extract_command(remote_path, &tar_data)),
    );
    plan.push(
        "run",
        &build_run_command(&RunCommand {
            remote_path,
            id: PLAYBOOK_ID,
            backoff: Backoff::Inline,
        }),
    );

    debug!("session plan steps: {:?}", plan.step_names());
    Ok((plan, fingerprint))
}

pub fn build_payload(
    config: &RemoteSshConfig,
    ctx: &ProvisionContext<'_>,
) -> Result<RemoteSshPayload, BootstrapError> {
    if config.connection.host.trim().is_empty() {
        return Err(BootstrapError::Validation(
            "connection.host must not be empty".to_string(),
        ));
    }
    let target = SshTarget::from_connection(&config.connection, &ctx.ami.default_username);
    let (plan, fingerprint) = build_session_plan(&config.common, ctx)?;
    Ok(RemoteSshPayload {
        plan,
        target,
        fingerprint,
    })
}

/// Runs each step over SSH, stopping at the first failure.
pub fn run_session(
    plan: &SessionPlan,
    target: &SshTarget,
    executor: &dyn CommandExecutor,
) -> Result<()> {
    for step in &plan.steps {
        info!("running step {} on {}", step.name, target.destination());
        let spec = target.command_spec(&step.script);
        let result = executor.execute(&spec)?;
        if !result.success() {
            let status = result
                .code()
                .map_or_else(|| "terminated by signal".to_string(), |code| format!("exit status: {}", code));
            return Err(BootstrapError::Execution {
                command: format!("ssh {} ({})", target.destination(), step.name),
                status,
            }
            .into());
        }
    }
    Ok(())
}
