pub mod ami;
pub mod bundle;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod hostname;
pub mod playbook;
pub mod provisioner;
pub mod roles;
pub mod script;
pub mod tags;

pub use error::BootstrapError;

use std::fs;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter};

use crate::ami::{AmiFamily, DescribeImagesOutput, Image, lookup_ami, select_image};
use crate::config::{Profile, Target};
use crate::executor::CommandExecutor;
use crate::provisioner::{Payload, run_session, user_data_base64};

pub fn init_logging(log_level: cli::LogLevel) -> Result<()> {
    let filter = match log_level {
        cli::LogLevel::Trace => LevelFilter::TRACE,
        cli::LogLevel::Debug => LevelFilter::DEBUG,
        cli::LogLevel::Info => LevelFilter::INFO,
        cli::LogLevel::Warn => LevelFilter::WARN,
        cli::LogLevel::Error => LevelFilter::ERROR,
    };

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_max_level(filter)
            .with_writer(std::io::stderr)
            .finish(),
    )
    .context("failed to set global default tracing subscriber")
}

fn load_valid_profile(path: &Utf8Path) -> Result<Profile> {
    let profile = config::load_profile(path)
        .with_context(|| format!("failed to load profile from {}", path))?;
    profile.validate().context("profile validation failed")?;
    Ok(profile)
}

/// Writes `content` to `output`, or to stdout when no path is given.
fn emit(content: &str, output: Option<&Utf8Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, content)
                .map_err(|e| BootstrapError::io(format!("failed to write output: {}", path), e))?;
            info!("wrote {}", path);
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(content.as_bytes())
                .context("failed to write to stdout")?;
            stdout.flush().context("failed to flush stdout")?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct BundleManifest<'a> {
    method: &'a str,
    fingerprint: &'a str,
    files: &'a [String],
}

#[derive(Serialize)]
struct SessionManifest<'a> {
    method: &'a str,
    destination: String,
    fingerprint: &'a str,
    steps: Vec<&'a str>,
}

fn manifest_yaml(payload: &Payload) -> Result<String, BootstrapError> {
    match payload {
        Payload::UserData(payload) => playbook::to_yaml(&BundleManifest {
            method: "user-data",
            fingerprint: &payload.fingerprint,
            files: &payload.files,
        }),
        Payload::S3UserData(payload) => playbook::to_yaml(&payload.bucket),
        Payload::RemoteSsh(payload) => playbook::to_yaml(&SessionManifest {
            method: "remote-ssh",
            destination: payload.target.destination(),
            fingerprint: &payload.fingerprint,
            steps: payload.plan.step_names(),
        }),
    }
}

/// Renders the profile's user data, session scripts or manifest.
pub fn run_render(opts: &cli::RenderArgs) -> Result<()> {
    let profile = load_valid_profile(&opts.common.file)?;
    let payload = profile
        .assemble()
        .with_context(|| format!("failed to assemble payload for {}", profile.name))?;

    let rendered = if opts.manifest {
        manifest_yaml(&payload)?
    } else {
        match &payload {
            Payload::RemoteSsh(payload) => payload
                .plan
                .steps
                .iter()
                .map(|step| format!("# step: {}\n{}", step.name, step.script))
                .collect::<Vec<_>>()
                .join("\n"),
            Payload::UserData(_) | Payload::S3UserData(_) => {
                let user_data = payload.user_data().unwrap_or_default();
                if opts.base64 || profile.target == Target::LaunchTemplate {
                    format!("{}\n", user_data_base64(user_data))
                } else {
                    user_data.to_string()
                }
            }
        }
    };

    emit(&rendered, opts.output.as_deref())
}

/// Provisions the profile's host over SSH.
pub fn run_apply(opts: &cli::ApplyArgs, executor: Arc<dyn CommandExecutor>) -> Result<()> {
    let profile = load_valid_profile(&opts.common.file)?;
    let payload = profile
        .assemble()
        .with_context(|| format!("failed to assemble payload for {}", profile.name))?;

    let Payload::RemoteSsh(payload) = payload else {
        anyhow::bail!(
            "apply requires method remote-ssh, but profile {} uses {}; use render instead",
            profile.name,
            profile.ansible.name()
        );
    };

    info!(
        "provisioning {} with {} step(s), bundle {}",
        payload.target.destination(),
        payload.plan.steps.len(),
        payload.fingerprint
    );
    run_session(&payload.plan, &payload.target, executor.as_ref())
        .with_context(|| format!("failed to provision {}", payload.target.destination()))?;
    info!("provisioning completed successfully");
    Ok(())
}

pub fn run_validate(opts: &cli::ValidateArgs) -> Result<()> {
    let profile = load_valid_profile(&opts.common.file)?;
    info!("validation successful:\n{:#?}", profile);
    Ok(())
}

#[derive(Serialize)]
struct AmiReport<'a> {
    #[serde(flatten)]
    lookup: &'a ami::AmiLookup,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<Image>,
}

/// Prints the AMI lookup, optionally resolved against saved API output.
pub fn run_ami(opts: &cli::AmiArgs) -> Result<()> {
    let profile = config::load_profile(&opts.common.file)
        .with_context(|| format!("failed to load profile from {}", opts.common.file))?;

    let mut ami_config = profile.ami.clone();
    if let Some(family) = &opts.family {
        ami_config.family = Some(AmiFamily::parse(family)?);
    }
    let lookup = lookup_ami(&ami_config);

    let image = match &opts.images {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .map_err(|e| BootstrapError::io(format!("failed to read images: {}", path), e))?;
            let output: DescribeImagesOutput = serde_json::from_str(&raw).map_err(|e| {
                BootstrapError::Serialization(format!("failed to parse images {}: {}", path, e))
            })?;
            let image = select_image(&lookup.query, output.images)?;
            info!("selected image {} ({})", image.image_id, image.name);
            Some(image)
        }
        None => None,
    };

    let report = playbook::to_yaml(&AmiReport {
        lookup: &lookup,
        image,
    })?;
    emit(&report, None)
}
