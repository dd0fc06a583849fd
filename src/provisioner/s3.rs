//! S3-mediated delivery.
//!
//! Role files are uploaded to a bucket ahead of boot; the boot script
//! installs the AWS CLI, copies the bucket down to the remote path and writes
//! the playbook and requirements inline. The bucket itself and everything
//! around it is returned as a [`BucketPlan`] for the caller to create.

use std::fs;

use camino::Utf8PathBuf;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, trace};

use super::{PLAYBOOK_ID, ProvisionContext, ProvisionerConfig};
use crate::bundle::{PLAYBOOK_FILE, REQUIREMENTS_FILE};
use crate::error::BootstrapError;
use crate::script::{
    BASH_HEADER, Backoff, RunCommand, STRICT_MODE, WITH_BACKOFF_DEFINITION,
    build_file_write_command, build_remote_path_init_command, build_run_command, concat_commands,
};
use crate::tags::{Tags, merge_tags};

const BUCKET_NAME_PATTERN: &str = r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$";

/// Characters of the instance name kept in a derived bucket name.
const BUCKET_PREFIX_LEN: usize = 24;

/// Read-only actions granted on the provisioning bucket.
pub const BUCKET_READ_ACTIONS: [&str; 6] = [
    "s3:ListBucket",
    "s3:ListBucketVersions",
    "s3:GetObject",
    "s3:GetObjectAcl",
    "s3:GetObjectTagging",
    "s3:GetObjectVersion",
];

/// Server-side encryption applied to created buckets.
pub const SSE_ALGORITHM: &str = "AES256";

fn default_true() -> bool {
    true
}

/// Bucket settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BucketConfig {
    /// Bucket name. Derived from the instance name when unset.
    #[serde(default)]
    pub name: Option<String>,
    /// Whether the bucket is created alongside the instance.
    #[serde(default = "default_true")]
    pub create: bool,
    #[serde(default = "default_true")]
    pub force_destroy: bool,
    #[serde(default)]
    pub tags: Tags,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            name: None,
            create: true,
            force_destroy: true,
            tags: Tags::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct S3UserDataConfig {
    #[serde(flatten)]
    pub common: ProvisionerConfig,
    /// Overrides the AMI family's AWS CLI install command.
    #[serde(default)]
    pub awscli_install_command: Option<String>,
    #[serde(default)]
    pub bucket: BucketConfig,
    /// Whether role files are uploaded as bucket objects.
    #[serde(default = "default_true")]
    pub create_objects: bool,
    /// Tags applied to uploaded objects.
    #[serde(default)]
    pub object_tags: Tags,
    /// IAM role the bucket access policy is attached to.
    #[serde(default)]
    pub role: Option<String>,
    /// Attach the access policy to `role`. Defaults to whether a role is set.
    #[serde(default)]
    pub create_role_policy: Option<bool>,
    /// Tags applied to the bucket and its objects.
    #[serde(default)]
    pub tags: Tags,
}

impl Default for S3UserDataConfig {
    fn default() -> Self {
        Self {
            common: ProvisionerConfig::default(),
            awscli_install_command: None,
            bucket: BucketConfig::default(),
            create_objects: true,
            object_tags: Tags::new(),
            role: None,
            create_role_policy: None,
            tags: Tags::new(),
        }
    }
}

/// Settings applied to a bucket this tool creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedBucket {
    pub force_destroy: bool,
    pub block_public_access: bool,
    pub sse_algorithm: String,
    pub tags: Tags,
}

/// A role file to upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketObject {
    pub key: String,
    pub source: Utf8PathBuf,
    /// MD5 hex of the file contents.
    pub etag: String,
    pub tags: Tags,
}

/// Inline IAM role policy granting read access to the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolePolicy {
    pub role: String,
    pub policy: String,
}

/// Everything the caller must provision for the boot script to succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketPlan {
    pub name: String,
    pub arn: String,
    /// Present when the bucket is created rather than referenced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub managed: Option<ManagedBucket>,
    pub objects: Vec<BucketObject>,
    /// JSON IAM policy document.
    pub access_policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_policy: Option<RolePolicy>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct S3UserDataPayload {
    pub user_data: String,
    pub bucket: BucketPlan,
}

/// Checks a bucket name against the S3 naming rules.
pub fn validate_bucket_name(name: &str) -> Result<(), BootstrapError> {
    let pattern = Regex::new(BUCKET_NAME_PATTERN)
        .map_err(|e| BootstrapError::Validation(format!("invalid bucket name pattern: {}", e)))?;
    if !pattern.is_match(name) || name.contains("..") {
        return Err(BootstrapError::Validation(format!(
            "invalid S3 bucket name '{}': must be 3-63 lowercase letters, digits, dots or hyphens",
            name
        )));
    }
    Ok(())
}

/// Resolves the bucket name from the settings or the instance name.
pub fn resolve_bucket_name(bucket: &BucketConfig, instance_name: &str) -> Result<String, BootstrapError> {
    match &bucket.name {
        Some(name) => Ok(name.clone()),
        None if bucket.create => {
            let prefix: String = instance_name.chars().take(BUCKET_PREFIX_LEN).collect();
            Ok(format!("{}-provisioning", prefix.to_lowercase()))
        }
        None => Err(BootstrapError::Config(
            "S3 bucket must be created or configured.".to_string(),
        )),
    }
}

/// Builds the read-only access policy for a bucket ARN.
pub fn bucket_access_policy(arn: &str) -> Result<String, BootstrapError> {
    let document = json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Action": BUCKET_READ_ACTIONS,
                "Resource": [arn, format!("{}/*", arn)],
            }
        ],
    });
    serde_json::to_string_pretty(&document).map_err(|e| BootstrapError::Serialization(e.to_string()))
}

/// The command that copies the bucket contents to the remote path.
pub fn build_s3_copy_command(bucket_name: &str, remote_path: &str) -> String {
    format!("aws s3 cp --recursive \"s3://{bucket_name}/\" \"{remote_path}\"")
}

pub fn build_bucket_plan(
    config: &S3UserDataConfig,
    ctx: &ProvisionContext<'_>,
) -> Result<BucketPlan, BootstrapError> {
    let name = resolve_bucket_name(&config.bucket, ctx.instance_name)?;
    validate_bucket_name(&name)?;
    let arn = format!("arn:aws:s3:::{}", name);

    let managed = config.bucket.create.then(|| ManagedBucket {
        force_destroy: config.bucket.force_destroy,
        block_public_access: true,
        sse_algorithm: SSE_ALGORITHM.to_string(),
        tags: merge_tags(&[Some(ctx.tags), Some(&config.tags), Some(&config.bucket.tags)]),
    });

    let mut objects = Vec::new();
    if config.create_objects {
        let object_tags = merge_tags(&[Some(ctx.tags), Some(&config.tags), Some(&config.object_tags)]);
        for (key, role_file) in config.common.gather_role_files()? {
            let content = fs::read(&role_file.absolute_file_location).map_err(|e| {
                BootstrapError::io(
                    format!("failed to read role file: {}", role_file.absolute_file_location),
                    e,
                )
            })?;
            let etag = format!("{:x}", md5::compute(&content));
            trace!("object {} etag {}", key, etag);
            objects.push(BucketObject {
                key,
                source: role_file.absolute_file_location,
                etag,
                tags: object_tags.clone(),
            });
        }
    }

    let access_policy = bucket_access_policy(&arn)?;

    let role_policy = if config.create_role_policy.unwrap_or(config.role.is_some()) {
        let role = config.role.clone().ok_or_else(|| {
            BootstrapError::Config("create_role_policy requires an IAM role".to_string())
        })?;
        Some(RolePolicy {
            role,
            policy: access_policy.clone(),
        })
    } else {
        None
    };

    debug!("bucket plan for {}: {} object(s)", name, objects.len());
    Ok(BucketPlan {
        name,
        arn,
        managed,
        objects,
        access_policy,
        role_policy,
    })
}

pub fn build_payload(
    config: &S3UserDataConfig,
    ctx: &ProvisionContext<'_>,
) -> Result<S3UserDataPayload, BootstrapError> {
    let bucket = build_bucket_plan(config, ctx)?;
    let common = &config.common;
    let remote_path = common.remote_path();

    let requirements = common.requirements_yaml()?;
    let playbook = common.playbook_yaml(ctx.instance_name)?;
    let awscli_install = config
        .awscli_install_command
        .as_deref()
        .unwrap_or(&ctx.ami.awscli_install_command);

    let user_data = concat_commands([
        Some(BASH_HEADER.to_string()),
        Some(STRICT_MODE.to_string()),
        Some(WITH_BACKOFF_DEFINITION.to_string()),
        Some(build_remote_path_init_command(remote_path)),
        Some(common.install_command(ctx.ami).to_string()).filter(|c| !c.is_empty()),
        Some(awscli_install.to_string()).filter(|c| !c.is_empty()),
        common.set_hostname_command(ctx.default_hostname),
        Some(format!("with_backoff {}", build_s3_copy_command(&bucket.name, remote_path))),
        requirements.map(|content| {
            build_file_write_command(&format!("{}/{}", remote_path, REQUIREMENTS_FILE), &content)
        }),
        Some(build_file_write_command(
            &format!("{}/{}", remote_path, PLAYBOOK_FILE),
            &playbook,
        )),
        Some(build_run_command(&RunCommand {
            remote_path,
            id: PLAYBOOK_ID,
            backoff: Backoff::Predefined,
        })),
    ]);

    Ok(S3UserDataPayload { user_data, bucket })
}
