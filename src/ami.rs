//! AMI and installer lookup table.
//!
//! Maps an operating-system family to its default login user, the commands
//! that install Ansible and the AWS CLI on first boot, and the image search
//! filters used to find the most recent official image. The install commands
//! use `with_backoff`, so they must run in a script that defines it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::BootstrapError;

/// Operating-system family of an AMI.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AmiFamily {
    /// Amazon Linux 2023
    Al2023,
    /// Debian (official images)
    Debian,
    /// Ubuntu (Canonical images)
    #[default]
    Ubuntu,
}

impl AmiFamily {
    /// Parses a family name, failing fast on anything not in the table.
    pub fn parse(value: &str) -> Result<Self, BootstrapError> {
        Self::from_str(value).map_err(|_| BootstrapError::UnknownAmiFamily(value.to_string()))
    }

    /// Default login username on images of this family.
    pub fn default_username(self) -> &'static str {
        match self {
            Self::Al2023 => "ec2-user",
            Self::Debian => "admin",
            Self::Ubuntu => "ubuntu",
        }
    }

    /// Version used in the image name pattern when none is requested.
    pub fn default_version(self) -> &'static str {
        match self {
            Self::Al2023 => "2023*",
            Self::Debian => "12",
            Self::Ubuntu => "noble-24.04",
        }
    }

    /// AWS account IDs that publish the official images of this family.
    pub fn owners(self) -> &'static [&'static str] {
        match self {
            Self::Al2023 => &["137112412989"],
            Self::Debian => &["136693071363"],
            Self::Ubuntu => &["099720109477"],
        }
    }

    /// Command that installs Ansible and git.
    pub fn ansible_install_command(self) -> String {
        match self {
            Self::Al2023 => "with_backoff sudo yum install -y ansible git".to_string(),
            Self::Debian | Self::Ubuntu => [
                "export DEBIAN_FRONTEND=noninteractive",
                "with_backoff sudo apt-get update",
                "with_backoff sudo apt-get install -y ansible git",
            ]
            .join(" && "),
        }
    }

    /// Command that installs the AWS CLI.
    pub fn awscli_install_command(self) -> String {
        let installer = [
            "with_backoff sudo curl -L 'https://raw.githubusercontent.com/sapslaj/aws-cli-installer/main/aws-cli-installer' -o /usr/local/sbin/aws-cli-installer",
            "sudo chmod +x /usr/local/sbin/aws-cli-installer",
            "with_backoff sudo /usr/local/sbin/aws-cli-installer",
        ];
        let prerequisites: &[&str] = match self {
            Self::Al2023 => &["with_backoff sudo yum install -y curl unzip"],
            Self::Debian | Self::Ubuntu => &[
                "export DEBIAN_FRONTEND=noninteractive",
                "with_backoff sudo apt-get update",
                "with_backoff sudo apt-get install -y curl unzip",
            ],
        };
        prerequisites
            .iter()
            .chain(installer.iter())
            .copied()
            .collect::<Vec<_>>()
            .join(" && ")
    }
}

/// CPU architecture of an AMI.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
pub enum Architecture {
    #[default]
    #[serde(rename = "x86_64")]
    #[strum(serialize = "x86_64")]
    X86_64,
    #[serde(rename = "arm64")]
    #[strum(serialize = "arm64")]
    Arm64,
}

impl Architecture {
    /// Debian-style architecture name used in Debian and Ubuntu image names.
    fn debian_name(self) -> &'static str {
        match self {
            Self::X86_64 => "amd64",
            Self::Arm64 => "arm64",
        }
    }
}

/// Image selection settings from the profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmiConfig {
    /// Use this image directly instead of searching.
    #[serde(default)]
    pub id: Option<String>,
    /// Operating-system family (default: ubuntu).
    #[serde(default)]
    pub family: Option<AmiFamily>,
    /// Version fragment substituted into the image name pattern.
    #[serde(default)]
    pub version: Option<String>,
    /// CPU architecture (default: x86_64).
    #[serde(default)]
    pub architecture: Option<Architecture>,
}

/// A single `DescribeImages` filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageFilter {
    pub name: String,
    pub values: Vec<String>,
}

impl ImageFilter {
    fn new(name: &str, values: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            values,
        }
    }
}

/// Parameters of an image lookup, ready to be sent to the EC2 API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageQuery {
    pub most_recent: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub owners: Vec<String>,
    pub filters: Vec<ImageFilter>,
}

impl fmt::Display for ImageQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filters = self
            .filters
            .iter()
            .map(|filter| format!("{}={}", filter.name, filter.values.join(",")))
            .collect::<Vec<_>>()
            .join(" ");
        f.write_str(&filters)?;
        if !self.owners.is_empty() {
            write!(f, " owners={}", self.owners.join(","))?;
        }
        if self.most_recent {
            f.write_str(" most-recent")?;
        }
        Ok(())
    }
}

/// Resolved AMI settings for an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmiLookup {
    pub family: AmiFamily,
    pub query: ImageQuery,
    pub default_username: String,
    pub ansible_install_command: String,
    pub awscli_install_command: String,
}

/// A candidate image returned by the EC2 API.
///
/// Field names follow `aws ec2 describe-images --output json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Image {
    pub image_id: String,
    #[serde(default)]
    pub name: String,
    /// ISO 8601 timestamp; lexicographic order equals chronological order.
    #[serde(default)]
    pub creation_date: String,
}

/// Returns the image name patterns for a family, architecture and version.
pub fn get_lookup_names(
    architecture: Architecture,
    family: AmiFamily,
    version: Option<&str>,
) -> Vec<String> {
    let version = version.unwrap_or(family.default_version());
    match family {
        AmiFamily::Al2023 => vec![format!("al2023-ami-{version}-{architecture}")],
        AmiFamily::Debian => {
            vec![format!("debian-{version}-{}-*", architecture.debian_name())]
        }
        AmiFamily::Ubuntu => {
            let arch = architecture.debian_name();
            vec![
                format!("ubuntu/images/hvm-ssd-gp3/ubuntu-{version}-{arch}-server-*"),
                format!("ubuntu/images/hvm-ssd/ubuntu-{version}-{arch}-server-*"),
            ]
        }
    }
}

/// Resolves AMI settings into an image query plus the family's defaults.
///
/// An explicit `id` yields a direct `image-id` lookup. Otherwise the query
/// asks for the most recent HVM image from the family's official owners
/// whose name matches [`get_lookup_names`].
pub fn lookup_ami(config: &AmiConfig) -> AmiLookup {
    let family = config.family.unwrap_or_default();

    let query = match &config.id {
        Some(id) => ImageQuery {
            most_recent: false,
            owners: Vec::new(),
            filters: vec![ImageFilter::new("image-id", vec![id.clone()])],
        },
        None => {
            let architecture = config.architecture.unwrap_or_default();
            ImageQuery {
                most_recent: true,
                owners: family.owners().iter().map(|o| o.to_string()).collect(),
                filters: vec![
                    ImageFilter::new("virtualization-type", vec!["hvm".to_string()]),
                    ImageFilter::new(
                        "name",
                        get_lookup_names(architecture, family, config.version.as_deref()),
                    ),
                ],
            }
        }
    };

    AmiLookup {
        family,
        query,
        default_username: family.default_username().to_string(),
        ansible_install_command: family.ansible_install_command(),
        awscli_install_command: family.awscli_install_command(),
    }
}

/// Output document of `aws ec2 describe-images`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeImagesOutput {
    #[serde(default)]
    pub images: Vec<Image>,
}

/// Picks the image a query resolves to from the API's candidates.
///
/// Zero candidates is an error. Without `most_recent`, more than one
/// candidate is ambiguous and also an error.
pub fn select_image(query: &ImageQuery, candidates: Vec<Image>) -> Result<Image, BootstrapError> {
    if candidates.len() > 1 && !query.most_recent {
        return Err(BootstrapError::Validation(format!(
            "image query returned {} results; narrow the filters or enable most-recent: {}",
            candidates.len(),
            query
        )));
    }

    candidates
        .into_iter()
        .max_by(|a, b| a.creation_date.cmp(&b.creation_date))
        .ok_or_else(|| BootstrapError::NoMatchingImage {
            query: query.to_string(),
        })
}
