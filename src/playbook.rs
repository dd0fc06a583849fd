//! Playbook and requirements documents.

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::error::BootstrapError;

/// A single generated play that applies roles to the local host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Play {
    pub name: String,
    pub hosts: String,
    pub connection: String,
    #[serde(rename = "become")]
    pub escalate: bool,
    #[serde(skip_serializing_if = "Mapping::is_empty")]
    pub vars: Mapping,
    pub roles: Vec<String>,
}

impl Play {
    pub fn local(name: &str, roles: &[String], vars: &Mapping) -> Self {
        Self {
            name: name.to_string(),
            hosts: "localhost".to_string(),
            connection: "local".to_string(),
            escalate: true,
            vars: vars.clone(),
            roles: roles.to_vec(),
        }
    }
}

/// Source of the `main.yml` playbook.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybookSpec {
    /// A playbook document given verbatim in the profile.
    Explicit(Value),
    /// A single local play built from role names and variables.
    Generated { roles: Vec<String>, vars: Mapping },
}

impl PlaybookSpec {
    /// Chooses between an explicit playbook and a generated one.
    ///
    /// Exactly one of `playbook` or `roles`/`vars` must be given. An explicit
    /// playbook must be a list of plays.
    pub fn from_parts(
        playbook: Option<&Value>,
        roles: &[String],
        vars: &Mapping,
    ) -> Result<Self, BootstrapError> {
        let generated = !roles.is_empty() || !vars.is_empty();
        match (playbook, generated) {
            (Some(_), true) => Err(BootstrapError::Validation(
                "playbook cannot be combined with roles or vars".to_string(),
            )),
            (None, false) => Err(BootstrapError::Validation(
                "either playbook or roles must be specified".to_string(),
            )),
            (Some(document), false) => {
                if !document.is_sequence() {
                    return Err(BootstrapError::Validation(
                        "playbook must be a list of plays".to_string(),
                    ));
                }
                Ok(Self::Explicit(document.clone()))
            }
            (None, true) => Ok(Self::Generated {
                roles: roles.to_vec(),
                vars: vars.clone(),
            }),
        }
    }

    /// Serializes the playbook, naming a generated play after `play_name`.
    pub fn to_yaml(&self, play_name: &str) -> Result<String, BootstrapError> {
        match self {
            Self::Explicit(document) => to_yaml(document),
            Self::Generated { roles, vars } => to_yaml(&[Play::local(play_name, roles, vars)]),
        }
    }
}

/// Serializes a document as block-style YAML.
pub fn to_yaml<T: Serialize + ?Sized>(value: &T) -> Result<String, BootstrapError> {
    serde_yaml::to_string(value).map_err(|e| BootstrapError::Serialization(e.to_string()))
}
