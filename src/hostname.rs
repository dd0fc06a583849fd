//! Hostname directive configuration and builders.
//!
//! The hostname directive is a short shell fragment that renames the target
//! before the playbook runs, so Ansible facts see the final hostname.

use serde::{Deserialize, Serialize};

/// Placeholder replaced with the literal hostname in custom templates.
pub const HOSTNAME_PLACEHOLDER: &str = "$hostname";

/// Whether and how the target's hostname is set before provisioning.
///
/// This type supports the following YAML representations:
/// - Absent / `null` → `Inherit` (use the instance's default hostname)
/// - `set_hostname: true` → `UseDefault` (use the instance's default hostname)
/// - `set_hostname: false` → `Disabled` (never emit a directive)
/// - `set_hostname: web-1` → `Explicit("web-1")`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SetHostname {
    /// Field not specified.
    #[default]
    Inherit,
    /// `true`: use the default hostname.
    UseDefault,
    /// `false`: skip the directive.
    Disabled,
    /// An explicit hostname that overrides the default.
    Explicit(String),
}

impl SetHostname {
    /// Returns the explicit hostname override, if any.
    pub fn explicit(&self) -> Option<&str> {
        match self {
            Self::Explicit(name) => Some(name),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for SetHostname {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de;

        struct SetHostnameVisitor;

        impl de::Visitor<'_> for SetHostnameVisitor {
            type Value = SetHostname;

            fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("a boolean or a hostname string")
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(SetHostname::Inherit)
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(SetHostname::Inherit)
            }

            fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if v {
                    Ok(SetHostname::UseDefault)
                } else {
                    Ok(SetHostname::Disabled)
                }
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if v.is_empty() {
                    return Err(E::custom("set_hostname must not be an empty string"));
                }
                Ok(SetHostname::Explicit(v.to_string()))
            }
        }

        deserializer.deserialize_any(SetHostnameVisitor)
    }
}

impl Serialize for SetHostname {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Inherit => serializer.serialize_none(),
            Self::UseDefault => serializer.serialize_bool(true),
            Self::Disabled => serializer.serialize_bool(false),
            Self::Explicit(name) => serializer.serialize_str(name),
        }
    }
}

/// Builds the shell fragment that sets the hostname.
///
/// Without a template (or with an empty one), the result is two lines: a
/// `hostnamectl` call guarded by a PATH lookup, then an unconditional write
/// to `/etc/hostname`. With a template, every `$hostname` is replaced by the
/// literal hostname and nothing else changes.
pub fn build_set_hostname_command(hostname: &str, template: Option<&str>) -> String {
    match template.filter(|t| !t.is_empty()) {
        Some(template) => template.replace(HOSTNAME_PLACEHOLDER, hostname),
        None => format!(
            "command -v hostnamectl &>/dev/null && sudo hostnamectl set-hostname \"{hostname}\"\n\
             echo \"{hostname}\" | sudo tee /etc/hostname"
        ),
    }
}

/// Resolves the hostname setting into a directive, if one should be emitted.
///
/// Returns `None` when there is no default hostname or when the setting is
/// `Disabled`. An explicit hostname wins over the default.
pub fn make_set_hostname_command(
    setting: &SetHostname,
    template: Option<&str>,
    default_hostname: Option<&str>,
) -> Option<String> {
    let default_hostname = default_hostname.filter(|h| !h.is_empty())?;

    let hostname = match setting {
        SetHostname::Disabled => return None,
        SetHostname::Inherit | SetHostname::UseDefault => default_hostname,
        SetHostname::Explicit(name) => name.as_str(),
    };

    Some(build_set_hostname_command(hostname, template))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOO_DIRECTIVE: &str = "command -v hostnamectl &>/dev/null && sudo hostnamectl set-hostname \"foo\"\necho \"foo\" | sudo tee /etc/hostname";

    #[test]
    fn build_default_command() {
        assert_eq!(build_set_hostname_command("foo", None), FOO_DIRECTIVE);
    }

    #[test]
    fn build_custom_command() {
        assert_eq!(
            build_set_hostname_command("foo", Some("export HOSTNAME=$hostname")),
            "export HOSTNAME=foo"
        );
    }

    #[test]
    fn build_custom_command_replaces_every_placeholder() {
        assert_eq!(
            build_set_hostname_command("web", Some("hostname $hostname && echo $hostname")),
            "hostname web && echo web"
        );
    }

    #[test]
    fn build_empty_template_falls_back_to_default() {
        assert_eq!(build_set_hostname_command("foo", Some("")), FOO_DIRECTIVE);
    }

    #[test]
    fn make_without_default_hostname() {
        assert_eq!(make_set_hostname_command(&SetHostname::Inherit, None, None), None);
        assert_eq!(
            make_set_hostname_command(&SetHostname::Explicit("bar".into()), None, None),
            None
        );
    }

    #[test]
    fn make_disabled() {
        assert_eq!(make_set_hostname_command(&SetHostname::Disabled, None, Some("foo")), None);
        assert_eq!(
            make_set_hostname_command(&SetHostname::Disabled, Some("hostname $hostname"), Some("foo")),
            None
        );
    }

    #[test]
    fn make_use_default() {
        assert_eq!(
            make_set_hostname_command(&SetHostname::UseDefault, None, Some("foo")).as_deref(),
            Some(FOO_DIRECTIVE)
        );
        assert_eq!(
            make_set_hostname_command(&SetHostname::Inherit, None, Some("foo")).as_deref(),
            Some(FOO_DIRECTIVE)
        );
    }

    #[test]
    fn make_explicit_overrides_default() {
        let cmd = make_set_hostname_command(&SetHostname::Explicit("bar".into()), None, Some("foo"))
            .expect("directive expected");
        assert!(cmd.contains("\"bar\""));
        assert!(!cmd.contains("foo"));
    }

    #[test]
    fn make_with_template() {
        assert_eq!(
            make_set_hostname_command(
                &SetHostname::Inherit,
                Some("export HOSTNAME=$hostname"),
                Some("foo")
            )
            .as_deref(),
            Some("export HOSTNAME=foo")
        );
    }

    #[test]
    fn deserialize_variants() {
        assert_eq!(serde_yaml::from_str::<SetHostname>("~").unwrap(), SetHostname::Inherit);
        assert_eq!(serde_yaml::from_str::<SetHostname>("true").unwrap(), SetHostname::UseDefault);
        assert_eq!(serde_yaml::from_str::<SetHostname>("false").unwrap(), SetHostname::Disabled);
        assert_eq!(
            serde_yaml::from_str::<SetHostname>("web-1").unwrap(),
            SetHostname::Explicit("web-1".to_string())
        );
    }

    #[test]
    fn deserialize_rejects_numbers_and_empty_strings() {
        assert!(serde_yaml::from_str::<SetHostname>("42").is_err());
        assert!(serde_yaml::from_str::<SetHostname>("''").is_err());
    }

    #[test]
    fn absent_field_defaults_to_inherit() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(default)]
            set_hostname: SetHostname,
        }
        let holder: Holder = serde_yaml::from_str("{}").unwrap();
        assert_eq!(holder.set_hostname, SetHostname::Inherit);
    }

    #[test]
    fn serialize_round_trips_explicit() {
        let yaml = serde_yaml::to_string(&SetHostname::Explicit("db".into())).unwrap();
        assert_eq!(serde_yaml::from_str::<SetHostname>(&yaml).unwrap(), SetHostname::Explicit("db".into()));
    }
}
