mod helpers;

use anyhow::Result;
use ansible_bootstrap::BootstrapError;
use ansible_bootstrap::ami::{AmiFamily, Architecture};
use ansible_bootstrap::config::{Target, load_profile};
use ansible_bootstrap::hostname::SetHostname;
use ansible_bootstrap::provisioner::{AnsibleMethod, HostKeyChecking};
use camino::Utf8PathBuf;

fn demo(name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

#[test]
fn test_load_profile_resolves_role_paths() -> Result<()> {
    let (_dir, base) = helpers::utf8_tempdir();
    helpers::write_role(&base, "common");
    let path = helpers::write_profile(
        &base,
        r#"---
name: web-1
ansible:
  method: user-data
  roles: [common]
  role_paths: [roles]
"#,
    );

    let profile = load_profile(&path)?;

    assert_eq!(profile.name, "web-1");
    assert_eq!(profile.target, Target::Instance);
    assert_eq!(profile.ansible.common().role_paths, vec![base.join("roles")]);
    profile.validate()?;
    Ok(())
}

#[test]
fn test_load_profile_full() -> Result<()> {
    let (_dir, base) = helpers::utf8_tempdir();
    helpers::write_role(&base, "common");
    helpers::write_file(&base.join("keys/id_ed25519"), "key\n");
    let path = helpers::write_profile(
        &base,
        r#"---
name: bastion
hostname: bastion.example.com
tags:
  Team: infra
ami:
  family: debian
  version: "13"
  architecture: arm64
ansible:
  method: remote-ssh
  roles: [common]
  role_paths: [roles]
  vars:
    motd: hello
  requirements:
    collections: [community.general]
  remote_path: /srv/ansible
  set_hostname: false
  install_command: pip install ansible
  connection:
    host: 10.0.0.5
    user: deploy
    port: 2222
    identity_file: keys/id_ed25519
    host_key_checking: strict
"#,
    );

    let profile = load_profile(&path)?;
    profile.validate()?;

    assert_eq!(profile.ami.family, Some(AmiFamily::Debian));
    assert_eq!(profile.ami.version.as_deref(), Some("13"));
    assert_eq!(profile.ami.architecture, Some(Architecture::Arm64));
    assert_eq!(profile.tags.get("Team").map(String::as_str), Some("infra"));

    let AnsibleMethod::RemoteSsh(config) = &profile.ansible else {
        panic!("expected remote-ssh method");
    };
    assert_eq!(config.common.remote_path(), "/srv/ansible");
    assert_eq!(config.common.set_hostname, SetHostname::Disabled);
    assert_eq!(config.common.install_command.as_deref(), Some("pip install ansible"));
    assert_eq!(config.connection.user.as_deref(), Some("deploy"));
    assert_eq!(config.connection.port, Some(2222));
    assert_eq!(config.connection.identity_file, Some(base.join("keys/id_ed25519")));
    assert_eq!(config.connection.host_key_checking, HostKeyChecking::Strict);
    Ok(())
}

#[test]
fn test_load_profile_missing_file() {
    let err = load_profile(&Utf8PathBuf::from("/non/existent/profile.yml")).unwrap_err();
    assert!(matches!(err, BootstrapError::Io { .. }));
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_load_profile_unknown_method() {
    let (_dir, base) = helpers::utf8_tempdir();
    let path = helpers::write_profile(&base, "name: a\nansible:\n  method: ftp\n  roles: [x]\n");

    let err = load_profile(&path).unwrap_err();
    assert!(matches!(err, BootstrapError::Config(_)));
}

#[test]
fn test_load_profile_unknown_family_fails() {
    let (_dir, base) = helpers::utf8_tempdir();
    let path = helpers::write_profile(
        &base,
        "name: a\nami:\n  family: centos\nansible:\n  method: user-data\n  roles: [x]\n",
    );

    let err = load_profile(&path).unwrap_err();
    assert!(err.to_string().contains("centos"));
}

#[test]
fn test_validate_misspelled_ansible_key() -> Result<()> {
    let (_dir, base) = helpers::utf8_tempdir();
    helpers::write_role(&base, "common");
    let path = helpers::write_profile(
        &base,
        "name: a\nansible:\n  method: user-data\n  roles: [common]\n  role_path: [roles]\n",
    );

    let profile = load_profile(&path)?;
    let err = profile.validate().unwrap_err();
    assert!(matches!(err, BootstrapError::Config(_)));
    assert!(err.to_string().contains("unknown field(s) under ansible: role_path"));
    Ok(())
}

#[test]
fn test_validate_missing_role_path() -> Result<()> {
    let (_dir, base) = helpers::utf8_tempdir();
    let path = helpers::write_profile(
        &base,
        "name: a\nansible:\n  method: user-data\n  roles: [x]\n  role_paths: [missing]\n",
    );

    let profile = load_profile(&path)?;
    let err = profile.validate().unwrap_err();
    assert!(err.to_string().contains("role path does not exist"));
    Ok(())
}

#[test]
fn test_validate_playbook_and_roles_conflict() -> Result<()> {
    let (_dir, base) = helpers::utf8_tempdir();
    let path = helpers::write_profile(
        &base,
        r#"---
name: a
ansible:
  method: user-data
  roles: [x]
  playbook:
    - hosts: localhost
      tasks: []
"#,
    );

    let profile = load_profile(&path)?;
    assert!(matches!(profile.validate(), Err(BootstrapError::Validation(_))));
    Ok(())
}

#[test]
fn test_validate_unconfigured_bucket() -> Result<()> {
    let (_dir, base) = helpers::utf8_tempdir();
    let path = helpers::write_profile(
        &base,
        "name: a\nansible:\n  method: s3-user-data\n  roles: [x]\n  bucket:\n    create: false\n",
    );

    let profile = load_profile(&path)?;
    let err = profile.validate().unwrap_err();
    assert!(err.to_string().contains("S3 bucket must be created or configured."));
    Ok(())
}

#[test]
fn test_validate_bad_bucket_name() -> Result<()> {
    let (_dir, base) = helpers::utf8_tempdir();
    let path = helpers::write_profile(
        &base,
        "name: a\nansible:\n  method: s3-user-data\n  roles: [x]\n  bucket:\n    name: Not_Valid\n",
    );

    let profile = load_profile(&path)?;
    assert!(profile.validate().is_err());
    Ok(())
}

#[test]
fn test_validate_role_policy_without_role() -> Result<()> {
    let (_dir, base) = helpers::utf8_tempdir();
    let path = helpers::write_profile(
        &base,
        "name: a\nansible:\n  method: s3-user-data\n  roles: [x]\n  create_role_policy: true\n",
    );

    let profile = load_profile(&path)?;
    assert!(matches!(profile.validate(), Err(BootstrapError::Config(_))));
    Ok(())
}

#[test]
fn test_validate_empty_ssh_host() -> Result<()> {
    let (_dir, base) = helpers::utf8_tempdir();
    let path = helpers::write_profile(
        &base,
        "name: a\nansible:\n  method: remote-ssh\n  roles: [x]\n  connection:\n    host: ''\n",
    );

    let profile = load_profile(&path)?;
    let err = profile.validate().unwrap_err();
    assert!(err.to_string().contains("connection.host"));
    Ok(())
}

#[test]
fn test_demo_profiles_validate() -> Result<()> {
    for name in [
        "web_user_data.yml",
        "worker_s3.yml",
        "bastion_ssh.yml",
        "pool_launch_template.yml",
    ] {
        let profile = load_profile(&demo(name))?;
        profile.validate()?;
    }
    Ok(())
}
