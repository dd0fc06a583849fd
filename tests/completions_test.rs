//! Tests for the completions subcommand.

use anyhow::Result;
use clap::{CommandFactory, Parser, ValueEnum};
use clap_complete::{Shell, generate};
use ansible_bootstrap::cli::{Cli, Commands};

#[test]
fn test_completions_command_parsing() -> Result<()> {
    let shells = [
        ("bash", Shell::Bash),
        ("zsh", Shell::Zsh),
        ("fish", Shell::Fish),
        ("powershell", Shell::PowerShell),
        ("elvish", Shell::Elvish),
    ];

    for (shell_str, expected_shell) in shells {
        let args = Cli::parse_from(["ansible-bootstrap", "completions", shell_str]);
        match args.command {
            Commands::Completions(opts) => {
                assert_eq!(opts.shell, expected_shell, "Mismatched shell for '{}'", shell_str);
            }
            _ => panic!("Expected Completions command for shell '{}'", shell_str),
        }
    }

    Ok(())
}

#[test]
fn test_completions_generation() -> Result<()> {
    let mut cmd = Cli::command();
    let mut buffer = Vec::new();

    for shell in Shell::value_variants() {
        buffer.clear();
        generate(*shell, &mut cmd, "ansible-bootstrap", &mut buffer);
        assert!(!buffer.is_empty(), "Generated completion for {:?} was empty", shell);
    }

    Ok(())
}

#[test]
fn test_bash_completion_lists_subcommands() -> Result<()> {
    let mut cmd = Cli::command();
    let mut buffer = Vec::new();
    generate(Shell::Bash, &mut cmd, "ansible-bootstrap", &mut buffer);
    let script = String::from_utf8(buffer)?;

    for subcommand in ["render", "apply", "validate", "ami", "completions"] {
        assert!(script.contains(subcommand), "missing '{}' in bash completion", subcommand);
    }

    Ok(())
}

#[test]
fn test_invalid_shell_rejected() {
    let result = Cli::try_parse_from(["ansible-bootstrap", "completions", "invalid-shell"]);
    assert!(result.is_err(), "Expected parsing to fail for invalid shell");
}
