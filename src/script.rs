//! Shell script building blocks for bootstrap payloads.
//!
//! Every generated boot script is assembled from the fragments in this
//! module and joined with [`concat_commands`]. The helpers only produce text;
//! nothing here touches the filesystem or runs a process.

/// Interpreter directive that starts every boot script.
pub const BASH_HEADER: &str = "#!/bin/bash\n";

/// Strict-mode declaration that follows the interpreter directive.
pub const STRICT_MODE: &str = "set -euo pipefail\n";

/// Bash function that retries a command with exponential backoff.
///
/// Attempts default to 5 and the initial delay to 1 second; both can be
/// overridden on the target through `ATTEMPTS` and `TIMEOUT`. When every
/// attempt fails, the last exit code is returned so `set -e` aborts the script.
pub const WITH_BACKOFF_DEFINITION: &str = r#"with_backoff() {
  local max_attempts="${ATTEMPTS-5}"
  local timeout="${TIMEOUT-1}"
  local attempt=1
  local exit_code=0

  while true; do
    if "$@"; then
      return 0
    else
      exit_code=$?
    fi

    if (( attempt >= max_attempts )); then
      break
    fi

    echo "with_backoff: attempt ${attempt}/${max_attempts} failed with exit code ${exit_code}, retrying in ${timeout}s: $*" 1>&2
    sleep "$timeout"
    attempt=$(( attempt + 1 ))
    timeout=$(( timeout * 2 ))
  done

  echo "with_backoff: giving up after ${max_attempts} attempts: $*" 1>&2
  return "$exit_code"
}
"#;

/// Base name of the heredoc delimiter used by [`build_file_write_command`].
const HEREDOC_DELIMITER: &str = "ANSIBLE_BOOTSTRAP_EOF";

/// Joins shell fragments into a single script.
///
/// `None` entries are skipped entirely. Every other entry, including an
/// empty string, is emitted in order and terminated by exactly one newline
/// unless it already ends with one.
pub fn concat_commands<I, S>(commands: I) -> String
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    let mut result = String::new();
    for command in commands.into_iter().flatten() {
        let command = command.as_ref();
        result.push_str(command);
        if !command.ends_with('\n') {
            result.push('\n');
        }
    }
    result
}

/// Creates the remote path and hands it to the executing user.
pub fn build_remote_path_init_command(remote_path: &str) -> String {
    format!(
        "sudo mkdir -p \"{remote_path}\"\n\
         sudo chown -R \"$(id -un):$(id -gn)\" \"{remote_path}\"\n"
    )
}

/// Writes `content` verbatim to `path` on the target using a quoted heredoc.
///
/// The delimiter is extended until no line of `content` matches it, so the
/// document can never terminate early.
pub fn build_file_write_command(path: &str, content: &str) -> String {
    let mut delimiter = HEREDOC_DELIMITER.to_string();
    while content.lines().any(|line| line == delimiter) {
        delimiter.push('_');
    }

    let mut command = format!("cat > \"{path}\" <<'{delimiter}'\n{content}");
    if !content.is_empty() && !content.ends_with('\n') {
        command.push('\n');
    }
    command.push_str(&delimiter);
    command.push('\n');
    command
}

/// How the run invocation wraps its network-dependent commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backoff {
    /// Prefix with `with_backoff` and emit the function definition first.
    #[default]
    Inline,
    /// Prefix with `with_backoff`; the definition is already in the script header.
    Predefined,
    /// Run commands directly without retries.
    Disabled,
}

impl Backoff {
    fn prefix(self) -> &'static str {
        match self {
            Self::Inline | Self::Predefined => "with_backoff ",
            Self::Disabled => "",
        }
    }

    fn definition(self) -> Option<&'static str> {
        match self {
            Self::Inline => Some(WITH_BACKOFF_DEFINITION),
            Self::Predefined | Self::Disabled => None,
        }
    }
}

/// Options for [`build_run_command`].
#[derive(Debug, Clone, Copy)]
pub struct RunCommand<'a> {
    /// Directory holding `<id>.yml` and the role files.
    pub remote_path: &'a str,
    /// Playbook file stem, e.g. `main` for `main.yml`.
    pub id: &'a str,
    /// Retry wrapping for the galaxy install and playbook run.
    pub backoff: Backoff,
}

/// Builds the provisioning run invocation.
///
/// Installs `requirements.yml` with `ansible-galaxy` when the file exists,
/// then runs the playbook against localhost with a local connection. The
/// playbook run is always the last line.
pub fn build_run_command(opts: &RunCommand<'_>) -> String {
    let prefix = opts.backoff.prefix();
    concat_commands([
        opts.backoff.definition().map(str::to_string),
        Some(format!("cd \"{}\"", opts.remote_path)),
        Some(format!(
            "if [ -f requirements.yml ]; then\n  {prefix}ansible-galaxy install -r requirements.yml\nfi"
        )),
        Some(format!("{prefix}ansible-playbook -i localhost, -c local {}.yml", opts.id)),
    ])
}
