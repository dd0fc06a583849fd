use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::generate;
use tracing::error;

use ansible_bootstrap::cli::{self, Commands};
use ansible_bootstrap::executor::{CommandExecutor, RealCommandExecutor};
use ansible_bootstrap::{init_logging, run_ami, run_apply, run_render, run_validate};

fn main() -> Result<()> {
    let args = cli::parse_args()?;

    if let Commands::Completions(opts) = &args.command {
        let mut cmd = cli::Cli::command();
        generate(opts.shell, &mut cmd, env!("CARGO_PKG_NAME"), &mut std::io::stdout());
        return Ok(());
    }

    if let Some(log_level) = args.command.log_level() {
        init_logging(log_level)?;
    }

    let result = match &args.command {
        Commands::Render(opts) => run_render(opts),
        Commands::Apply(opts) => {
            let executor: Arc<dyn CommandExecutor> = Arc::new(RealCommandExecutor {
                dry_run: opts.dry_run,
            });
            run_apply(opts, executor)
        }
        Commands::Validate(opts) => run_validate(opts),
        Commands::Ami(opts) => run_ami(opts),
        Commands::Completions(_) => Ok(()),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }

    Ok(())
}
