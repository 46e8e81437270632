//! MES system provisioner CLI entrypoint.
//!
//! Generates the u-boot headers from the two input lists, rebuilds the
//! PetaLinux images, and writes the boot image descriptor and factory
//! secrets. Progress and diagnostics go to stderr.

use clap::Parser;
use log::debug;
use mes_provisioner::builder::SystemCommandExecutor;
use mes_provisioner::cli::Cli;
use mes_provisioner::config::ProvisionConfig;
use mes_provisioner::error::{ProvisionError, Result};
use mes_provisioner::output::write_stderr_line;
use mes_provisioner::pipeline::Pipeline;
use std::error::Error as _;
use std::io::Write;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
const LOG_FILTER_VAR: &str = "MES_PROVISION_LOG";

fn main() {
    let cli = Cli::parse();
    init_logging();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli, stderr: &mut dyn Write) -> Result<()> {
    let config = ProvisionConfig::from_env()?;
    debug!(target: "provision-system", "resolved configuration: {config:?}");

    let executor = SystemCommandExecutor;
    let mut pipeline = Pipeline::new(&config, &executor);
    pipeline.run(&cli.users_file, &cli.default_file, stderr)?;
    Ok(())
}

/// Installs a stderr subscriber filtered by `MES_PROVISION_LOG`.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, &err);
            log_error_chain(&err);
            err.exit_code()
        }
    }
}

fn log_error_chain(err: &ProvisionError) {
    let mut source = err.source();
    while let Some(cause) = source {
        debug!(target: "provision-system", "caused by: {cause}");
        source = cause.source();
    }
}
