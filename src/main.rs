use clap::Parser;
use std::process::ExitCode;

use watchtags::cli::Cli;
use watchtags::{Settings, WatchService};

/// Exit code for a bad `--config` file, matching clap's usage errors.
const EXIT_USAGE: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };
    cli.apply_overrides(&mut settings);

    if cli.print_config {
        return match settings.to_toml() {
            Ok(toml_str) => {
                print!("{toml_str}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error displaying config: {e}");
                ExitCode::FAILURE
            }
        };
    }

    watchtags::logging::init_with_config(&settings.logging);

    let service = WatchService::builder()
        .roots(cli.roots)
        .wait_time(settings.wait_duration())
        .command(settings.cmd.clone())
        .output_name(settings.output_name.clone())
        .timeout(settings.timeout_duration())
        .index_on_start(cli.index_on_start)
        .build();

    let result = service.and_then(WatchService::run);
    match result {
        // `run` only returns on failure
        Ok(never) => match never {},
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
