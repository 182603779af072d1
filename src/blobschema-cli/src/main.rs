mod cli;
mod commands;
mod config;
mod export;
mod file_io;
mod file_utils;
mod memory;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Commands};

/// Log filter used when `RUST_LOG` is unset
fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "info,blobschema=debug,blobschema_cli=debug"
    } else {
        "info"
    }
}

fn init_tracing(verbose: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive(verbose).into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Export {
            target,
            output,
            only,
            suspend,
            cross_check,
        } => commands::export::handle(commands::export::ExportArgs {
            target,
            output,
            only,
            suspend,
            cross_check,
        }),

        Commands::Convert {
            bin2xml,
            xml2bin,
            schema,
            table,
            input,
            output,
        } => commands::convert::handle(commands::convert::ConvertArgs {
            bin2xml,
            xml2bin,
            schema,
            table,
            input,
            output,
        }),

        Commands::Scan {
            target,
            pattern,
            base,
            size,
        } => commands::scan::handle(target, &pattern, base, size),

        Commands::Configure {
            process,
            schema_dir,
            block_size,
            parser_hash,
            show,
        } => commands::configure::handle(
            commands::configure::Changes {
                process,
                schema_dir,
                block_size,
                parser_hashes: parser_hash,
            },
            show,
        ),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli.command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_parses() {
        for verbose in [false, true] {
            assert!(EnvFilter::try_new(default_directive(verbose)).is_ok());
        }
        assert!(default_directive(true).contains("blobschema_cli=debug"));
    }
}
