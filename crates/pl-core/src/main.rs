//! playlog - play-event ETL into query-optimized tables.

use clap::Parser;
use pl_common::OutputFormat;
use pl_core::cli::{run, Cli};
use pl_core::logging::{default_level, init_logging};
use pl_core::ExitCode;

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(
        cli.global.log_format,
        default_level(cli.global.verbose, cli.global.quiet),
    );
    let format = cli.global.format;

    match run(cli) {
        Ok(code) => code.into(),
        Err(err) => {
            let code = ExitCode::for_error(&err);
            tracing::error!(code = err.code(), error = %err, "command failed");
            if format == OutputFormat::Json {
                let body = serde_json::json!({
                    "error": { "code": err.code(), "message": err.to_string() },
                });
                println!("{body}");
            }
            eprintln!("playlog: {err}");
            code.into()
        }
    }
}
