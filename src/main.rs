mod cli;

use std::process::ExitCode;

use cli::{Cli, Commands};
use pagepdf_lib::{telemetry, Config, RenderError, Result};

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

async fn run() -> ExitCode {
    let args = cli::parse();
    match execute(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            eprintln!("Hint: {}", err.remediation());
            ExitCode::from(2)
        }
    }
}

async fn execute(args: Cli) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;

    match args.command {
        Commands::Serve(serve) => {
            serve.apply(&mut config);
            config.validate()?;
            telemetry::init(&config.logging, args.verbose)?;
            pagepdf_lib::serve(config).await
        }
        Commands::Sweep(sweep) => {
            sweep.apply(&mut config);
            telemetry::init(&config.logging, args.verbose)?;
            let report = config.janitor().sweep().await;
            let json = serde_json::to_string_pretty(&report)
                .map_err(|err| RenderError::Io(err.into()))?;
            println!("{json}");
            Ok(())
        }
    }
}
