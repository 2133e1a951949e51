use clap::Parser;
use job_memory_report::cli::{run, Cli};
use job_memory_report::config::Config;
use job_memory_report::logging::{init_logging, run_span};
use std::process;
use tracing::{debug, info};

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => handle_error(e, cli.json),
    };

    let _guard = match init_logging(&config.logging, &config.paths.log_directory, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => handle_error(e, cli.json),
    };

    let span = run_span();
    let _entered = span.enter();

    match &config.source {
        Some(path) => info!(config_file = %path.display(), "Loaded configuration from file"),
        None => debug!("No configuration file found; using defaults"),
    }

    let today = chrono::Local::now().date_naive();
    if let Err(e) = run(&cli, &config, today) {
        handle_error(e, cli.json);
    }
}

fn handle_error(e: anyhow::Error, json: bool) -> ! {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{:#}", e) }));
    } else {
        eprintln!("Error: {:#}", e);
    }
    process::exit(1);
}
