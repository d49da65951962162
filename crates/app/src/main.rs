mod cli;
mod probe;
mod route;

use clap::Parser;

use crate::cli::{Cli, Command};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    vision::telemetry::init_tracing(&cli.log_filter);
    vision::telemetry::init_metrics_recorder();

    let outcome = match cli.command {
        Command::Route(args) => route::run(args),
        Command::Probe(args) => probe::run(args),
    };

    if cli.dump_metrics {
        if let Some(handle) = vision::telemetry::prometheus_handle() {
            println!("{}", handle.render());
        }
    }
    outcome
}
