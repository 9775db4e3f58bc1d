mod scenarios;

use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tracing::Level;

use clinit::Options;
use scenarios::{Scenario, Settings};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
struct Args {
    #[arg(long, value_enum, default_value_t = Scenario::All)]
    scenario: Scenario,

    /// Threads racing in the concurrent and sticky scenarios.
    #[arg(long, default_value_t = 8)]
    threads: usize,

    /// Warn when a thread waits this long for another thread's initializer.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    stall_warning_ms: Option<u64>,

    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    tracing_subscriber::fmt()
        .pretty()
        .with_max_level(if args.debug { Level::DEBUG } else { Level::INFO })
        .init();

    let settings = Settings {
        threads: args.threads.max(1),
        options: Options {
            stall_warning: args.stall_warning_ms.map(Duration::from_millis),
        },
    };
    for scenario in args.scenario.expand() {
        if let Err(err) = scenarios::run(scenario, &settings) {
            println!("{} {scenario:?}", "FAILED".red().bold());
            return Err(err);
        }
        println!("{} {scenario:?}", "ok".green());
    }
    println!("{}", "PASSED".green().bold());
    Ok(())
}
