/// Runs the registered data updaters. Meant to be invoked once a day by cron
/// (or a scheduled CI job), which then commits whatever output changed.
///
///   run_updaters              # every registered updater
///   run_updaters scholar      # just one
///   run_updaters --list
use std::error::Error;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use daily_updaters::config::DEFAULT_CONFIG_FILEPATH;
use daily_updaters::{Config, Dispatcher, Registry};

#[derive(Debug, Parser)]
#[command(about = "Fetch external data sources and rewrite their YAML documents")]
struct Args {
  /// Updaters to run; all of them when omitted.
  names: Vec<String>,
  /// Configuration file with one section per updater.
  #[arg(short, long, default_value = DEFAULT_CONFIG_FILEPATH)]
  config: PathBuf,
  /// Print the registered updater names and exit.
  #[arg(long)]
  list: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
  let args = Args::parse();
  let registry = Registry::builtin();

  if args.list {
    for name in registry.names() {
      println!("{}", name);
    }
    return Ok(());
  }

  let config = match Config::load(&args.config) {
    Ok(config) => config,
    Err(e) => {
      eprintln!("{}", e);
      process::exit(1);
    }
  };

  let report = match Dispatcher::new(registry, &config).run(Some(args.names.as_slice())) {
    Ok(report) => report,
    Err(e) => {
      eprintln!("{}", e);
      process::exit(1);
    }
  };

  println!("\n{}", "=".repeat(50));
  println!("Summary");
  println!("{}", "=".repeat(50));
  for line in report.summary_lines() {
    println!("{}", line);
  }

  if !report.is_success() {
    eprintln!("every selected updater crashed");
    process::exit(1);
  }
  Ok(())
}
