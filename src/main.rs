//! The `mame2mra` command line.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;

use log::info;
use log::warn;
use structopt::StructOpt;

use mame2mra::config::Config;
use mame2mra::error;
use mame2mra::error::Errors;
use mame2mra::error::Severity;
use mame2mra::mame;
use mame2mra::mra;

/// Converts a MAME listing into MiSTer ROM descriptors.
#[derive(StructOpt)]
#[structopt(name = "mame2mra")]
struct Opts {
  /// The output of `mame -listxml`.
  #[structopt(parse(from_os_str))]
  input: PathBuf,
  /// A JSON5 file with layout, header and DIP switch settings.
  #[structopt(short, long, parse(from_os_str))]
  config: Option<PathBuf>,
  /// The directory descriptors are written to.
  #[structopt(short, long, parse(from_os_str), default_value = ".")]
  output: PathBuf,
  /// Converts only the named machine; may be repeated.
  #[structopt(short, long = "machine")]
  machines: Vec<String>,
  /// Prints descriptors to stdout instead of writing files.
  #[structopt(short, long)]
  print: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("cannot read the listing: {source}")]
struct ReadError {
  path: PathBuf,
  source: io::Error,
}

impl error::Error for ReadError {
  fn cause(&self) -> error::Cause<'_> {
    error::Cause::File(&self.path)
  }

  fn action(&self) -> Option<error::Action> {
    Some(error::Action::Parsing)
  }
}

fn main() {
  env_logger::Builder::from_env(
    env_logger::Env::default().default_filter_or("info"),
  )
  .init();
  let opts = Opts::from_args();

  let config = match opts.config.as_ref().map(Config::load).transpose() {
    Ok(config) => config.unwrap_or_default(),
    Err(e) => return Errors::from(e).dump_and_die(1),
  };

  let text = match fs::read_to_string(&opts.input) {
    Ok(text) => text,
    Err(source) => {
      let path = opts.input.clone();
      return Errors::from(ReadError { path, source }).dump_and_die(1);
    }
  };
  let machines = match mame::parse(&text) {
    Ok(machines) => machines,
    Err(e) => return Errors::from(e).dump_and_die(1),
  };

  for name in &opts.machines {
    if !machines.iter().any(|m| m.id == *name) {
      warn!("machine `{}` is not in the listing", name);
    }
  }

  let mut failures = Errors::new();
  let selected = machines
    .iter()
    .filter(|m| opts.machines.is_empty() || opts.machines.contains(&m.id));
  for machine in selected {
    let mra = match mra::make_mra(machine, &config) {
      Ok(mra) => mra,
      Err(e) => {
        warn!("skipping `{}`", machine.id);
        failures.push(e);
        continue;
      }
    };
    let _ = mra.warnings.dump_to(Severity::Warning, io::stderr());

    if opts.print {
      print!("{}", mra.root);
      continue;
    }
    match mra.write_to_dir(&opts.output) {
      Ok(path) => info!("wrote {}", path.display()),
      Err(e) => {
        warn!("skipping `{}`", machine.id);
        failures.push(e);
      }
    }
  }

  if !failures.is_ok() {
    let _ = failures.dump_to(Severity::Error, io::stderr());
    eprintln!();
    eprintln!("error: {} machines were skipped", failures.len());
    process::exit(1);
  }
}
