use anyhow::{bail, Context, Result};
use bbolt_dump::*;
use clap::Parser;
use env_logger::Env;
use log::warn;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_LOG_FILTER: &str = "warn";

/// Dump every bucket and key/value of a boltdb file.
#[derive(Debug, Parser)]
#[command(name = "bbolt-dump", version, about, long_about = None)]
struct Args {
  /// The boltdb file to dump
  path: Option<PathBuf>,

  /// Schema used to decode the values
  #[arg(long, default_value = schema::CONTAINERD)]
  schema: String,

  /// Read the file in place instead of a private copy. Fails while another
  /// process holds the database open.
  #[arg(long)]
  no_copy: bool,

  /// How long to wait for the file lock, in milliseconds. Waits forever if unset.
  #[arg(long)]
  timeout_ms: Option<u64>,

  /// Check every page id while reading
  #[arg(long)]
  strict: bool,

  /// env_logger-style filter string (e.g. "debug"); overrides RUST_LOG
  #[arg(long)]
  log_filter: Option<String>,
}

fn init_logging(cli_filter: Option<&str>) {
  let env = Env::default().default_filter_or(DEFAULT_LOG_FILTER);
  let mut builder = env_logger::Builder::from_env(env);
  if let Some(filter) = cli_filter {
    builder.parse_filters(filter);
  }
  builder.init();
}

/// The database file to dump, which must exist.
fn source_path(path: Option<PathBuf>) -> Result<PathBuf> {
  let Some(path) = path else {
    bail!("boltdb file need to be specified");
  };
  match path.try_exists() {
    Ok(true) => Ok(path),
    Ok(false) => bail!("boltdb file is not exist"),
    Err(e) => Err(e).with_context(|| format!("stat {:?}", path)),
  }
}

fn main() -> Result<()> {
  let args = Args::parse();
  init_logging(args.log_filter.as_deref());

  let path = source_path(args.path)?;

  let bolt = match args.timeout_ms {
    Some(ms) => BoltOptions::builder()
      .timeout(Duration::from_millis(ms))
      .strict(args.strict)
      .build(),
    None => BoltOptions::builder().strict(args.strict).build(),
  };
  let options = DumpOptions::builder()
    .schema(args.schema)
    .copy_source(!args.no_copy)
    .bolt(bolt)
    .build();
  let registry = SchemaRegistry::new();

  let stdout = io::stdout();
  let mut sink = LineSink::new(BufWriter::new(stdout.lock()));
  let stats =
    run(&path, &options, &registry, &mut sink).with_context(|| format!("dump {:?}", path))?;
  sink.flush()?;
  if !stats.recognized() {
    warn!("nothing was dumped: schema {:?} is not supported", options.schema());
  }
  Ok(())
}
