//! CLI tool to run an algorithm sequence over a JSON event file.

use clap::{ArgAction, Parser};
use log::LevelFilter;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use bankseq::{AlgorithmFactory, AlgorithmSequence, BankList, Error};
use bankseq_algorithms::event_io::{self, Event, EventIoError};
use bankseq_algorithms::{DEFAULT_BANKS, factory};

/// Run algorithms, in the order given, over every event of an event file.
///
/// The active rows of every bank are written as one JSON line per event.
#[derive(Parser)]
#[command(name = "seq-run")]
struct Cli {
    /// Event file (JSON array of events)
    input: PathBuf,

    /// Algorithm to append, CLASS or CLASS:INSTANCE (repeatable)
    #[arg(short, long = "algorithm", value_name = "CLASS[:INSTANCE]", required = true)]
    algorithms: Vec<String>,

    /// Bank to read from the event file (repeatable; default: all reconstruction banks)
    #[arg(short, long = "bank", value_name = "BANK")]
    banks: Vec<String>,

    /// Configuration file applied to every algorithm
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory searched for relative configuration paths (repeatable)
    #[arg(short = 'd', long = "config-dir", value_name = "DIR")]
    config_dirs: Vec<PathBuf>,

    /// Option override, INSTANCE.OPTION=JSON (repeatable)
    #[arg(short, long = "set", value_name = "INSTANCE.OPTION=JSON")]
    set: Vec<String>,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Show active row counts after every algorithm on stderr
    #[arg(long)]
    trace: bool,

    /// Log level for one algorithm, INSTANCE=LEVEL (repeatable)
    #[arg(short, long = "log-level", value_name = "INSTANCE=LEVEL")]
    log_levels: Vec<String>,

    /// Log more (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("bad algorithm '{0}': expected CLASS or CLASS:INSTANCE")]
    BadAlgorithm(String),

    #[error("bad option '{0}': expected INSTANCE.OPTION=JSON")]
    BadOption(String),

    #[error("bad log level '{0}': expected INSTANCE=LEVEL with LEVEL one of off, error, warn, info, debug, trace")]
    BadLogLevel(String),

    #[error("cannot create output file '{}': {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Events(#[from] EventIoError),

    #[error(transparent)]
    Engine(#[from] Error),
}

fn main() {
    let cli = Cli::parse();
    let log_levels = match parse_log_levels(&cli.log_levels) {
        Ok(levels) => levels,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };
    init_logging(cli.verbose, &log_levels);

    let factory = match factory() {
        Ok(factory) => factory,
        Err(e) => {
            eprintln!("Error building algorithm factory: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(&cli, &factory, &log_levels) {
        eprintln!("Error: {e}");
        if let RunError::Engine(engine) = &e
            && let Error::BankNotFound { bank, .. } = engine.root()
        {
            for creator in factory.creators_of(bank) {
                eprintln!("hint: bank '{bank}' is created by '{creator}'; add it earlier with -a");
            }
        }
        process::exit(1);
    }
}

/// The global filter is raised to the most verbose per-algorithm level so
/// that those stages can log below the `-v` level.
fn init_logging(verbose: u8, log_levels: &[(String, LevelFilter)]) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let level = log_levels
        .iter()
        .map(|(_, level)| *level)
        .fold(level, Ord::max);
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.parse_default_env();
    builder.format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()));
    if let Err(e) = builder.try_init() {
        eprintln!("Error initializing logger: {e}");
    }
}

fn run(
    cli: &Cli,
    factory: &AlgorithmFactory,
    log_levels: &[(String, LevelFilter)],
) -> Result<(), RunError> {
    let events = event_io::read_events(&cli.input)?;

    let names: Vec<&str> = if cli.banks.is_empty() {
        DEFAULT_BANKS.to_vec()
    } else {
        cli.banks.iter().map(String::as_str).collect()
    };
    let mut banks = BankList::from_registry(&names)?;

    let mut sequence = build_sequence(cli, factory, log_levels)?;
    sequence.print_sequence();
    sequence.start(&mut banks)?;

    let result = process_events(cli, &sequence, &events, &mut banks);
    let stopped = sequence.stop();
    result?;
    stopped?;

    if cli.verbose > 0 {
        eprintln!("Events:   {}", events.len());
    }
    Ok(())
}

fn build_sequence(
    cli: &Cli,
    factory: &AlgorithmFactory,
    log_levels: &[(String, LevelFilter)],
) -> Result<AlgorithmSequence, RunError> {
    let mut sequence = AlgorithmSequence::new("seq-run");
    for dir in &cli.config_dirs {
        sequence.set_config_directory_for_each_algorithm(dir.clone());
    }
    if let Some(config) = &cli.config {
        sequence.set_config_file_for_each_algorithm(config.clone());
    }
    for arg in &cli.algorithms {
        let (class, instance) = parse_algorithm(arg)?;
        sequence.add_from_factory(factory, class, instance)?;
    }
    for arg in &cli.set {
        let (instance, option, value) = parse_option(arg)?;
        sequence.set_option_json(instance, option, &value)?;
    }
    for (instance, level) in log_levels {
        sequence.set_log_level(instance, *level)?;
    }
    Ok(sequence)
}

fn process_events(
    cli: &Cli,
    sequence: &AlgorithmSequence,
    events: &[Event],
    banks: &mut BankList,
) -> Result<(), RunError> {
    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(File::create(path).map_err(|source| {
            RunError::Output {
                path: path.clone(),
                source,
            }
        })?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    for (number, event) in events.iter().enumerate() {
        event.fill(banks)?;
        if cli.trace {
            eprintln!("event {number}:");
            for step in sequence.run_traced(banks)? {
                let counts: Vec<String> = step
                    .active_rows
                    .iter()
                    .map(|(bank, rows)| format!("{bank}={rows}"))
                    .collect();
                eprintln!("  {} ({}): {}", step.algorithm, step.role, counts.join(" "));
            }
        } else {
            sequence.run(banks)?;
        }
        event_io::write_event(&mut out, &Event::from_banks(banks)?)?;
    }
    out.flush().map_err(EventIoError::from)?;
    Ok(())
}

/// Split `CLASS[:INSTANCE]`. Class names contain `::`, so only a single
/// trailing colon separates an instance name.
fn parse_algorithm(arg: &str) -> Result<(&str, Option<&str>), RunError> {
    let bad = || RunError::BadAlgorithm(arg.to_string());
    match arg.rsplit_once(':') {
        None if arg.is_empty() => Err(bad()),
        None => Ok((arg, None)),
        Some((class, _)) if class.ends_with(':') => Ok((arg, None)),
        Some((class, instance)) if !class.is_empty() && !instance.is_empty() => {
            Ok((class, Some(instance)))
        }
        Some(_) => Err(bad()),
    }
}

/// Split every `INSTANCE=LEVEL`. The instance name is everything before
/// the last `=`.
fn parse_log_levels(args: &[String]) -> Result<Vec<(String, LevelFilter)>, RunError> {
    args.iter()
        .map(|arg| {
            let bad = || RunError::BadLogLevel(arg.clone());
            let (instance, level) = arg.rsplit_once('=').ok_or_else(bad)?;
            if instance.is_empty() {
                return Err(bad());
            }
            let level = LevelFilter::from_str(level).map_err(|_| bad())?;
            Ok((instance.to_string(), level))
        })
        .collect()
}

/// Split `INSTANCE.OPTION=JSON`. A value that is not valid JSON is taken
/// as a string.
fn parse_option(arg: &str) -> Result<(&str, &str, serde_json::Value), RunError> {
    let bad = || RunError::BadOption(arg.to_string());
    let (target, raw) = arg.split_once('=').ok_or_else(bad)?;
    let (instance, option) = target.rsplit_once('.').ok_or_else(bad)?;
    if instance.is_empty() || option.is_empty() {
        return Err(bad());
    }
    let value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((instance, option, value))
}
