use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use chrono::Local;
use env_logger::Builder;
use log::{error, info, LevelFilter};

use nazir::{Corpus, NazirConfig, Pipeline, Result};

/// Command line overrides on top of the INI file.
struct RunArgs {
    /// Path to configuration file
    config_file: PathBuf,
    /// Overrides `[processor] host_id`
    host_id: Option<usize>,
    /// Overrides `[processor] host_count`
    host_count: Option<usize>,
    /// Overrides `[processor] workers`
    workers: Option<usize>,
    /// Overrides `[processor] run_id`
    run_id: Option<String>,
    /// Write the log here instead of stderr
    log_file: Option<PathBuf>,
    help: bool,
}

impl RunArgs {
    /// Parse command line arguments into configuration
    fn from_args() -> std::result::Result<Self, String> {
        let args: Vec<String> = std::env::args().collect();
        let mut run = RunArgs {
            config_file: PathBuf::from("default.ini"),
            host_id: None,
            host_count: None,
            workers: None,
            run_id: None,
            log_file: None,
            help: false,
        };

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host-id" => run.host_id = Some(Self::number(&args, &mut i)?),
                "--host-count" => run.host_count = Some(Self::number(&args, &mut i)?),
                "--workers" => run.workers = Some(Self::number(&args, &mut i)?),
                "--run-id" => {
                    i += 1;
                    let id = args.get(i).ok_or("--run-id needs a value")?;
                    run.run_id = Some(id.clone());
                }
                "--log-file" => {
                    i += 1;
                    let path = args.get(i).ok_or("--log-file needs a path")?;
                    run.log_file = Some(PathBuf::from(path));
                }
                "--help" | "-h" => run.help = true,
                arg if arg.ends_with(".ini") => run.config_file = PathBuf::from(arg),
                arg => return Err(format!("Unknown argument: {}", arg)),
            }
            i += 1;
        }
        Ok(run)
    }

    fn number(args: &[String], i: &mut usize) -> std::result::Result<usize, String> {
        let flag = &args[*i];
        *i += 1;
        args.get(*i)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| format!("{} needs a non-negative integer", flag))
    }

    fn print_help() {
        println!("nazir reuse finder - Command Line Options:");
        println!("  <file.ini>               Configuration file (default: default.ini)");
        println!("  --host-id <n>            This host's index in a multi-host run");
        println!("  --host-count <n>         Number of hosts sharing the barrier directory");
        println!("  --run-id <id>            Namespace for this run's barrier markers");
        println!("  --workers <n>            Worker threads per stage (0 = all CPUs)");
        println!("  --log-file <path>        Append the log to a file instead of stderr");
        println!();
    }

    fn apply(&self, config: &mut NazirConfig) {
        if let Some(host_id) = self.host_id {
            config.processor.host_id = host_id;
        }
        if let Some(host_count) = self.host_count {
            config.processor.host_count = host_count;
        }
        if let Some(workers) = self.workers {
            config.processor.workers = workers;
        }
        if let Some(run_id) = &self.run_id {
            config.processor.run_id = Some(run_id.clone());
        }
    }
}

fn level_filter(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        "off" | "none" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

fn init_logging(config: &NazirConfig, log_file: Option<&PathBuf>) -> Result<()> {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level_filter(&config.processor.log_level));
    // RUST_LOG refines the configured level.
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = NazirConfig::from_ini_str(&fs::read_to_string(&args.config_file)?)?;
    args.apply(&mut config);
    config.validate()?;
    init_logging(&config, args.log_file.as_ref())?;
    info!("Loaded configuration from {:?}", args.config_file);

    let start = Instant::now();
    let corpus = Corpus::discover(&config.files)?;
    let mut pipeline = Pipeline::new(config, corpus)?;
    let summary = pipeline.run()?;

    info!(
        "Finished in {}: {} candidates, {} matches, {} match records",
        format_duration(start.elapsed()),
        summary.candidate_pairs,
        summary.validated_matches,
        summary.records
    );
    Ok(())
}

fn main() {
    let args = match RunArgs::from_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            RunArgs::print_help();
            process::exit(2);
        }
    };
    if args.help {
        RunArgs::print_help();
        return;
    }
    if !args.config_file.exists() {
        eprintln!("Configuration file not found: {:?}", args.config_file);
        process::exit(2);
    }

    if let Err(e) = run(args) {
        error!("Run failed: {}", e);
        eprintln!("Run failed: {}", e);
        process::exit(1);
    }
}
