use std::{
    fs,
    path::{Path, PathBuf},
    process,
};

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use yamlet::{execute, to_yaml_string, Options, YamletError, DEFAULT_MAX_CALL_DEPTH};

#[derive(Parser)]
#[command(author, version, about = "Evaluate YAML documents with embedded expressions", long_about = None)]
struct Cli {
    /// Log evaluation progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Nested function calls allowed before evaluation fails
    #[arg(long, global = true, env = "YAMLET_MAX_CALL_DEPTH", default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_call_depth: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a document and print its result as YAML
    Run {
        file: PathBuf,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Evaluate documents without printing, reporting failures
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = Options {
        max_call_depth: cli.max_call_depth,
    };
    let result = match &cli.command {
        Command::Run { file, output } => run_command(file, output.as_deref(), &options),
        Command::Check { files } => check_command(files, &options),
        Command::Version => {
            print_version();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Filter comes from `YAMLET_LOG`, falling back to `warn` (`debug` with
/// `--verbose`). Output goes to stderr so stdout stays valid YAML.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("YAMLET_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn print_version() {
    println!("yamlet {}", env!("CARGO_PKG_VERSION"));
}

fn run_command(file: &Path, output: Option<&Path>, options: &Options) -> Result<(), YamletError> {
    debug!(file = %file.display(), "running");
    let rendered = to_yaml_string(&execute(file, options)?)?;

    match output {
        Some(path) => {
            fs::write(path, rendered).map_err(|source| YamletError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            debug!(output = %path.display(), "result written");
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

fn check_command(files: &[PathBuf], options: &Options) -> Result<(), YamletError> {
    let mut failed = 0;
    for file in files {
        match execute(file, options) {
            Ok(_) => println!("✓ {}", file.display()),
            Err(err) => {
                failed += 1;
                println!("✗ {}", file.display());
                for line in err.to_string().lines() {
                    println!("    {}", line);
                }
            }
        }
    }

    if failed > 0 {
        eprintln!("{} of {} document(s) failed", failed, files.len());
        process::exit(1);
    }
    Ok(())
}
