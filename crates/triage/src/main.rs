//! Sysdiagnose triage command line
//!
//! Analysis commands over an extracted sysdiagnose case folder.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use triage_logging::{init_logging, LogConfig};
use triage_yarascan::RULES_PATH_ENV;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "triage", version, about = "Triage tools for extracted sysdiagnose cases")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan every file of a case folder with a directory of YARA rules
    Yarascan {
        /// Extracted case folder to scan
        case_dir: PathBuf,

        /// Directory of .yar/.yara rule files
        #[arg(long, env = RULES_PATH_ENV)]
        rules: Option<PathBuf>,

        /// Worker threads (0 = one per CPU)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Result file (default: <CASE_DIR>/yarascan.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// File base name to skip; can be given multiple times
        #[arg(long = "ignore", value_name = "NAME")]
        ignore: Vec<String>,

        /// Follow symbolic links inside the case folder
        #[arg(long)]
        follow_symlinks: bool,

        /// Print the JSON result instead of a summary table
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn wants_json(&self) -> bool {
        match self {
            Commands::Yarascan { json, .. } => *json,
        }
    }
}

fn run_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Yarascan {
            case_dir,
            rules,
            workers,
            output,
            config,
            ignore,
            follow_symlinks,
            json,
        } => cli::yarascan::run(cli::yarascan::YarascanArgs {
            case_dir,
            rules,
            workers,
            output,
            config,
            ignore,
            follow_symlinks,
            json,
        }),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = cli.command.wants_json();

    if let Err(e) = init_logging(LogConfig {
        app_name: "triage",
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: failed to initialize logging: {:#}", e);
    }

    match run_command(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else {
                eprintln!("{:?}", err);
            }
            ExitCode::from(1)
        }
    }
}
