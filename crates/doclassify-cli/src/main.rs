mod cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use doclassify::logging::{self, LogFormat};

#[derive(Parser)]
#[command(
    name = "doclassify",
    about = "Classify documents with an LLM and track the results",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: ~/.doclassify/config.json when present)
    #[arg(long, global = true, env = "DOCLASSIFY_CONFIG")]
    config: Option<PathBuf>,

    /// Tracking database (overrides the config file)
    #[arg(long, global = true, env = "DOCLASSIFY_DATABASE")]
    database: Option<PathBuf>,

    /// Directory for batch reports (overrides the config file)
    #[arg(long, global = true)]
    reports_dir: Option<PathBuf>,

    /// Documents per round and worker threads
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Retries of the model call per document
    #[arg(long, global = true)]
    retries: Option<u32>,

    /// Ask the model to answer with JSON only
    #[arg(long, global = true)]
    json_only: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a single local file
    File {
        path: PathBuf,

        /// Declared MIME type (default: guessed from the extension)
        #[arg(long)]
        mime_type: Option<String>,

        /// Extract only; no model call, nothing written
        #[arg(long)]
        dry_run: bool,
    },

    /// Classify a tracked document by id
    Id {
        document_id: String,

        #[arg(long)]
        dry_run: bool,
    },

    /// Classify every pending document
    Pending {
        /// At most this many documents
        #[arg(long)]
        limit: Option<u64>,

        #[arg(long)]
        dry_run: bool,
    },

    /// Register the files in a directory as pending documents
    Scan {
        dir: PathBuf,

        /// Include subdirectories
        #[arg(long, short)]
        recursive: bool,
    },

    /// Print a document and its classification history
    Show {
        document_id: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    if let Err(e) = logging::init(cli.verbose, format) {
        eprintln!("warning: logging not initialised: {e}");
    }

    let options = cmd::GlobalOptions {
        config: cli.config,
        database: cli.database,
        reports_dir: cli.reports_dir,
        batch_size: cli.batch_size,
        retries: cli.retries,
        json_only: cli.json_only,
    };

    let result = match cli.command {
        Commands::File {
            path,
            mime_type,
            dry_run,
        } => cmd::classify::file(&options, &path, mime_type.as_deref(), dry_run),
        Commands::Id {
            document_id,
            dry_run,
        } => cmd::classify::by_id(&options, &document_id, dry_run),
        Commands::Pending { limit, dry_run } => cmd::classify::pending(&options, limit, dry_run),
        Commands::Scan { dir, recursive } => cmd::scan::run(&options, &dir, recursive),
        Commands::Show { document_id, json } => cmd::show::run(&options, &document_id, json),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
