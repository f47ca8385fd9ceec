#![forbid(unsafe_code)]

use car::archive;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "car", version, about = "CAR v4 container archiver")]
struct Cli {
    /// Log diagnostics at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Pack a directory tree into a new archive.
    Create {
        /// Archive file to write.
        #[arg(long)]
        archive: PathBuf,
        /// Directory to pack.
        #[arg(long)]
        root: PathBuf,
    },

    /// Extract every entry under an output directory.
    Extract {
        #[arg(long)]
        archive: PathBuf,
        /// Output directory; stored names are appended to it verbatim.
        #[arg(long)]
        output: PathBuf,
    },

    /// Extract every entry with exactly this name to one output path.
    ExtractItem {
        #[arg(long)]
        archive: PathBuf,
        /// Stored name, e.g. "/sub/file.txt".
        #[arg(long)]
        item: String,
        #[arg(long)]
        output: PathBuf,
    },

    /// List stored names in table-of-contents order.
    List {
        #[arg(long)]
        archive: PathBuf,
    },

    /// Check magic, version and checksums.
    Validate {
        #[arg(long)]
        archive: PathBuf,
    },

    /// Print header details.
    Info {
        #[arg(long)]
        archive: PathBuf,
        /// Print every entry too.
        #[arg(long, default_value_t = false)]
        entries: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cmd: Command) -> archive::ArchiveResult<()> {
    match cmd {
        Command::Create { archive: out, root } => {
            let summary = archive::build(&root, &out)?;
            tracing::info!(
                "wrote {} ({} entries, {} bytes)",
                out.display(),
                summary.entries,
                summary.total_size
            );
        }
        Command::Extract { archive: pak, output } => archive::extract_all(&pak, &output)?,
        Command::ExtractItem {
            archive: pak,
            item,
            output,
        } => {
            if archive::extract_item(&pak, &item, &output)? == 0 {
                tracing::warn!("no entry named '{item}' in {}", pak.display());
            }
        }
        Command::List { archive: pak } => {
            archive::list(&pak)?;
        }
        Command::Validate { archive: pak } => {
            archive::verify(&pak)?;
            println!("ok");
        }
        Command::Info {
            archive: pak,
            entries,
        } => {
            println!("{}", archive::info(&pak)?);
            if entries {
                for e in archive::entries(&pak)? {
                    println!(
                        "{:<8} off={:<10} len={:<10} {}",
                        e.kind.as_str(),
                        e.data_offset,
                        e.size,
                        e.name
                    );
                }
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli.cmd) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
