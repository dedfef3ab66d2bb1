use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdfgraph::{Document, ObjectId, ParseOptions, WriteOptions};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pdfgraph",
    about = "Inspect, clean up and repair the object graph of PDF files",
    version,
    author
)]
struct Cli {
    /// Log parser and recovery activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a document with empty pages
    Create {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Number of pages
        #[arg(short, long, default_value = "1")]
        pages: usize,
    },

    /// Show version, roots, object and page counts
    Info {
        /// Input PDF file
        input: PathBuf,

        /// Fail on damaged files instead of rebuilding them
        #[arg(long)]
        strict: bool,
    },

    /// List the objects reachable from the trailer or from one object
    Closure {
        /// Input PDF file
        input: PathBuf,

        /// Start from object number N (generation 0) instead of the trailer
        #[arg(long)]
        object: Option<u32>,

        /// Follow at most this many reference edges
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Drop unreachable objects and save
    Compact {
        /// Input PDF file
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Keep the original object numbers
        #[arg(long)]
        keep_numbers: bool,

        /// Flate-compress unfiltered streams
        #[arg(long)]
        compress: bool,
    },

    /// Reconstruct the cross-reference table by scanning the file and save
    Rebuild {
        /// Input PDF file
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Create { output, pages } => {
            let mut doc = Document::new();
            for _ in 0..pages {
                doc.add_page()?;
            }
            doc.save(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;

            println!("✓ Created {} with {} pages", output.display(), pages);
        }

        Commands::Info { input, strict } => {
            let options = if strict {
                ParseOptions::strict()
            } else {
                ParseOptions::lenient()
            };
            let doc = open(&input, options)?;
            print_info(&input, &doc)?;
        }

        Commands::Closure {
            input,
            object,
            depth,
        } => {
            let mut doc = open(&input, ParseOptions::default())?;
            let reachable = match object {
                Some(number) => {
                    let id = ObjectId::new(number, 0);
                    if doc.get_object(id).is_none() {
                        anyhow::bail!("Object {id} does not exist");
                    }
                    doc.xref_mut().transitive_closure_of(id, depth)?
                }
                None => doc.transitive_closure(depth)?,
            };

            for id in &reachable {
                let kind = doc.get_object(*id).map_or("missing", |o| o.type_name());
                println!("{id}\t{kind}");
            }
            println!(
                "{} of {} objects reachable",
                reachable.len(),
                doc.xref().len()
            );
        }

        Commands::Compact {
            input,
            output,
            keep_numbers,
            compress,
        } => {
            let mut doc = open(&input, ParseOptions::default())?;
            let before = doc.xref().len();

            let options = WriteOptions::default()
                .with_renumber(!keep_numbers)
                .with_compress_streams(compress);
            doc.save_with_options(&output, &options)
                .with_context(|| format!("Failed to write {}", output.display()))?;

            println!(
                "✓ Compacted {} objects to {} in {}",
                before,
                doc.xref().len(),
                output.display()
            );
        }

        Commands::Rebuild { input, output } => {
            let data =
                std::fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
            let mut doc = Document::rebuild_from_bytes(&data, ParseOptions::lenient())
                .with_context(|| format!("Failed to rebuild {}", input.display()))?;

            if let Some(report) = doc.recovery_report() {
                println!("Objects recovered: {}", report.objects_recovered);
                if !report.unreadable.is_empty() {
                    println!("Unreadable objects: {}", join_ids(&report.unreadable));
                }
                if report.catalog_from_scan {
                    println!("Catalog located by scanning");
                }
            }

            doc.save_with_options(&output, &WriteOptions::default().with_compact(false))
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("✓ Rebuilt document written to {}", output.display());
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "pdfgraph=debug" } else { "pdfgraph=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open(path: &Path, options: ParseOptions) -> Result<Document> {
    debug!(path = %path.display(), "opening document");
    Document::load_with_options(path, options)
        .with_context(|| format!("Failed to open {}", path.display()))
}

fn print_info(path: &Path, doc: &Document) -> Result<()> {
    println!("PDF Information for: {}", path.display());
    println!("==========================================");
    println!("PDF Version: {}", doc.version());
    println!("Objects: {}", doc.xref().len());

    let trailer = doc.trailer();
    if let Some(size) = trailer.size() {
        println!("Size: {size}");
    }
    if let Some(root) = trailer.root() {
        println!("Root: {root}");
    }
    if let Some(info) = trailer.info() {
        println!("Info: {info}");
    }
    if trailer.is_encrypted() {
        println!("Encrypted: Yes");
    }
    if let Some((permanent, changing)) = trailer.document_id() {
        println!(
            "ID: {} {}",
            hex::encode_upper(permanent),
            hex::encode_upper(changing)
        );
    }
    let revisions = trailer.chain().count();
    if revisions > 1 {
        println!("Revisions: {revisions}");
    }

    println!("Pages: {}", doc.page_count()?);
    if doc.is_recovered() {
        println!("Recovered: Yes (cross-reference table rebuilt)");
    }
    Ok(())
}

fn join_ids(ids: &[ObjectId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
