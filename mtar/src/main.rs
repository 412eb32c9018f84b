mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mtar_core::{Cid, CompressionType, DEFAULT_ZSTD_LEVEL, Store, StoreConfig};
use output::{DecodeOutput, EncodeOutput, InitOutput, OutputWriter, PutObject, PutOutput, StatOutput};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// mtar - content-addressed tar archives
#[derive(Parser)]
#[command(name = "mtar")]
#[command(about = "Move tar file content into a content store and back, bit for bit", long_about = None)]
#[command(version)]
struct Cli {
    /// Store root directory (defaults to MTAR_STORE env var or ./mtar-store)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// More log output on stderr (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new store
    Init {
        /// Blob compression: none or zstd
        #[arg(long, default_value = "none")]
        compression: String,

        /// zstd compression level
        #[arg(long)]
        level: Option<i32>,
    },

    /// Convert a tar archive to mtar, moving file content into the store
    Encode {
        /// Input tar (defaults to stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output mtar (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rebuild the original tar archive from an mtar
    Decode {
        /// Input mtar (defaults to stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output tar (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that the store holds everything an mtar needs
    Verify {
        /// Input mtar (defaults to stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Store files as blobs and print their CIDs
    Put {
        /// Files to store
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Output blob content to stdout
    Cat {
        /// CID of the blob, or the hex sha2-256 digest of its content
        cid: String,
    },

    /// Show blob metadata
    Stat {
        /// CID of the blob, or the hex sha2-256 digest of its content
        cid: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut output = OutputWriter::new(cli.json);

    // Determine store root: CLI arg > MTAR_STORE env var > ./mtar-store default
    let root = cli
        .root
        .or_else(|| std::env::var("MTAR_STORE").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./mtar-store"));
    debug!(root = %root.display(), "using store");

    let result = match cli.command {
        Commands::Init { compression, level } => cmd_init(&root, &compression, level, &output),
        Commands::Encode { input, output: dest } => {
            if dest.is_none() {
                output.report_to_stderr();
            }
            cmd_encode(&root, input.as_deref(), dest.as_deref(), &output)
        }
        Commands::Decode { input, output: dest } => {
            if dest.is_none() {
                output.report_to_stderr();
            }
            cmd_decode(&root, input.as_deref(), dest.as_deref(), &output)
        }
        Commands::Verify { input } => cmd_verify(&root, input.as_deref(), &output),
        Commands::Put { paths } => cmd_put(&root, paths, &output),
        Commands::Cat { cid } => cmd_cat(&root, &cid),
        Commands::Stat { cid } => cmd_stat(&root, &cid, &output),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = result_code(&e);
            output.write_error(&e, code);
            ExitCode::from(code)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Exit status by failure kind, so scripts can tell a broken archive from an
/// incomplete store.
fn result_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<mtar_core::Error>() {
        Some(mtar_core::Error::Format { .. }) => 2,
        Some(mtar_core::Error::Precondition { .. }) => 3,
        Some(mtar_core::Error::Encoding { .. }) => 4,
        Some(mtar_core::Error::Reference { .. }) | Some(mtar_core::Error::NotFound { .. }) => 5,
        Some(mtar_core::Error::CorruptedObject { .. }) => 6,
        _ => 1,
    }
}

fn open_store(root: &Path) -> Result<Store> {
    Store::open(root).with_context(|| format!("Failed to open store at {}", root.display()))
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input: {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => {
            if atty::is(atty::Stream::Stdin) {
                anyhow::bail!("Refusing to read an archive from a terminal; pipe one in or pass --input");
            }
            Ok(Box::new(io::stdin().lock()))
        }
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output: {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

fn parse_cid(text: &str) -> Result<Cid> {
    Cid::parse_digest_or_text(text).with_context(|| format!("Invalid CID: {}", text))
}

fn cmd_init(root: &Path, compression: &str, level: Option<i32>, output: &OutputWriter) -> Result<()> {
    let config = StoreConfig {
        compression: CompressionType::parse(compression)?,
        level: level.unwrap_or(DEFAULT_ZSTD_LEVEL),
        ..StoreConfig::default()
    };

    Store::init(root, config)
        .with_context(|| format!("Failed to initialize store at {}", root.display()))?;

    let data = InitOutput {
        success: true,
        result_code: 0,
        root: root.display().to_string(),
        algorithm: config.algorithm.as_str().to_string(),
        compression: config.compression.as_str().to_string(),
    };
    output.write(&data, || {
        format!(
            "Initialized mtar store at {}\nAlgorithm: {}\nCompression: {}\n",
            root.display(),
            config.algorithm.as_str(),
            config.compression.as_str()
        )
    })
}

fn cmd_encode(
    root: &Path,
    input: Option<&Path>,
    dest: Option<&Path>,
    output: &OutputWriter,
) -> Result<()> {
    let store = open_store(root)?;
    let reader = open_input(input)?;
    let writer = open_output(dest)?;

    let stats = mtar_core::encode(reader, writer, &store).context("Failed to encode archive")?;

    let text = format!(
        "Encoded {} entries: {} files ({} unique, {} bytes) moved to the store, {} passed through\n",
        stats.entries, stats.files, stats.unique_blobs, stats.content_bytes, stats.passthrough
    );
    let data = EncodeOutput {
        success: true,
        result_code: 0,
        stats,
    };
    output.write(&data, || text)
}

fn cmd_decode(
    root: &Path,
    input: Option<&Path>,
    dest: Option<&Path>,
    output: &OutputWriter,
) -> Result<()> {
    let store = open_store(root)?;
    let reader = open_input(input)?;
    let writer = open_output(dest)?;

    let stats = mtar_core::decode(reader, writer, &store).context("Failed to decode archive")?;

    let text = format!(
        "Decoded {} entries: {} files ({} bytes) restored, {} bytes written\n",
        stats.entries, stats.files, stats.content_bytes, stats.bytes_written
    );
    let data = DecodeOutput {
        success: true,
        result_code: 0,
        stats,
    };
    output.write(&data, || text)
}

fn cmd_verify(root: &Path, input: Option<&Path>, output: &OutputWriter) -> Result<()> {
    let store = open_store(root)?;
    let reader = open_input(input)?;

    let stats = mtar_core::verify(reader, &store).context("Archive cannot be reconstructed")?;

    let text = format!(
        "OK: {} entries, {} files, {} bytes of tar\n",
        stats.entries, stats.files, stats.bytes_written
    );
    let data = DecodeOutput {
        success: true,
        result_code: 0,
        stats,
    };
    output.write(&data, || text)
}

fn cmd_put(root: &Path, paths: Vec<PathBuf>, output: &OutputWriter) -> Result<()> {
    let store = open_store(root)?;

    let mut objects = Vec::new();
    for path in paths {
        let cid = store
            .put_file(&path)
            .with_context(|| format!("Failed to store file: {}", path.display()))?;
        objects.push(PutObject {
            cid,
            path: path.display().to_string(),
        });
    }

    let data = PutOutput {
        success: true,
        result_code: 0,
        objects,
    };
    output.write(&data, || {
        data.objects
            .iter()
            .map(|o| format!("{} {}\n", o.cid, o.path))
            .collect()
    })
}

fn cmd_cat(root: &Path, cid_str: &str) -> Result<()> {
    let store = open_store(root)?;
    let cid = parse_cid(cid_str)?;

    let mut handle = io::stdout().lock();
    store
        .cat_blob(&cid, &mut handle)
        .with_context(|| format!("Failed to output blob {}", cid))?;
    handle.flush()?;

    Ok(())
}

fn cmd_stat(root: &Path, cid_str: &str, output: &OutputWriter) -> Result<()> {
    let store = open_store(root)?;
    let cid = parse_cid(cid_str)?;

    let blob = store
        .stat(&cid)
        .with_context(|| format!("Failed to stat blob {}", cid))?;

    let text = format!(
        "CID: {}\nHash: {}\nSize: {} bytes\nSize (on disk): {} bytes\nCompression: {}\nPath: {}\n",
        blob.cid,
        blob.cid.hash(),
        blob.size,
        blob.size_on_disk,
        blob.compression,
        blob.path.display()
    );
    let data = StatOutput {
        success: true,
        result_code: 0,
        blob,
    };
    output.write(&data, || text)
}
