//! lobstore CLI
//!
//! Maintenance tool for a file-backed large object store.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use lobstore::directory::SlotState;
use lobstore::{open_file_store, Config, LargeObjectStore, ObjectStream, SyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// lobstore CLI
#[derive(Parser, Debug)]
#[command(name = "lobstore-cli")]
#[command(about = "Inspect and edit a lobstore data directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./lobstore_data")]
    data_dir: PathBuf,

    /// fsync after every area write
    #[arg(long)]
    sync_every_write: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the store if it does not exist
    Init,

    /// Store a file as a new object and take one reference to it
    Put {
        /// File to store
        file: PathBuf,

        /// DEFLATE-compress each page
        #[arg(short, long)]
        compress: bool,
    },

    /// Write an object's content to a file ("-" for stdout)
    Get {
        /// Object id
        id: i64,

        /// Output path
        out: PathBuf,
    },

    /// Show an object's descriptor
    Info {
        /// Object id
        id: i64,
    },

    /// Add a reference to an object
    Retain {
        /// Object id
        id: i64,
    },

    /// Drop a reference; the last one deletes the object
    Release {
        /// Object id
        id: i64,
    },

    /// Show directory usage
    Status,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lobstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .sync_strategy(if args.sync_every_write {
            SyncStrategy::EveryWrite
        } else {
            SyncStrategy::OnCheckpoint
        })
        .build();

    let store = match open_file_store(&config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&store, args.command).and_then(|_| store.sync()) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(store: &Arc<LargeObjectStore>, command: Commands) -> lobstore::Result<()> {
    match command {
        Commands::Init => {
            println!("store ready, header area {}", store.header_id());
        }
        Commands::Put { file, compress } => {
            let size = std::fs::metadata(&file)?.len() as i64;
            let object = store.create_object(size, compress)?;
            let id = object.id();

            let mut stream = ObjectStream::new(Arc::clone(store), object);
            io::copy(&mut BufReader::new(File::open(&file)?), &mut stream)?;
            stream.complete()?;
            store.establish_reference(id)?;

            println!("{}", id);
        }
        Commands::Get { id, out } => {
            let object = store.get_object(id)?;
            let mut stream = ObjectStream::new(Arc::clone(store), object);
            if out.as_os_str() == "-" {
                io::copy(&mut stream, &mut io::stdout().lock())?;
            } else {
                let mut writer = BufWriter::new(File::create(&out)?);
                io::copy(&mut stream, &mut writer)?;
                writer.flush()?;
            }
        }
        Commands::Info { id } => {
            let descriptor = store.descriptor(id)?;
            match descriptor.state {
                SlotState::Deleted { next } => {
                    println!("id {}: deleted (next free {})", id, next);
                }
                _ => {
                    let object = store.get_object(id)?;
                    let refs = match descriptor.state {
                        SlotState::Complete { ref_count, .. } => ref_count.to_string(),
                        _ => "-".to_string(),
                    };
                    println!(
                        "id {}: {} size={} declared={} compressed={} refs={}",
                        id,
                        if object.is_complete() { "complete" } else { "open" },
                        object.current_size(),
                        object.declared_size(),
                        object.is_compressed(),
                        refs
                    );
                }
            }
        }
        Commands::Retain { id } => {
            store.establish_reference(id)?;
        }
        Commands::Release { id } => {
            if store.release_reference(id)? {
                println!("object {} deleted", id);
            }
        }
        Commands::Status => {
            println!(
                "slots={} free={} areas={}",
                store.slot_count(),
                store.free_slot_count()?,
                store.blocks().area_count()
            );
        }
    }
    Ok(())
}
