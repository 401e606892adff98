use clap::{Parser, Subcommand};
use cowtree::console::{display_bytes, echo_table};
use cowtree::errors::Error;
use cowtree::loader::Loader;
use cowtree::storage::{FileStore, NodeView, PageId, PageStore};
use cowtree::{echo, echo_lines, error};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(
    name = "cowtree",
    version = VERSION,
    about = "Copy-on-write B-tree pages on disk."
)]
struct Cli {
    /// Page file to operate on.
    #[arg(long, env = "COWTREE_STORE", default_value = "cowtree.db")]
    store: PathBuf,

    /// Maximum number of live pages in the file.
    #[arg(long, env = "COWTREE_CAPACITY", default_value_t = 1024)]
    capacity: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Insert or replace a record.
    Put { key: String, value: String },
    /// Print the value stored under a key.
    Get { key: String },
    /// Insert COUNT generated records.
    Load {
        count: usize,
        /// Size of each generated value in bytes.
        #[arg(long, default_value_t = 32)]
        value_size: usize,
    },
    /// Print a page (the root by default).
    Dump {
        #[arg(long)]
        page: Option<u64>,
    },
    /// Print tree statistics.
    Stats,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{}\n", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let store = FileStore::open_or_create(&cli.store, Some(cli.capacity))?;
    let mut loader = match store.root() {
        Some(root) => Loader::open(store, root)?,
        None => Loader::create(store)?,
    };
    debug!(root = loader.root().0, "Opened tree.");

    match cli.command {
        Command::Put { key, value } => {
            loader.insert(key.as_bytes(), value.as_bytes())?;
            echo!("OK\n");
        }
        Command::Get { key } => match loader.get(key.as_bytes())? {
            Some(value) => echo!("{}\n", display_bytes(&value)),
            None => error!("{}\n", err_not_found(&key)),
        },
        Command::Load { count, value_size } => {
            let start = loader.stats()?.records;
            for i in start..start + count {
                let key = format!("key{:08}", i);
                let value = vec![b'a' + (i % 26) as u8; value_size];
                loader.insert(key.as_bytes(), &value)?;
            }
            info!(count, "Loaded records.");
            echo!("Loaded {} records.\n", count);
        }
        Command::Dump { page } => {
            let id = page.map(PageId).unwrap_or_else(|| loader.root());
            dump(loader.store(), id)?;
        }
        Command::Stats => {
            let stats = loader.stats()?;
            let store = loader.store();
            echo_lines!(
                "root: {}\nroot size: {} bytes\nleaves: {}\nrecords: {}\nleaf bytes: {}\nlive pages: {}\nfree slots: {}\n",
                stats.root,
                stats.root_size,
                stats.leaves,
                stats.records,
                stats.leaf_bytes,
                store.live_pages(),
                store.free_slots()
            );
        }
    }

    let root = loader.root();
    let mut store = loader.into_store();
    store.set_root(Some(root));
    store.flush()
}

fn err_not_found(key: &str) -> Error {
    Error::NotFound(format!("Key '{}' not found.", key))
}

fn dump(store: &FileStore, id: PageId) -> Result<(), Error> {
    let page = store.get(id)?;
    let node = NodeView::decode(&page)?;
    echo_lines!(
        "page {}: {} node, {} records, {} bytes\n",
        id,
        node.kind(),
        node.key_count(),
        node.size()
    );

    let headers = vec!["Index".to_string(), "Key".to_string(), "Value".to_string()];
    let mut rows = Vec::with_capacity(node.key_count() as usize);
    for (i, kv) in node.iter().enumerate() {
        let value = if node.is_leaf() {
            display_bytes(kv.val)
        } else {
            format!("-> {}", kv.child()?)
        };
        rows.push(vec![i.to_string(), display_bytes(kv.key), value]);
    }
    echo!("{}", echo_table(&headers, &rows));
    Ok(())
}
