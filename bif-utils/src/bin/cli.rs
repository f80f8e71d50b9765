use anyhow::Context;
use bif::{
    archive::{Archive, ArchivePath, DirArchive, MemArchive},
    Config, Experiment, HashAlgorithm, SessionEvent,
};
use bif_utils::{dump, import::ConverterRegistry, sqlite::SqliteArchive};
use maplit::btreemap;
use rand::Rng;
use serde_json::json;
use std::{fs::File, io::BufReader, path::PathBuf, str::FromStr, time::Instant};
use structopt::StructOpt;
use tracing::{info, Level};

#[cfg(target_env = "musl")]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

pub type Result<T> = anyhow::Result<T>;

#[derive(Clone)]
enum Storage {
    Memory(MemArchive),
    Dir(DirArchive),
    Sqlite(SqliteArchive),
}

impl Archive for Storage {
    fn add(&self, path: &ArchivePath, content: &[u8]) -> bif::Result<()> {
        match self {
            Self::Memory(m) => m.add(path, content),
            Self::Dir(d) => d.add(path, content),
            Self::Sqlite(s) => s.add(path, content),
        }
    }

    fn remove(&self, path: &ArchivePath) -> bif::Result<()> {
        match self {
            Self::Memory(m) => m.remove(path),
            Self::Dir(d) => d.remove(path),
            Self::Sqlite(s) => s.remove(path),
        }
    }

    fn read(&self, path: &ArchivePath) -> bif::Result<Vec<u8>> {
        match self {
            Self::Memory(m) => m.read(path),
            Self::Dir(d) => d.read(path),
            Self::Sqlite(s) => s.read(path),
        }
    }
}

impl FromStr for Storage {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        let res = if s == "memory" {
            Self::Memory(MemArchive::unbounded())
        } else if let Some(dir) = s.strip_prefix("dir:") {
            Self::Dir(DirArchive::new(dir, None)?)
        } else if let Some(dir) = s.strip_prefix("zdir:") {
            Self::Dir(DirArchive::new(dir, Some(10))?)
        } else {
            Self::Sqlite(SqliteArchive::open(s)?)
        };
        Ok(res)
    }
}

#[derive(StructOpt)]
#[structopt(about = "CLI to work with BIF archives")]
struct Opts {
    #[structopt(short, parse(from_occurrences = set_log_level), global = true)]
    #[allow(dead_code)] // log level will be set in [`set_log_level`]
    /// Increase verbosity
    verbosity: u64,
    #[structopt(long, default_value = "memory", global = true)]
    /// Storage, possible options "memory", "dir:<path>" (one file per object),
    /// "zdir:<path>" (zstd compressed files) or a path to a sqlite database
    /// (will create it if it doesn't exist)
    storage: Storage,
    #[structopt(long, default_value = "sha224", global = true)]
    /// Digest for content hashes, "sha224", "sha224-seeded" or "sha256"
    hash: HashAlgorithm,
    #[structopt(long, global = true)]
    /// Samples per segment of channel data
    segment_size: Option<usize>,
    #[structopt(subcommand)]
    cmd: Command,
}

fn set_log_level(verbosity: u64) -> u64 {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
    verbosity
}

#[derive(StructOpt)]
enum Command {
    /// Import a recording into a new experiment
    Import {
        #[structopt(long)]
        /// Format of the input, see `formats`
        format: String,
        #[structopt(long)]
        /// The recording to import
        input: PathBuf,
        #[structopt(long)]
        /// Name of the experiment
        name: Option<String>,
        #[structopt(long)]
        /// Dump the resulting tree as dot to stdout. Can be piped directly:
        /// `bif-cli import .. --graph | dot -Tpng -o output.png`.
        graph: bool,
    },
    /// Write an experiment with one channel of random samples
    Demo {
        #[structopt(long, default_value = "500000")]
        /// The number of samples
        samples: usize,
        #[structopt(long)]
        /// Dump the resulting tree as dot to stdout
        graph: bool,
    },
    /// Print an object of the archive, e.g. `/SUBJECT-<id>/.metadata`
    Cat {
        /// `/` separated path of the object
        path: String,
    },
    /// List the known import formats
    Formats,
}

fn parse_path(text: &str) -> ArchivePath {
    text.split('/')
        .filter(|x| !x.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn main() -> Result<()> {
    let opts = Opts::from_args();
    let storage = opts.storage;
    let mut config = Config {
        hash: opts.hash,
        ..Config::default()
    };
    if let Some(segment_size) = opts.segment_size {
        anyhow::ensure!(segment_size > 0, "segment size must not be 0");
        config.segment_size = segment_size;
    }
    let registry = ConverterRegistry::with_builtin();
    match opts.cmd {
        Command::Import {
            format,
            input,
            name,
            graph,
        } => {
            let converter = registry.get(&format)?;
            let file = File::open(&input).with_context(|| format!("opening {}", input.display()))?;
            let mut experiment = Experiment::new(
                storage,
                config,
                btreemap! {
                    "name".to_owned() => json!(name.unwrap_or_default()),
                    "creator".to_owned() => json!(format!("bif-cli {} importer", format)),
                },
            );
            let t0 = Instant::now();
            converter.convert(&mut experiment, &mut BufReader::new(file))?;
            experiment.write()?;
            info!("imported {} in {}ms", input.display(), t0.elapsed().as_millis());
            if graph {
                dump::graph(&experiment, std::io::stdout())?;
            } else {
                println!("{}", experiment.id()?);
            }
        }
        Command::Demo { samples, graph } => {
            let mut rng = rand::thread_rng();
            let xs = (0..samples)
                .map(|_| rng.gen_range(-1.0..1.0))
                .collect::<Vec<f64>>();
            let mut experiment = Experiment::new(
                storage,
                config,
                btreemap! {
                    "name".to_owned() => json!("Exp!"),
                    "description".to_owned() => json!("blah!"),
                },
            );
            let subject = experiment.add_subject(btreemap! { "name".to_owned() => json!("Subject001") })?;
            let session = experiment.add_session(subject, Default::default())?;
            experiment.add_event(session, SessionEvent::new(0.0, "start"))?;
            let channel = experiment.add_channel(
                session,
                btreemap! {
                    "label".to_owned() => json!("FP1"),
                    "unit".to_owned() => json!("V"),
                    "sampling-rate".to_owned() => json!(512.0),
                },
            )?;
            let t0 = Instant::now();
            experiment.set_data(channel, &xs)?;
            experiment.write()?;
            info!("wrote {} samples in {}ms", samples, t0.elapsed().as_millis());
            let read = experiment.get_data(channel, 0, None)?;
            anyhow::ensure!(read == xs, "samples do not survive a roundtrip");
            if graph {
                dump::graph(&experiment, std::io::stdout())?;
            } else {
                println!("{}", experiment.path(channel)?);
            }
        }
        Command::Cat { path } => {
            dump::dump_json(&storage, &parse_path(&path), std::io::stdout())?;
        }
        Command::Formats => {
            for (name, aliases) in registry.formats() {
                if aliases.is_empty() {
                    println!("{}", name);
                } else {
                    println!("{} ({})", name, aliases.join(", "));
                }
            }
        }
    }
    Ok(())
}
