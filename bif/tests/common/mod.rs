#![allow(dead_code)]
//! helper types for the tests
use bif::{
    archive::{Archive, ArchivePath, MemArchive},
    ChannelId, Config, Error, Experiment, Metadata, Result, SessionId, SubjectId,
};
use maplit::btreemap;
use serde_json::json;
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

/// Counts the operations that reach the wrapped archive
#[derive(Clone, Default)]
pub struct OpsCountingArchive {
    inner: MemArchive,
    adds: Arc<AtomicU64>,
    reads: Arc<AtomicU64>,
    removes: Arc<AtomicU64>,
}

impl OpsCountingArchive {
    pub fn new(inner: MemArchive) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn inner(&self) -> &MemArchive {
        &self.inner
    }

    pub fn adds(&self) -> u64 {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> u64 {
        self.removes.load(Ordering::SeqCst)
    }
}

impl Archive for OpsCountingArchive {
    fn add(&self, path: &ArchivePath, data: &[u8]) -> Result<()> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        self.inner.add(path, data)
    }

    fn remove(&self, path: &ArchivePath) -> Result<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(path)
    }

    fn read(&self, path: &ArchivePath) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(path)
    }
}

/// Fails every add after a number of successful ones
#[derive(Clone)]
pub struct FailingArchive {
    inner: MemArchive,
    remaining: Arc<AtomicUsize>,
}

impl FailingArchive {
    pub fn new(inner: MemArchive, successful_adds: usize) -> Self {
        Self {
            inner,
            remaining: Arc::new(AtomicUsize::new(successful_adds)),
        }
    }

    pub fn set_remaining(&self, successful_adds: usize) {
        self.remaining.store(successful_adds, Ordering::SeqCst);
    }
}

impl Archive for FailingArchive {
    fn add(&self, path: &ArchivePath, data: &[u8]) -> Result<()> {
        let ok = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if ok {
            self.inner.add(path, data)
        } else {
            Err(Error::storage(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("disk full while writing {}", path),
            )))
        }
    }

    fn remove(&self, path: &ArchivePath) -> Result<()> {
        self.inner.remove(path)
    }

    fn read(&self, path: &ArchivePath) -> Result<Vec<u8>> {
        self.inner.read(path)
    }
}

/// The handles of a tree with one node of each kind
pub struct Small {
    pub experiment: Experiment,
    pub subject: SubjectId,
    pub session: SessionId,
    pub channel: ChannelId,
}

pub fn small_experiment(archive: impl Archive + 'static, config: Config) -> Result<Small> {
    let mut experiment = Experiment::new(
        archive,
        config,
        btreemap! {
            "name".to_owned() => json!("Exp!"),
            "description".to_owned() => json!("blah!"),
        },
    );
    let subject = experiment.add_subject(btreemap! { "name".to_owned() => json!("Subject001") })?;
    let session = experiment.add_session(subject, Metadata::new())?;
    let channel = experiment.add_channel(
        session,
        btreemap! {
            "label".to_owned() => json!("Fp1"),
            "unit".to_owned() => json!("V"),
            "sampling-rate".to_owned() => json!(512.0),
        },
    )?;
    Ok(Small {
        experiment,
        subject,
        session,
        channel,
    })
}

/// Logs to the test output, filtered by `RUST_LOG`
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// a deterministic test signal
pub fn signal(n: usize) -> Vec<f64> {
    (0..n).map(|i| (i as f64 * 0.01).sin()).collect()
}
