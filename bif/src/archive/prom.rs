use super::{Archive, ArchivePath};
use crate::error::Result;
use lazy_static::lazy_static;
use prometheus::{exponential_buckets, Histogram, HistogramOpts, Registry};

lazy_static! {
    pub static ref ARCHIVE_ADD_HIST: Histogram = Histogram::with_opts(
        HistogramOpts::new("archive_add_time", "Complete time spent in archive add",)
            .namespace("bif")
            .buckets(exponential_buckets(0.00001, 2.0, 17).unwrap()),
    )
    .unwrap();
    pub static ref ARCHIVE_READ_HIST: Histogram = Histogram::with_opts(
        HistogramOpts::new("archive_read_time", "Complete time spent in archive read",)
            .namespace("bif")
            .buckets(exponential_buckets(0.00001, 2.0, 17).unwrap()),
    )
    .unwrap();
    pub static ref ARCHIVE_REMOVE_HIST: Histogram = Histogram::with_opts(
        HistogramOpts::new("archive_remove_time", "Complete time spent in archive remove",)
            .namespace("bif")
            .buckets(exponential_buckets(0.00001, 2.0, 17).unwrap()),
    )
    .unwrap();
    pub static ref ARCHIVE_ADD_SIZE_HIST: Histogram = Histogram::with_opts(
        HistogramOpts::new("archive_add_size", "Size of objects being written",)
            .namespace("bif")
            .buckets(exponential_buckets(64.0, 2.0, 16).unwrap()),
    )
    .unwrap();
    pub static ref ARCHIVE_READ_SIZE_HIST: Histogram = Histogram::with_opts(
        HistogramOpts::new("archive_read_size", "Size of objects being read",)
            .namespace("bif")
            .buckets(exponential_buckets(64.0, 2.0, 16).unwrap()),
    )
    .unwrap();
}

pub(crate) fn register(registry: &Registry) -> Result<()> {
    registry.register(Box::new(ARCHIVE_ADD_HIST.clone()))?;
    registry.register(Box::new(ARCHIVE_READ_HIST.clone()))?;
    registry.register(Box::new(ARCHIVE_REMOVE_HIST.clone()))?;
    registry.register(Box::new(ARCHIVE_ADD_SIZE_HIST.clone()))?;
    registry.register(Box::new(ARCHIVE_READ_SIZE_HIST.clone()))?;
    Ok(())
}

/// Wraps an archive and records timings and sizes of every operation
#[derive(Debug, Clone)]
pub struct Metered<A>(A);

impl<A> Metered<A> {
    pub fn new(inner: A) -> Self {
        Self(inner)
    }

    pub fn into_inner(self) -> A {
        self.0
    }
}

impl<A: Archive> Archive for Metered<A> {
    fn add(&self, path: &ArchivePath, content: &[u8]) -> Result<()> {
        let _timer = ARCHIVE_ADD_HIST.start_timer();
        ARCHIVE_ADD_SIZE_HIST.observe(content.len() as f64);
        self.0.add(path, content)
    }

    fn remove(&self, path: &ArchivePath) -> Result<()> {
        let _timer = ARCHIVE_REMOVE_HIST.start_timer();
        self.0.remove(path)
    }

    fn read(&self, path: &ArchivePath) -> Result<Vec<u8>> {
        let _timer = ARCHIVE_READ_HIST.start_timer();
        let data = self.0.read(path)?;
        ARCHIVE_READ_SIZE_HIST.observe(data.len() as f64);
        Ok(data)
    }
}
