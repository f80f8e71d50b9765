//! Large sample sequences, stored as fixed size segments
use crate::{
    archive::{Archive, ArchivePath},
    config::RangeReads,
    error::{Error, Result},
    hash::{ContentHash, HashAlgorithm},
};
use tracing::{debug, trace};

/// A sequence of samples that is split into segments of `segment_size` samples,
/// each stored as its own json array at `path/SEGMENT-<i>`.
///
/// The content hash is a single running digest over the serialized segments in order.
#[derive(Debug, Clone)]
pub struct SegmentedData {
    path: ArchivePath,
    segment_size: usize,
    len: usize,
    content_hash: Option<ContentHash>,
    /// number of segments that may exist in the archive, including those of a failed `set`
    written: usize,
}

impl SegmentedData {
    pub fn new(path: ArchivePath, segment_size: usize) -> Result<Self> {
        if segment_size == 0 {
            return Err(Error::InvalidConfig("segment size must not be 0"));
        }
        Ok(Self {
            path,
            segment_size,
            len: 0,
            content_hash: None,
            written: 0,
        })
    }

    /// Number of segments written for `len` samples.
    ///
    /// This is always one more than the number of full segments, so a length that is a
    /// multiple of the segment size gets a trailing empty segment.
    pub fn segment_count(len: usize, segment_size: usize) -> usize {
        len / segment_size + 1
    }

    pub fn path(&self) -> &ArchivePath {
        &self.path
    }

    pub fn segment_path(&self, index: usize) -> ArchivePath {
        self.path.join(format!("SEGMENT-{}", index))
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// number of samples of the last `set`
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn content_hash(&self) -> Option<&ContentHash> {
        self.content_hash.as_ref()
    }

    /// Replaces the whole sequence
    pub fn set(&mut self, archive: &dyn Archive, hash: HashAlgorithm, samples: &[f64]) -> Result<()> {
        if let Some(index) = samples.iter().position(|x| !x.is_finite()) {
            return Err(Error::NonFiniteSample { index });
        }
        let count = Self::segment_count(samples.len(), self.segment_size);
        debug!(
            "writing {} samples as {} segments to {}",
            samples.len(),
            count,
            self.path
        );
        let mut hasher = hash.hasher();
        for i in 0..count {
            let from = (i * self.segment_size).min(samples.len());
            let to = ((i + 1) * self.segment_size).min(samples.len());
            let data = serde_json::to_vec(&samples[from..to])?;
            self.written = self.written.max(i + 1);
            archive.add(&self.segment_path(i), &data)?;
            hasher.update(&data);
        }
        // a previous, longer sequence might have left segments behind
        for i in (count..self.written).rev() {
            trace!("removing stale segment {}", i);
            archive.remove(&self.segment_path(i))?;
            self.written = i;
        }
        self.len = samples.len();
        self.content_hash = Some(hasher.finalize());
        Ok(())
    }

    /// Restores length and content hash from the segments in the archive, reading them in
    /// order until one is missing
    pub fn load(&mut self, archive: &dyn Archive, hash: HashAlgorithm) -> Result<usize> {
        let mut hasher = hash.hasher();
        let mut len = 0;
        let mut count = 0;
        loop {
            let data = match archive.read(&self.segment_path(count)) {
                Ok(data) => data,
                Err(Error::ObjectNotFound(_)) if count > 0 => break,
                Err(cause) => return Err(cause),
            };
            len += serde_json::from_slice::<Vec<f64>>(&data)?.len();
            hasher.update(&data);
            count += 1;
        }
        debug!("loaded {} samples in {} segments from {}", len, count, self.path);
        self.len = len;
        self.written = self.written.max(count);
        self.content_hash = Some(hasher.finalize());
        Ok(len)
    }

    /// Reads the samples from `start` to `end`, where `end` defaults to the last sample.
    ///
    /// See [`RangeReads`] for how the end of the range is treated.
    pub fn get(
        &self,
        archive: &dyn Archive,
        start: usize,
        end: Option<usize>,
        mode: RangeReads,
    ) -> Result<Vec<f64>> {
        match mode {
            RangeReads::Inclusive => self.get_inclusive(archive, start, end),
            RangeReads::Legacy => self.get_legacy(archive, start, end),
        }
    }

    fn get_inclusive(&self, archive: &dyn Archive, start: usize, end: Option<usize>) -> Result<Vec<f64>> {
        if self.len == 0 {
            return match end {
                Some(end) => Err(Error::IndexOutOfBounds {
                    length: 0,
                    tried: end,
                }),
                None => Ok(Vec::new()),
            };
        }
        let end = end.unwrap_or(self.len - 1);
        if end >= self.len {
            return Err(Error::IndexOutOfBounds {
                length: self.len,
                tried: end,
            });
        }
        if start > end {
            return Ok(Vec::new());
        }
        let wanted = end - start + 1;
        let start_segment = start / self.segment_size;
        let start_offset = start % self.segment_size;
        let end_segment = end / self.segment_size;
        let mut result = Vec::with_capacity(wanted);
        for i in start_segment..=end_segment {
            let segment = self.read_segment(archive, i)?;
            let skip = if i == start_segment { start_offset } else { 0 };
            result.extend(segment.into_iter().skip(skip));
        }
        result.truncate(wanted);
        Ok(result)
    }

    fn get_legacy(&self, archive: &dyn Archive, start: usize, end: Option<usize>) -> Result<Vec<f64>> {
        // an end of 0 counts as missing, and with no data the default end is -1,
        // which selects no segments at all
        let end = match end {
            Some(end) if end > 0 => end,
            _ if self.len == 0 => return Ok(Vec::new()),
            _ => self.len - 1,
        };
        let start_segment = start / self.segment_size;
        let start_offset = start % self.segment_size;
        let end_segment = end / self.segment_size;
        let mut result = Vec::new();
        for i in start_segment..end_segment {
            let segment = self.read_segment(archive, i)?;
            let skip = if i == start_segment { start_offset } else { 0 };
            result.extend(segment.into_iter().skip(skip));
        }
        Ok(result)
    }

    fn read_segment(&self, archive: &dyn Archive, index: usize) -> Result<Vec<f64>> {
        let data = archive.read(&self.segment_path(index))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Removes every segment written so far, including those of a `set` that failed
    pub fn remove(&self, archive: &dyn Archive) -> Result<()> {
        for i in 0..self.written {
            archive.remove(&self.segment_path(i))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemArchive;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn samples(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 * 0.5).collect()
    }

    fn data() -> SegmentedData {
        SegmentedData::new(ArchivePath::new(vec!["CHANNEL-1", "data"]), 4).unwrap()
    }

    #[test]
    fn segment_count_has_trailing_segment() {
        assert_eq!(SegmentedData::segment_count(0, 4), 1);
        assert_eq!(SegmentedData::segment_count(3, 4), 1);
        assert_eq!(SegmentedData::segment_count(4, 4), 2);
        assert_eq!(SegmentedData::segment_count(9, 4), 3);
    }

    #[test]
    fn set_writes_segments() -> anyhow::Result<()> {
        let archive = MemArchive::unbounded();
        let mut data = data();
        data.set(&archive, HashAlgorithm::Sha224, &samples(8))?;
        assert_eq!(data.len(), 8);
        // 8 samples at 4 per segment: two full segments and an empty one
        assert_eq!(archive.len(), 3);
        assert_eq!(archive.read(&data.segment_path(0))?, b"[0.0,0.5,1.0,1.5]".to_vec());
        assert_eq!(archive.read(&data.segment_path(2))?, b"[]".to_vec());
        assert_eq!(
            data.segment_path(1),
            ArchivePath::new(vec!["CHANNEL-1", "data", "SEGMENT-1"])
        );
        Ok(())
    }

    #[test]
    fn hash_is_over_the_serialized_segments() -> anyhow::Result<()> {
        let archive = MemArchive::unbounded();
        let mut data = data();
        data.set(&archive, HashAlgorithm::Sha224, &[1.0, 2.0, 3.0, 4.0, 5.0])?;
        let expected = HashAlgorithm::Sha224.digest(b"[1.0,2.0,3.0,4.0][5.0]");
        assert_eq!(data.content_hash(), Some(&expected));
        Ok(())
    }

    #[test]
    fn empty_set_writes_one_empty_segment() -> anyhow::Result<()> {
        let archive = MemArchive::unbounded();
        let mut data = data();
        data.set(&archive, HashAlgorithm::Sha224, &[])?;
        assert_eq!(archive.paths(), vec![data.segment_path(0)]);
        assert_eq!(data.get(&archive, 0, None, RangeReads::Inclusive)?, Vec::<f64>::new());
        assert_eq!(data.get(&archive, 0, None, RangeReads::Legacy)?, Vec::<f64>::new());
        assert!(matches!(
            data.get(&archive, 0, Some(0), RangeReads::Inclusive),
            Err(Error::IndexOutOfBounds { length: 0, tried: 0 })
        ));
        Ok(())
    }

    #[test]
    fn inclusive_ranges() -> anyhow::Result<()> {
        let archive = MemArchive::unbounded();
        let mut data = data();
        let xs = samples(10);
        data.set(&archive, HashAlgorithm::Sha224, &xs)?;
        let get = |start, end| data.get(&archive, start, end, RangeReads::Inclusive);
        assert_eq!(get(0, None)?, xs);
        assert_eq!(get(0, Some(9))?, xs);
        assert_eq!(get(3, Some(5))?, xs[3..=5].to_vec());
        assert_eq!(get(4, Some(4))?, vec![xs[4]]);
        assert_eq!(get(9, None)?, vec![xs[9]]);
        assert_eq!(get(6, Some(5))?, Vec::<f64>::new());
        assert!(matches!(get(0, Some(10)), Err(Error::IndexOutOfBounds { length: 10, tried: 10 })));
        Ok(())
    }

    /// Reference trace of the source tools for 10 samples at 4 per segment
    #[test]
    fn legacy_ranges_reproduce_the_exclusive_end_segment() -> anyhow::Result<()> {
        let archive = MemArchive::unbounded();
        let mut data = data();
        let xs = samples(10);
        data.set(&archive, HashAlgorithm::Sha224, &xs)?;
        let get = |start, end| data.get(&archive, start, end, RangeReads::Legacy);
        // end = 9 is in segment 2, so only segments 0 and 1 are read
        assert_eq!(get(0, None)?, xs[0..8].to_vec());
        // start offset is dropped, no trimming at the tail
        assert_eq!(get(1, Some(5))?, xs[1..4].to_vec());
        // start and end in the same segment read nothing
        assert_eq!(get(4, Some(6))?, Vec::<f64>::new());
        assert_eq!(get(2, Some(8))?, xs[2..8].to_vec());
        // an end of 0 reads up to the default end
        assert_eq!(get(0, Some(0))?, xs[0..8].to_vec());
        assert_eq!(get(0, Some(0))?, get(0, None)?);
        Ok(())
    }

    #[test]
    fn legacy_ranges_with_exact_multiple() -> anyhow::Result<()> {
        let archive = MemArchive::unbounded();
        let mut data = data();
        let xs = samples(8);
        data.set(&archive, HashAlgorithm::Sha224, &xs)?;
        // end = 7 is in segment 1, so the last full segment is missing
        assert_eq!(data.get(&archive, 0, Some(7), RangeReads::Legacy)?, xs[0..4].to_vec());
        assert_eq!(data.get(&archive, 0, Some(7), RangeReads::Inclusive)?, xs);
        Ok(())
    }

    #[test]
    fn shrinking_removes_stale_segments() -> anyhow::Result<()> {
        let archive = MemArchive::unbounded();
        let mut data = data();
        data.set(&archive, HashAlgorithm::Sha224, &samples(13))?;
        assert_eq!(archive.len(), 4);
        data.set(&archive, HashAlgorithm::Sha224, &samples(2))?;
        assert_eq!(archive.paths(), vec![data.segment_path(0)]);
        data.remove(&archive)?;
        assert!(archive.is_empty());
        Ok(())
    }

    #[test]
    fn non_finite_samples_are_rejected() {
        let archive = MemArchive::unbounded();
        let mut data = data();
        let res = data.set(&archive, HashAlgorithm::Sha224, &[1.0, f64::NAN]);
        assert!(matches!(res, Err(Error::NonFiniteSample { index: 1 })));
        assert!(archive.is_empty());
        assert!(data.content_hash().is_none());
    }

    #[test]
    fn reads_only_intersecting_segments() -> anyhow::Result<()> {
        let archive = MemArchive::unbounded();
        let mut data = data();
        let xs = samples(12);
        data.set(&archive, HashAlgorithm::Sha224, &xs)?;
        // segment 0 is gone, a read that does not touch it still works
        archive.remove(&data.segment_path(0))?;
        assert_eq!(data.get(&archive, 4, Some(11), RangeReads::Inclusive)?, xs[4..].to_vec());
        assert!(matches!(
            data.get(&archive, 3, Some(4), RangeReads::Inclusive),
            Err(Error::ObjectNotFound(_))
        ));
        Ok(())
    }

    #[quickcheck]
    fn inclusive_get_is_a_slice(xs: Vec<i32>, size: u8, a: usize, b: usize) -> TestResult {
        if xs.is_empty() || size == 0 {
            return TestResult::discard();
        }
        let xs = xs.into_iter().map(f64::from).collect::<Vec<_>>();
        let (start, end) = (a % xs.len(), b % xs.len());
        let archive = MemArchive::unbounded();
        let mut data = match SegmentedData::new(ArchivePath::new(vec!["data"]), size as usize) {
            Ok(data) => data,
            Err(_) => return TestResult::failed(),
        };
        if data.set(&archive, HashAlgorithm::Sha224, &xs).is_err() {
            return TestResult::failed();
        }
        let expected = if start <= end {
            xs[start..=end].to_vec()
        } else {
            Vec::new()
        };
        match data.get(&archive, start, Some(end), RangeReads::Inclusive) {
            Ok(res) => TestResult::from_bool(res == expected),
            Err(_) => TestResult::failed(),
        }
    }

    #[quickcheck]
    fn hash_depends_only_on_content(xs: Vec<i32>) -> bool {
        let xs = xs.into_iter().map(f64::from).collect::<Vec<_>>();
        let archive = MemArchive::unbounded();
        let mut a = SegmentedData::new(ArchivePath::new(vec!["a"]), 3).unwrap();
        let mut b = SegmentedData::new(ArchivePath::new(vec!["b"]), 3).unwrap();
        a.set(&archive, HashAlgorithm::Sha224, &xs).is_ok()
            && b.set(&archive, HashAlgorithm::Sha224, &xs).is_ok()
            && a.content_hash() == b.content_hash()
    }

    #[test]
    fn zero_segment_size_is_an_error() {
        assert!(matches!(
            SegmentedData::new(ArchivePath::new(vec!["data"]), 0),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn failed_set_leaves_no_segments_behind() -> anyhow::Result<()> {
        let archive = MemArchive::unbounded();
        let failing = FailAfter {
            inner: &archive,
            remaining: AtomicUsize::new(2),
        };
        let mut data = data();
        let res = data.set(&failing, HashAlgorithm::Sha224, &samples(12));
        assert!(matches!(res, Err(Error::StorageUnavailable(_))));
        assert_eq!(archive.len(), 2);
        assert!(data.content_hash().is_none());
        data.remove(&archive)?;
        assert!(archive.is_empty());

        // a shorter set after a failed longer one cleans up as well
        failing.remaining.store(3, Ordering::SeqCst);
        assert!(data.set(&failing, HashAlgorithm::Sha224, &samples(12)).is_err());
        data.set(&archive, HashAlgorithm::Sha224, &samples(2))?;
        assert_eq!(archive.paths(), vec![data.segment_path(0)]);
        Ok(())
    }

    /// Fails every add after `remaining` successful ones
    struct FailAfter<'a> {
        inner: &'a MemArchive,
        remaining: AtomicUsize,
    }

    impl Archive for FailAfter<'_> {
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
                    "disk full",
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

    #[test]
    fn load_restores_length_and_hash() -> anyhow::Result<()> {
        let archive = MemArchive::unbounded();
        let mut written = data();
        let xs = samples(10);
        written.set(&archive, HashAlgorithm::Sha224, &xs)?;
        let mut loaded = data();
        assert_eq!(loaded.load(&archive, HashAlgorithm::Sha224)?, 10);
        assert_eq!(loaded.content_hash(), written.content_hash());
        assert_eq!(loaded.get(&archive, 0, None, RangeReads::Inclusive)?, xs);
        let mut missing = SegmentedData::new(ArchivePath::new(vec!["nothing"]), 4)?;
        assert!(matches!(
            missing.load(&archive, HashAlgorithm::Sha224),
            Err(Error::ObjectNotFound(_))
        ));
        Ok(())
    }
}
