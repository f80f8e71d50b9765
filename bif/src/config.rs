use crate::hash::HashAlgorithm;

/// How range reads on segmented data treat the last segment of the range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeReads {
    /// `[start, end]` inclusive, reading every segment that intersects the range
    Inclusive,
    /// Reads segments `start / size .. end / size` with an exclusive upper bound and
    /// no trimming at the tail, exactly like the tools that wrote the first BIF archives.
    ///
    /// The segment containing `end` is not read, so this will usually return fewer samples
    /// than asked for.
    Legacy,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// number of samples per segment of channel data
    pub segment_size: usize,
    /// digest to use for content hashes
    pub hash: HashAlgorithm,
    /// range read behavior of channel data
    pub range_reads: RangeReads,
}

impl Config {
    /// samples per channel segment: 3 minutes at 512Hz
    pub const SEGMENT_MAX_LENGTH: usize = 512 * 60 * 3;

    /// config that will produce many tiny segments
    pub fn debug() -> Self {
        Self {
            segment_size: 4,
            ..Self::default()
        }
    }

    /// config with the range read behavior of the original tools
    pub fn legacy() -> Self {
        Self {
            range_reads: RangeReads::Legacy,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            segment_size: Self::SEGMENT_MAX_LENGTH,
            hash: HashAlgorithm::Sha224,
            range_reads: RangeReads::Inclusive,
        }
    }
}
