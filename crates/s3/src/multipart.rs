//! Multipart upload planning
//!
//! Files at or above the threshold are uploaded in parts. This module decides
//! the part size and byte ranges; the requests themselves live in the client.

/// Default part size: 64 MiB
pub const DEFAULT_PART_SIZE: u64 = 64 * 1024 * 1024;

/// Default size from which files are uploaded in parts
pub const DEFAULT_THRESHOLD: u64 = DEFAULT_PART_SIZE;

/// Minimum part size: 5 MiB (S3 requirement)
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum part size: 5 GiB
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Maximum number of parts: 10,000 (S3 limit)
pub const MAX_PARTS: u64 = 10_000;

/// Multipart upload configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartConfig {
    /// Files of at least this many bytes are uploaded in parts
    pub threshold: u64,

    /// Part size in bytes
    pub part_size: u64,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            part_size: DEFAULT_PART_SIZE,
        }
    }
}

impl MultipartConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part_size(mut self, size: u64) -> Self {
        self.part_size = size.clamp(MIN_PART_SIZE, MAX_PART_SIZE);
        self
    }

    pub fn threshold(mut self, size: u64) -> Self {
        self.threshold = size.max(MIN_PART_SIZE);
        self
    }

    /// Whether a file of `file_size` bytes goes through multipart upload
    pub fn use_multipart(&self, file_size: u64) -> bool {
        file_size >= self.threshold
    }

    /// Calculate appropriate part size for a file
    pub fn calculate_part_size(&self, file_size: u64) -> u64 {
        if file_size <= MIN_PART_SIZE {
            return MIN_PART_SIZE;
        }

        let parts = file_size.div_ceil(self.part_size);

        if parts <= MAX_PARTS {
            self.part_size
        } else {
            // Grow the parts so the file fits within the part limit
            let required_size = file_size.div_ceil(MAX_PARTS);
            required_size.clamp(MIN_PART_SIZE, MAX_PART_SIZE)
        }
    }
}

/// Calculate number of parts for a file
pub fn calculate_parts(file_size: u64, part_size: u64) -> u64 {
    file_size.div_ceil(part_size).max(1)
}

/// Byte range `[start, end)` of a 1-based part
pub fn part_byte_range(part_number: i32, part_size: u64, total_size: u64) -> (u64, u64) {
    let start = (part_number as u64 - 1) * part_size;
    let end = (start + part_size).min(total_size);
    (start, end)
}
