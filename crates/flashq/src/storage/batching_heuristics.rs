//! Heuristics for sizing in-memory append batches.

/// Default byte budget for a single in-memory batch before it is flushed
/// to the underlying log. Chosen to keep per-append allocation overhead
/// low without holding unbounded memory per partition.
const DEFAULT_BATCH_BYTES: usize = 16 * 1024;

pub fn default_batch_bytes() -> usize {
    std::env::var("FLASHQ_BATCH_BYTES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_BATCH_BYTES)
}
