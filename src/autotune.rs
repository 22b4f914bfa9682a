use crate::hw::HwInfo;

/// Default worker cap: half the logical cores, never below 1.
pub fn default_workers(hw: &HwInfo) -> usize {
    (hw.logical_cpus / 2).max(1)
}

/// Threads actually spawned for a batch.
///
/// The configured cap wins over the hardware default; a batch never gets
/// more threads than it has files.
pub fn workers_for_batch(hw: &HwInfo, configured: Option<usize>, files: usize) -> usize {
    configured
        .unwrap_or_else(|| default_workers(hw))
        .max(1)
        .min(files.max(1))
}
