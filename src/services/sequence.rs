//! Allocation of the `[<seq>]` tag embedded in output artifact names.
//!
//! The output directory stays the source of truth: the next number is one
//! past the highest tag found on disk, so removing every artifact starts the
//! numbering over at 1. Allocation is serialized behind one mutex and numbers
//! handed out but not yet written are tracked as leases, so two conversions
//! running side by side never receive the same number.

use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

static SEQUENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\d+)\]_.*\.pdf$").expect("sequence pattern is a valid regex")
});

/// Extracts the sequence tag from an artifact file name.
pub fn parse_sequence(name: &str) -> Option<u64> {
    SEQUENCE_PATTERN
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
}

/// Output artifact name: `<prefix>[<seq>]_<local timestamp>.pdf`.
pub fn artifact_name(prefix: &str, sequence: u64) -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    format!("{}[{}]_{}.pdf", prefix, sequence, timestamp)
}

/// Highest sequence tag present in `dir`, or 0 when the directory is absent,
/// empty or holds no tagged names.
pub fn scan_highest(dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str().and_then(parse_sequence))
        .max()
        .unwrap_or(0)
}

type Reserved = Arc<Mutex<BTreeSet<u64>>>;

fn lock_reserved(reserved: &Mutex<BTreeSet<u64>>) -> MutexGuard<'_, BTreeSet<u64>> {
    // A panic while holding the set cannot leave it inconsistent
    reserved.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
pub struct SequenceAllocator {
    output_dir: PathBuf,
    reserved: Reserved,
}

impl SequenceAllocator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            reserved: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// The number the next `reserve` call would hand out. No side effects.
    pub fn next_sequence(&self) -> u64 {
        let reserved = lock_reserved(&self.reserved);
        self.next_locked(&reserved)
    }

    /// Reserves the next number. It stays reserved until the lease is
    /// dropped, by which point the artifact carrying it is expected on disk.
    pub fn reserve(&self) -> SequenceLease {
        let mut reserved = lock_reserved(&self.reserved);
        let value = self.next_locked(&reserved);
        reserved.insert(value);
        tracing::debug!("Reserved sequence number {}", value);

        SequenceLease {
            value,
            reserved: self.reserved.clone(),
        }
    }

    fn next_locked(&self, reserved: &BTreeSet<u64>) -> u64 {
        let on_disk = scan_highest(&self.output_dir);
        let in_flight = reserved.last().copied().unwrap_or(0);
        on_disk.max(in_flight) + 1
    }
}

/// A reserved sequence number, released on drop.
#[derive(Debug)]
pub struct SequenceLease {
    value: u64,
    reserved: Reserved,
}

impl SequenceLease {
    pub fn value(&self) -> u64 {
        self.value
    }
}

impl Drop for SequenceLease {
    fn drop(&mut self) {
        lock_reserved(&self.reserved).remove(&self.value);
    }
}
