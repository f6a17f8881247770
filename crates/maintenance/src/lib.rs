//! Maintenance: compaction scheduling, the expired-file sweep, and Quick/Deep
//! integrity checks (spec §4.5), all reporting progress through an explicit
//! [`JobRegistry`] rather than process-global state.

pub mod compaction;
pub mod integrity;
pub mod jobs;
pub mod sweep;

pub use compaction::{compact_all, compact_volume, CompactionSummary};
pub use integrity::{deep_check, quick_check, DeepReport, QuickReport};
pub use jobs::{JobKind, JobRegistry, JobState, JobStatus};

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}
