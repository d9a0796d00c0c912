//! Clock-skew resynchronization for RCS revision timestamps.
//!
//! CVS occasionally records a child revision with an earlier timestamp than
//! its parent (commonly a checked-out clock being off by a few seconds at
//! commit time). Changeset aggregation and the graph pass both depend on
//! ancestry-respecting timestamps, so every revision's raw `delta.date` is
//! resynchronized against its parent's resynced time before it's handed to
//! the observer. The nudge epsilon is fixed at one second.

use std::time::{Duration, SystemTime};

const EPSILON: Duration = Duration::from_secs(1);

/// Returns the resynchronized timestamp for a revision given its raw
/// timestamp and its parent's already-resynced timestamp (`None` for a
/// line of development's root revision, which is never adjusted).
pub(crate) fn resync(parent_resynced: Option<SystemTime>, raw: SystemTime) -> SystemTime {
    match parent_resynced {
        Some(parent) => {
            let floor = parent + EPSILON;
            if raw < floor {
                floor
            } else {
                raw
            }
        }
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resync_leaves_increasing_timestamps_alone() {
        let parent = SystemTime::UNIX_EPOCH;
        let raw = parent + Duration::from_secs(100);
        assert_eq!(resync(Some(parent), raw), raw);
    }

    #[test]
    fn test_resync_nudges_skewed_child_forward() {
        let parent = SystemTime::UNIX_EPOCH + Duration::from_secs(1000);
        let raw = SystemTime::UNIX_EPOCH + Duration::from_secs(999);
        assert_eq!(resync(Some(parent), raw), parent + EPSILON);
    }

    #[test]
    fn test_resync_root_revision_is_unchanged() {
        let raw = SystemTime::UNIX_EPOCH + Duration::from_secs(42);
        assert_eq!(resync(None, raw), raw);
    }
}
