//! Item filter: applies the symbol strategy's decision map over the lines
//! of development collected during discovery, before changeset aggregation
//! groups their patchsets into commits.

use std::collections::{HashMap, HashSet};

use cvs2dvcs_state::{file_revision::ID as FileRevisionID, symbol, Manager};
use patchset::PatchSet;

/// Counts of what the filter dropped, for the section 7 warning summary.
#[derive(Debug, Default)]
pub(crate) struct FilterReport {
    pub excluded_branches: Vec<Vec<u8>>,
    pub excluded_tags: Vec<Vec<u8>>,
    pub orphaned_revisions: usize,
}

/// Drops every line of development whose symbol was classified as
/// `Excluded`, warning for any file revision that becomes unreachable (not
/// present on any remaining line of development) as a result. Lines of
/// development with no corresponding symbol record (trunk, under whatever
/// name `--head-branch` assigned it) are never excluded.
pub(crate) async fn apply_branches(
    state: &Manager,
    branches: &mut HashMap<Vec<u8>, Vec<PatchSet<FileRevisionID>>>,
) -> FilterReport {
    let mut report = FilterReport::default();

    let excluded: Vec<Vec<u8>> = {
        let mut names = Vec::new();
        for name in branches.keys() {
            if let Some(symbol::Kind::Excluded) = state.get_symbol_kind(name).await {
                names.push(name.clone());
            }
        }
        names
    };

    for name in &excluded {
        let removed = match branches.remove(name) {
            Some(patchsets) => patchsets,
            None => continue,
        };

        log::warn!(
            "excluding line of development {:?}: classified as excluded by symbol strategy",
            String::from_utf8_lossy(name)
        );
        report.excluded_branches.push(name.clone());

        let still_reachable: HashSet<FileRevisionID> = branches
            .values()
            .flatten()
            .flat_map(|patchset| patchset.file_revision_iter().flat_map(|(_, ids)| ids.iter().filter_map(|id| *id)))
            .collect();

        for patchset in &removed {
            for (path, ids) in patchset.file_revision_iter() {
                for id in ids.iter().filter_map(|id| id.as_ref()) {
                    if !still_reachable.contains(id) {
                        report.orphaned_revisions += 1;
                        log::warn!(
                            "revision {:?} of {:?} orphaned after excluding line of development {:?}",
                            id,
                            path,
                            String::from_utf8_lossy(name)
                        );
                    }
                }
            }
        }
    }

    report
}

/// Drops every tag name whose symbol was classified as anything other than
/// `Tag` (typically `Excluded`, or `Branch` if a name was used both ways and
/// the majority vote went the other way).
pub(crate) async fn apply_tags(
    state: &Manager,
    tags: &mut Vec<(Vec<u8>, Vec<FileRevisionID>)>,
) -> FilterReport {
    let mut report = FilterReport::default();

    let mut kept = Vec::with_capacity(tags.len());
    for (name, ids) in tags.drain(..) {
        match state.get_symbol_kind(&name).await {
            Some(symbol::Kind::Tag) => kept.push((name, ids)),
            _ => {
                log::warn!(
                    "excluding tag {:?}: not classified as a tag by symbol strategy",
                    String::from_utf8_lossy(&name)
                );
                report.excluded_tags.push(name);
            }
        }
    }

    *tags = kept;
    report
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, ffi::OsString, time::SystemTime};

    use cvs2dvcs_state::{symbol::Kind, Manager};
    use patchset::Detector;

    use super::*;

    async fn detect(branch: &[u8], id: u64) -> Vec<PatchSet<FileRevisionID>> {
        let mut detector: Detector<FileRevisionID> = Detector::new(std::time::Duration::from_secs(60));
        detector.add_file_commit(
            OsString::from(format!("file-{}", id)),
            Some(FileRevisionID::from(id as usize)),
            std::iter::once(branch.to_vec()),
            "author".into(),
            "message".into(),
            SystemTime::UNIX_EPOCH,
        );
        detector.into_patchset_iter().collect()
    }

    #[tokio::test]
    async fn test_apply_branches_drops_excluded() {
        let state = Manager::new();
        state.force_symbol(b"vendor", Kind::Excluded).await;

        let mut branches = HashMap::new();
        branches.insert(b"HEAD".to_vec(), detect(b"HEAD", 1).await);
        branches.insert(b"vendor".to_vec(), detect(b"vendor", 2).await);

        let report = apply_branches(&state, &mut branches).await;

        assert!(!branches.contains_key(b"vendor".as_ref()));
        assert!(branches.contains_key(b"HEAD".as_ref()));
        assert_eq!(report.excluded_branches, vec![b"vendor".to_vec()]);
        assert_eq!(report.orphaned_revisions, 1);
    }

    #[tokio::test]
    async fn test_apply_tags_keeps_only_classified_tags() {
        let state = Manager::new();
        state.force_symbol(b"v1", Kind::Tag).await;
        state.force_symbol(b"stale", Kind::Excluded).await;

        let mut tags = vec![
            (b"v1".to_vec(), vec![FileRevisionID::from(1usize)]),
            (b"stale".to_vec(), vec![FileRevisionID::from(2usize)]),
        ];

        let report = apply_tags(&state, &mut tags).await;

        assert_eq!(tags, vec![(b"v1".to_vec(), vec![FileRevisionID::from(1usize)])]);
        assert_eq!(report.excluded_tags, vec![b"stale".to_vec()]);
    }
}
