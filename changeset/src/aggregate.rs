//! Turns the per-branch patchsets detected during discovery into `Revision`
//! changesets, then synthesizes the `Symbol` changesets that create each
//! branch and tag.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    ffi::OsString,
    time::SystemTime,
};

use cvs2dvcs_state::{
    changeset::{Changeset, Kind},
    file_revision, symbol, ChangesetId, Manager,
};
use patchset::PatchSet;

/// Chronological record of the changesets created on each line of
/// development, used to resolve branch and tag fork points.
pub type BranchChangesets = HashMap<Vec<u8>, Vec<(ChangesetId, SystemTime)>>;

/// Aggregates the patchsets detected on each branch into `Revision`
/// changesets, chained in time order within the branch.
///
/// A single detected patchset can still squash more than one revision of
/// the same file together (two commits on the same path landing in the
/// same author/message bucket within the detector's time window). Emitting
/// one changeset per patchset in that case would silently drop every
/// squashed revision but the last, so each patchset is instead split
/// column-wise: column `n` of a patchset picks, for every file, the `n`th
/// squashed revision it has (if any), and becomes its own changeset
/// chained after column `n - 1`'s.
///
/// Branches are visited in name order (not detection order, which is an
/// arbitrary hash map iteration) so the per-file predecessor tracked below
/// is deterministic across runs. That tracking records, for every file
/// revision a changeset carries, whichever other changeset (on any line of
/// development) most recently touched the same path; the graph pass's
/// `try_split` uses it to break a changeset into an independently orderable
/// pair when a cycle can't otherwise be resolved.
pub async fn revisions(
    state: &Manager,
    branches: HashMap<Vec<u8>, Vec<PatchSet<file_revision::ID>>>,
) -> BranchChangesets {
    let mut result = BranchChangesets::new();
    let mut last_changeset_for_path: HashMap<OsString, ChangesetId> = HashMap::new();

    let mut branch_names: Vec<_> = branches.keys().cloned().collect();
    branch_names.sort();

    for branch in branch_names {
        let patchsets = &branches[&branch];
        let mut timeline = Vec::new();
        let mut predecessor = None;

        for patchset in patchsets {
            let per_file: Vec<(&OsString, &Vec<Option<file_revision::ID>>)> = patchset.file_revision_iter().collect();
            let columns = per_file.iter().map(|(_, ids)| ids.len()).max().unwrap_or(0).max(1);

            let metadata = state
                .intern_metadata(&patchset.author, &patchset.message)
                .await;

            for column in 0..columns {
                let mut file_revisions = BTreeSet::new();
                let mut file_predecessors = BTreeMap::new();

                for &(path, ids) in &per_file {
                    if let Some(Some(id)) = ids.get(column) {
                        file_revisions.insert(*id);
                        if let Some(prev) = last_changeset_for_path.get(path) {
                            file_predecessors.insert(*id, *prev);
                        }
                    }
                }

                let changeset = Changeset {
                    kind: Kind::Revision,
                    lod: branch.clone(),
                    file_revisions,
                    time: patchset.time,
                    predecessors: predecessor.into_iter().collect(),
                    metadata: Some(metadata),
                    file_predecessors,
                };

                let id = state.add_changeset(changeset).await;

                for &(path, ids) in &per_file {
                    if let Some(Some(_)) = ids.get(column) {
                        last_changeset_for_path.insert(path.clone(), id);
                    }
                }

                timeline.push((id, patchset.time));
                predecessor = Some(id);
            }
        }

        result.insert(branch, timeline);
    }

    result
}

/// Synthesizes one `Symbol` changeset per classified branch, rooted on its
/// preferred parent line of development at the point closest to (but not
/// after) the branch's first commit, and one per tag, rooted on whichever
/// changeset most recently touched one of the tagged file revisions.
pub async fn symbols_and_tags(
    state: &Manager,
    branch_changesets: &BranchChangesets,
    trunk: &[u8],
) {
    for symbol in state.symbols().await {
        if symbol.kind != symbol::Kind::Branch {
            continue;
        }

        let parent_lod = symbol.preferred_parent.clone().unwrap_or_else(|| trunk.to_vec());
        let fork_time = branch_changesets
            .get(&symbol.name)
            .and_then(|timeline| timeline.first())
            .map(|(_, time)| *time);

        let predecessor = branch_changesets.get(&parent_lod).and_then(|timeline| match fork_time {
            Some(fork_time) => timeline
                .iter()
                .rev()
                .find(|(_, time)| *time <= fork_time)
                .map(|(id, _)| *id),
            None => timeline.last().map(|(id, _)| *id),
        });

        let changeset = Changeset {
            kind: Kind::Symbol {
                name: symbol.name.clone(),
                kind: symbol.kind,
            },
            lod: parent_lod,
            file_revisions: Default::default(),
            time: fork_time.unwrap_or(SystemTime::UNIX_EPOCH),
            predecessors: predecessor.into_iter().collect(),
            metadata: None,
            file_predecessors: Default::default(),
        };

        let symbol_changeset_id = state.add_changeset(changeset).await;

        // Root the branch's own first revision changeset on the symbol
        // changeset that forked it, so the graph pass sees the branch
        // creation as happening before anything committed on it.
        if let Some((first_revision_id, _)) = branch_changesets
            .get(&symbol.name)
            .and_then(|timeline| timeline.first())
        {
            state
                .add_changeset_predecessor(*first_revision_id, symbol_changeset_id)
                .await;
        }
    }

    for (name, file_revision_ids) in state.tags().await {
        if !matches!(state.get_symbol_kind(&name).await, Some(symbol::Kind::Tag)) {
            log::warn!(
                "skipping tag {:?}: not classified as a tag by symbol strategy",
                String::from_utf8_lossy(&name)
            );
            continue;
        }

        let ids: std::collections::BTreeSet<_> = file_revision_ids.into_iter().collect();
        let mut best: Option<(ChangesetId, SystemTime)> = None;

        for timeline in branch_changesets.values() {
            for (id, time) in timeline {
                let changeset = match state.get_changeset(*id).await {
                    Some(changeset) => changeset,
                    None => continue,
                };

                if changeset.file_revisions.is_disjoint(&ids) {
                    continue;
                }

                if best.map_or(true, |(_, best_time)| *time > best_time) {
                    best = Some((*id, *time));
                }
            }
        }

        let changeset = Changeset {
            kind: Kind::Symbol {
                name: name.clone(),
                kind: symbol::Kind::Tag,
            },
            lod: name,
            file_revisions: ids,
            time: best.map(|(_, time)| time).unwrap_or(SystemTime::UNIX_EPOCH),
            predecessors: best.map(|(id, _)| id).into_iter().collect(),
            metadata: None,
            file_predecessors: Default::default(),
        };

        state.add_changeset(changeset).await;
    }
}

#[cfg(test)]
mod tests {
    use std::{ffi::OsString, time::Duration};

    use cvs2dvcs_state::file_revision::ID as FileRevisionID;
    use patchset::Detector;

    use super::*;

    #[tokio::test]
    async fn test_revisions_splits_squashed_same_file_commits() {
        let state = Manager::new();

        // Two commits on the same path, same author/message, close enough
        // together to land in one detected patchset.
        let mut detector: Detector<FileRevisionID> = Detector::new(Duration::from_secs(120));
        detector.add_file_commit(
            OsString::from("foo"),
            Some(FileRevisionID::from(1usize)),
            std::iter::empty::<Vec<u8>>(),
            "author".into(),
            "message".into(),
            SystemTime::UNIX_EPOCH,
        );
        detector.add_file_commit(
            OsString::from("foo"),
            Some(FileRevisionID::from(2usize)),
            std::iter::empty::<Vec<u8>>(),
            "author".into(),
            "message".into(),
            SystemTime::UNIX_EPOCH + Duration::from_secs(10),
        );

        let mut branches = HashMap::new();
        branches.insert(b"HEAD".to_vec(), detector.into_patchset_iter().collect());

        let branch_changesets = revisions(&state, branches).await;

        let timeline = branch_changesets.get(b"HEAD".as_ref()).unwrap();
        assert_eq!(timeline.len(), 2, "one changeset per squashed revision, not one for the whole patchset");

        let first = state.get_changeset(timeline[0].0).await.unwrap();
        let second = state.get_changeset(timeline[1].0).await.unwrap();

        assert_eq!(first.file_revisions, BTreeSet::from([FileRevisionID::from(1usize)]));
        assert_eq!(second.file_revisions, BTreeSet::from([FileRevisionID::from(2usize)]));
        assert_eq!(second.predecessors, vec![timeline[0].0]);
        assert_eq!(
            second.file_predecessors.get(&FileRevisionID::from(2usize)),
            Some(&timeline[0].0)
        );
    }
}
