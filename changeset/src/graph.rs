//! Topological ordering of the synthesized changeset graph, with automatic
//! cycle-breaking.

use std::collections::{HashMap, HashSet};

use cvs2dvcs_state::{
    changeset::{Changeset, Kind},
    ChangesetId, Manager,
};

use crate::Error;

/// Computes a final, acyclic commit order from the full set of changesets
/// and their predecessor edges.
///
/// Changesets that become ready (all predecessors already ordered) at the
/// same time are emitted in ascending ID order, so the result is
/// deterministic across runs. If the predecessor graph contains a cycle,
/// every `Revision` changeset in it is first checked for a lossless
/// `try_split`: if splitting it into two at a file boundary would let one
/// half become ready immediately, the split is applied (creating a new
/// changeset in `state` for the blocked half) and the sort resumes without
/// losing any ordering information. Only when no cycle member can be split
/// usefully does the lowest-weight edge within it get dropped instead: an
/// edge sourced from a `Symbol` changeset is considered lighter than one
/// sourced from a `Revision` changeset (a branch or tag creation is a much
/// weaker ordering constraint than an actual commit), and ties within a
/// weight class are broken in favor of dropping the edge with the smaller
/// source ID.
pub async fn order(state: &Manager, nodes: Vec<(ChangesetId, Changeset)>) -> Result<Vec<ChangesetId>, Error> {
    let total = nodes.len();
    let mut preds: HashMap<ChangesetId, Vec<ChangesetId>> = nodes
        .iter()
        .map(|(id, changeset)| (*id, changeset.predecessors.clone()))
        .collect();
    let mut file_revisions: HashMap<ChangesetId, std::collections::BTreeSet<cvs2dvcs_state::file_revision::ID>> = nodes
        .iter()
        .map(|(id, changeset)| (*id, changeset.file_revisions.clone()))
        .collect();
    let mut file_predecessors: HashMap<ChangesetId, std::collections::BTreeMap<cvs2dvcs_state::file_revision::ID, ChangesetId>> = nodes
        .iter()
        .map(|(id, changeset)| (*id, changeset.file_predecessors.clone()))
        .collect();
    let is_symbol: HashMap<ChangesetId, bool> = nodes
        .iter()
        .map(|(id, changeset)| (*id, matches!(changeset.kind, Kind::Symbol { .. })))
        .collect();
    let mut is_revision: HashMap<ChangesetId, bool> = nodes
        .iter()
        .map(|(id, changeset)| (*id, matches!(changeset.kind, Kind::Revision)))
        .collect();

    let mut remaining: HashSet<ChangesetId> = nodes.iter().map(|(id, _)| *id).collect();
    let mut order = Vec::with_capacity(total);

    loop {
        loop {
            let mut ready: Vec<ChangesetId> = remaining
                .iter()
                .copied()
                .filter(|id| preds[id].iter().all(|pred| !remaining.contains(pred)))
                .collect();

            if ready.is_empty() {
                break;
            }

            ready.sort();
            for id in ready {
                remaining.remove(&id);
                order.push(id);
            }
        }

        if remaining.is_empty() {
            break;
        }

        // Stuck: every remaining changeset has at least one unresolved
        // predecessor still in `remaining`, which means there's a cycle.
        // Try to split a revision changeset in the cycle before resorting
        // to dropping an edge outright.
        if let Some((id, blocked_files)) = find_splittable(&remaining, &preds, &file_revisions, &file_predecessors, &is_revision) {
            let new_id = state.split_changeset(id, blocked_files.clone()).await;
            log::warn!(
                "breaking changeset graph cycle: splitting changeset {:?} into {:?} (kept) and {:?} (blocked on {} file(s))",
                id,
                id,
                new_id,
                blocked_files.len(),
            );

            let free_files: std::collections::BTreeSet<_> = file_revisions[&id]
                .difference(&blocked_files)
                .copied()
                .collect();
            let blocked_file_preds: std::collections::BTreeMap<_, _> = file_predecessors[&id]
                .iter()
                .filter(|(file, _)| blocked_files.contains(file))
                .map(|(file, pred)| (*file, *pred))
                .collect();

            file_predecessors
                .get_mut(&id)
                .expect("id in remaining")
                .retain(|file, _| !blocked_files.contains(file));
            file_revisions.insert(id, free_files);
            file_revisions.insert(new_id, blocked_files);
            file_predecessors.insert(new_id, blocked_file_preds);
            preds.insert(new_id, vec![id]);
            is_revision.insert(new_id, true);

            for (succ, succ_preds) in preds.iter_mut() {
                if *succ != new_id && succ_preds.contains(&id) {
                    succ_preds.push(new_id);
                }
            }

            remaining.insert(new_id);
            continue;
        }

        let lightest = remaining
            .iter()
            .flat_map(|id| {
                preds[id]
                    .iter()
                    .filter(|pred| remaining.contains(pred))
                    .map(move |pred| {
                        let weight = u8::from(!is_symbol.get(pred).copied().unwrap_or(false));
                        (weight, *pred, *id)
                    })
            })
            .min();

        match lightest {
            Some((_, pred, succ)) => {
                log::warn!(
                    "breaking changeset graph cycle: dropping the predecessor edge {:?} -> {:?}",
                    pred,
                    succ
                );
                preds
                    .get_mut(&succ)
                    .expect("succ came from remaining")
                    .retain(|p| *p != pred);
            }
            None => return Err(Error::UnbreakableCycle(remaining.len())),
        }
    }

    Ok(order)
}

/// Looks for a `Revision` changeset in `remaining` whose file revisions can
/// be partitioned, by their tracked file predecessor, into a "free" half
/// (no per-file predecessor still stuck in `remaining`) and a "blocked"
/// half (at least one is), with the changeset's own general predecessors
/// already clear of `remaining` too. Splitting such a changeset lets its
/// free half become immediately orderable without dropping any edge.
fn find_splittable(
    remaining: &HashSet<ChangesetId>,
    preds: &HashMap<ChangesetId, Vec<ChangesetId>>,
    file_revisions: &HashMap<ChangesetId, std::collections::BTreeSet<cvs2dvcs_state::file_revision::ID>>,
    file_predecessors: &HashMap<ChangesetId, std::collections::BTreeMap<cvs2dvcs_state::file_revision::ID, ChangesetId>>,
    is_revision: &HashMap<ChangesetId, bool>,
) -> Option<(ChangesetId, std::collections::BTreeSet<cvs2dvcs_state::file_revision::ID>)> {
    let mut candidates: Vec<ChangesetId> = remaining.iter().copied().collect();
    candidates.sort();

    for id in candidates {
        if !is_revision.get(&id).copied().unwrap_or(false) {
            continue;
        }

        // A general predecessor still stuck in the cycle gates the whole
        // changeset, file-based split or not.
        if preds[&id].iter().any(|pred| remaining.contains(pred)) {
            continue;
        }

        let files = &file_revisions[&id];
        if files.len() < 2 {
            continue;
        }

        let empty = std::collections::BTreeMap::new();
        let file_preds = file_predecessors.get(&id).unwrap_or(&empty);

        let blocked_files: std::collections::BTreeSet<_> = files
            .iter()
            .filter(|file| {
                file_preds
                    .get(file)
                    .map(|pred| remaining.contains(pred))
                    .unwrap_or(false)
            })
            .copied()
            .collect();

        if blocked_files.is_empty() || blocked_files.len() == files.len() {
            continue;
        }

        return Some((id, blocked_files));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn revision(predecessors: Vec<ChangesetId>) -> Changeset {
        Changeset {
            kind: Kind::Revision,
            lod: b"main".to_vec(),
            file_revisions: Default::default(),
            time: SystemTime::UNIX_EPOCH,
            predecessors,
            metadata: None,
            file_predecessors: Default::default(),
        }
    }

    fn symbol(predecessors: Vec<ChangesetId>) -> Changeset {
        Changeset {
            kind: Kind::Symbol {
                name: b"stable".to_vec(),
                kind: cvs2dvcs_state::symbol::Kind::Branch,
            },
            lod: b"main".to_vec(),
            file_revisions: Default::default(),
            time: SystemTime::UNIX_EPOCH,
            predecessors,
            metadata: None,
            file_predecessors: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_order_linear_chain() {
        let state = Manager::new();
        let nodes = vec![
            (ChangesetId(0), revision(vec![])),
            (ChangesetId(1), revision(vec![ChangesetId(0)])),
            (ChangesetId(2), revision(vec![ChangesetId(1)])),
        ];

        assert_eq!(
            order(&state, nodes).await.unwrap(),
            vec![ChangesetId(0), ChangesetId(1), ChangesetId(2)]
        );
    }

    #[tokio::test]
    async fn test_order_breaks_cycle_preferring_symbol_edge() {
        // 0 -> 1 (revision edge), 1 -> 0 (symbol edge): the symbol edge
        // should be the one dropped, leaving 0 before 1.
        let state = Manager::new();
        let nodes = vec![
            (ChangesetId(0), revision(vec![ChangesetId(1)])),
            (ChangesetId(1), symbol(vec![ChangesetId(0)])),
        ];

        assert_eq!(
            order(&state, nodes).await.unwrap(),
            vec![ChangesetId(0), ChangesetId(1)]
        );
    }

    #[tokio::test]
    async fn test_order_splits_multi_file_changeset_to_break_cycle() {
        // Changeset 1 carries files {a, b}; changeset 2's general
        // predecessor is changeset 1, creating a 1<->2 cycle on its own.
        // But only file `b`'s file-predecessor is changeset 2: file `a`'s
        // is changeset 0, which is already free to order. try_split should
        // break the cycle by splitting changeset 1's file `a` off into a
        // new, immediately-orderable changeset instead of dropping an edge.
        let state = Manager::new();

        let file_a = cvs2dvcs_state::file_revision::ID::from(0usize);
        let file_b = cvs2dvcs_state::file_revision::ID::from(1usize);

        let id0 = state
            .add_changeset(Changeset {
                kind: Kind::Revision,
                lod: b"main".to_vec(),
                file_revisions: [file_a].into_iter().collect(),
                time: SystemTime::UNIX_EPOCH,
                predecessors: vec![],
                metadata: None,
                file_predecessors: Default::default(),
            })
            .await;
        assert_eq!(id0, ChangesetId(0));

        let id1 = state
            .add_changeset(Changeset {
                kind: Kind::Revision,
                lod: b"main".to_vec(),
                file_revisions: [file_a, file_b].into_iter().collect(),
                time: SystemTime::UNIX_EPOCH,
                predecessors: vec![],
                metadata: None,
                file_predecessors: [(file_b, ChangesetId(2))].into_iter().collect(),
            })
            .await;
        assert_eq!(id1, ChangesetId(1));

        let id2 = state
            .add_changeset(Changeset {
                kind: Kind::Revision,
                lod: b"main".to_vec(),
                file_revisions: Default::default(),
                time: SystemTime::UNIX_EPOCH,
                predecessors: vec![id1],
                metadata: None,
                file_predecessors: [(file_a, id0)].into_iter().collect(),
            })
            .await;
        assert_eq!(id2, ChangesetId(2));

        let nodes = vec![
            (id0, state.get_changeset(id0).await.unwrap()),
            (id1, state.get_changeset(id1).await.unwrap()),
            (id2, state.get_changeset(id2).await.unwrap()),
        ];

        let result = order(&state, nodes).await.unwrap();

        // id1 must have been split: its free half (file_a) sorts before
        // id2, and the new blocked half (file_b) sorts somewhere after.
        assert_eq!(result.len(), 4);
        assert_eq!(result[0], id0);
        let id1_pos = result.iter().position(|id| *id == id1).unwrap();
        let id2_pos = result.iter().position(|id| *id == id2).unwrap();
        assert!(id1_pos < id2_pos);
    }
}
