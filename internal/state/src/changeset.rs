//! Storage for the synthesized changeset sequence: the output of the
//! aggregation and graph passes, and the input to commit synthesis.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{file_revision, ids::ChangesetId, ids::MetadataId, symbol::Kind as SymbolKind};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum Kind {
    /// A set of file revisions committed close enough together in time to
    /// be treated as one atomic commit.
    Revision,

    /// The creation of a branch or tag from a consistent set of file
    /// revisions.
    Symbol { name: Vec<u8>, kind: SymbolKind },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Changeset {
    pub kind: Kind,
    pub lod: Vec<u8>,
    pub file_revisions: BTreeSet<file_revision::ID>,
    pub time: std::time::SystemTime,
    pub predecessors: Vec<ChangesetId>,

    /// The interned `(author, log message)` this changeset should be
    /// committed under. `None` for `Symbol` changesets, which borrow their
    /// message from the commit synthesizer instead of a CVS log entry.
    pub metadata: Option<MetadataId>,

    /// For each file revision this changeset carries, the changeset (if
    /// any) that most recently touched the same path on this line of
    /// development before it. This is the per-file edge the graph pass's
    /// `try_split` uses to break a changeset into an independently
    /// orderable "free" and "blocked" half when a cycle can't otherwise be
    /// resolved: a whole-changeset predecessor edge can gate files that
    /// don't actually depend on whatever's stuck in the cycle.
    #[serde(default)]
    pub file_predecessors: BTreeMap<file_revision::ID, ChangesetId>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub(crate) struct Store {
    changesets: Vec<Changeset>,
    order: Vec<ChangesetId>,
}

impl Store {
    pub(crate) fn add(&mut self, changeset: Changeset) -> ChangesetId {
        let id = ChangesetId(self.changesets.len());
        self.changesets.push(changeset);
        id
    }

    pub(crate) fn get(&self, id: ChangesetId) -> Option<&Changeset> {
        self.changesets.get(id.0)
    }

    /// Adds an extra predecessor edge to an already-created changeset, used
    /// to root a line of development's first revision changeset on the
    /// symbol changeset that forked it.
    pub(crate) fn add_predecessor(&mut self, id: ChangesetId, predecessor: ChangesetId) {
        if let Some(changeset) = self.changesets.get_mut(id.0) {
            changeset.predecessors.push(predecessor);
        }
    }

    /// Adds one per-file predecessor edge to an already-created changeset,
    /// used when rehydrating a persisted snapshot.
    pub(crate) fn add_file_predecessor(
        &mut self,
        id: ChangesetId,
        file_revision_id: file_revision::ID,
        predecessor: ChangesetId,
    ) {
        if let Some(changeset) = self.changesets.get_mut(id.0) {
            changeset.file_predecessors.insert(file_revision_id, predecessor);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.changesets.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (ChangesetId, &Changeset)> {
        self.changesets
            .iter()
            .enumerate()
            .map(|(i, changeset)| (ChangesetId(i), changeset))
    }

    /// Splits `id` into two changesets at a file boundary: `id` keeps
    /// `free_files` (and is left exactly as orderable as it was before
    /// this split), and a newly created changeset takes `blocked_files`
    /// and is chained after it via a `predecessors` edge. Any other
    /// changeset that already depended on `id` is rewired to also depend on
    /// the new changeset, since the original commit's full effect (every
    /// file it touched) is only complete once both halves have landed.
    ///
    /// Returns the new changeset's ID.
    pub(crate) fn split(
        &mut self,
        id: ChangesetId,
        blocked_files: BTreeSet<file_revision::ID>,
    ) -> ChangesetId {
        let new_id = ChangesetId(self.changesets.len());

        let blocked_file_predecessors: BTreeMap<_, _> = {
            let original = self.changesets.get(id.0).expect("split target exists");
            original
                .file_predecessors
                .iter()
                .filter(|(file, _)| blocked_files.contains(file))
                .map(|(file, pred)| (*file, *pred))
                .collect()
        };

        let blocked = {
            let original = self.changesets.get_mut(id.0).expect("split target exists");
            original.file_revisions.retain(|file| !blocked_files.contains(file));
            original
                .file_predecessors
                .retain(|file, _| !blocked_files.contains(file));

            Changeset {
                kind: original.kind.clone(),
                lod: original.lod.clone(),
                file_revisions: blocked_files,
                time: original.time,
                predecessors: vec![id],
                metadata: original.metadata,
                file_predecessors: blocked_file_predecessors,
            }
        };
        self.changesets.push(blocked);

        for (i, changeset) in self.changesets.iter_mut().enumerate() {
            if i != new_id.0 && changeset.predecessors.contains(&id) {
                changeset.predecessors.push(new_id);
            }
        }

        new_id
    }

    /// Records the final, acyclic commit order produced by the graph pass.
    pub(crate) fn set_order(&mut self, order: Vec<ChangesetId>) {
        debug_assert_eq!(order.len(), self.changesets.len());
        self.order = order;
    }

    pub(crate) fn order(&self) -> &[ChangesetId] {
        &self.order
    }
}
