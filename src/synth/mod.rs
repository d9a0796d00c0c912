//! Commit synthesizer: walks the final, acyclic changeset order and emits
//! the commands that materialize it against the chosen output backend.
//!
//! A `Revision` changeset becomes a commit on its line of development, with
//! one file command per file revision it carries. A `Branch` symbol
//! changeset creates its ref by resetting it to the mark its chosen parent
//! line of development had reached at the fork point; a `Tag` symbol
//! changeset fakes a commit holding exactly the tagged file revisions (CVS
//! tags don't correspond to a single real commit) and then tags it.
//!
//! Every file command is computed by diffing the changeset against a
//! [`RepositoryMirror`] tracking the current directory-tree state of every
//! line of development, rather than assumed from the changeset alone: this
//! is what lets the synthesizer tell an `add_file` from a `change_file`,
//! and catch a changeset whose operations are inconsistent with the mirror
//! (deleting a path never added, writing to an already-cut tag) as the
//! fatal logic-bug signal it is.
//!
//! Every revision commit is also recorded as a patchset in the state
//! manager, so a restarted run can pick up mid-LOD instead of re-emitting
//! commits git has already seen.

mod mirror;

use std::collections::HashMap;

use cvs2dvcs_state::{
    changeset::{Changeset, Kind},
    symbol, ChangesetId, Manager,
};
use cvs2dvcs_process::Output;
use git_fast_import::{CommitBuilder, FileCommand, Identity, Mark, Mode};
use thiserror::Error;

use mirror::{MirrorError, Op, RepositoryMirror};

/// Identity used for the synthetic commits that represent tag creation:
/// these have no real CVS author, since a CVS tag isn't a commit.
const TAG_COMMITTER: &str = "cvs2dvcs";

pub(crate) struct Synthesizer<'a> {
    state: &'a Manager,
    output: &'a Output,
    head_branch: &'a str,
    prune_empty_dirs: bool,
}

impl<'a> Synthesizer<'a> {
    pub(crate) fn new(state: &'a Manager, output: &'a Output, head_branch: &'a str, prune_empty_dirs: bool) -> Self {
        Self {
            state,
            output,
            head_branch,
            prune_empty_dirs,
        }
    }

    /// Emits the whole ordered changeset sequence. Returns the number of
    /// commits and tags written, for the final run summary.
    pub(crate) async fn run(&self) -> Result<Summary, Error> {
        let order = self.state.get_changeset_order().await;
        let mut summary = Summary::default();
        let mut mirror = RepositoryMirror::new(self.prune_empty_dirs);

        // The mark a ref (branch or tag) currently points at, keyed by LOD
        // name. Pre-seeded from any patchsets a previous, interrupted run
        // already wrote, so resuming a run doesn't re-emit history.
        let mut lod_heads: HashMap<Vec<u8>, Mark> = HashMap::new();
        for lod in self.known_lods(&order).await {
            if let Some(mark) = self.state.get_last_mark_on_branch(&lod).await {
                lod_heads.insert(lod, mark.into());
            }
        }

        let mut changeset_marks: HashMap<ChangesetId, Mark> = HashMap::new();

        for id in order {
            let changeset = match self.state.get_changeset(id).await {
                Some(changeset) => changeset,
                None => continue,
            };

            match &changeset.kind {
                Kind::Revision => {
                    let from = lod_heads.get(&changeset.lod).copied();
                    let mark = self.emit_revision(&changeset, from, &mut mirror).await?;

                    lod_heads.insert(changeset.lod.clone(), mark);
                    changeset_marks.insert(id, mark);

                    self.state
                        .add_patchset(
                            mark.into(),
                            &changeset.lod,
                            &changeset.time,
                            changeset.file_revisions.iter().copied(),
                        )
                        .await;

                    summary.commits += 1;
                }
                Kind::Symbol {
                    name,
                    kind: symbol::Kind::Branch,
                } => {
                    // `changeset.lod` holds the *parent* LOD for a branch
                    // changeset (see changeset::aggregate::symbols_and_tags),
                    // not the branch being created.
                    let from = changeset
                        .predecessors
                        .first()
                        .and_then(|pred| changeset_marks.get(pred).copied())
                        .or_else(|| lod_heads.get(&changeset.lod).copied());

                    match from {
                        Some(mark) => {
                            if mirror.contains_lod(&changeset.lod) {
                                match mirror.copy_lod(&changeset.lod, name) {
                                    Ok(_) => {}
                                    Err(err) => return Err(Error::Mirror(err)),
                                }
                            }

                            self.output
                                .reset(&branch_ref(name), Some(mark))
                                .await
                                .map_err(Error::Output)?;
                            lod_heads.insert(name.clone(), mark);
                            changeset_marks.insert(id, mark);
                            summary.branches += 1;
                        }
                        None => {
                            log::warn!(
                                "branch {:?} has no parent commit to fork from yet; its ref will be created by its first commit",
                                String::from_utf8_lossy(name)
                            );
                        }
                    }
                }
                Kind::Symbol {
                    name,
                    kind: symbol::Kind::Tag,
                } => {
                    if let Some(mark) = self.emit_tag(name, &changeset, &mut mirror).await? {
                        changeset_marks.insert(id, mark);
                        summary.tags += 1;
                    }
                }
                Kind::Symbol {
                    kind: symbol::Kind::Excluded | symbol::Kind::Unclassified,
                    name,
                } => {
                    // The item filter drops excluded symbols' changesets
                    // before they reach here; an unclassified one reaching
                    // this point means classification never ran. Either way,
                    // there's nothing safe to emit.
                    log::warn!(
                        "skipping unresolved symbol changeset for {:?}",
                        String::from_utf8_lossy(name)
                    );
                }
            }
        }

        if mirror.dirs_pruned() > 0 {
            log::info!("pruned {} empty director(ies) left behind by file deletions", mirror.dirs_pruned());
        }

        Ok(summary)
    }

    /// Collects every LOD name a changeset in `order` could touch, so their
    /// previous head marks (if any) can be preloaded before replay starts.
    async fn known_lods(&self, order: &[ChangesetId]) -> Vec<Vec<u8>> {
        let mut lods: Vec<Vec<u8>> = vec![self.head_branch.as_bytes().to_vec()];

        for id in order {
            if let Some(changeset) = self.state.get_changeset(*id).await {
                if !lods.contains(&changeset.lod) {
                    lods.push(changeset.lod.clone());
                }
                if let Kind::Symbol { name, .. } = &changeset.kind {
                    if !lods.contains(name) {
                        lods.push(name.clone());
                    }
                }
            }
        }

        lods
    }

    async fn emit_revision(&self, changeset: &Changeset, from: Option<Mark>, mirror: &mut RepositoryMirror) -> Result<Mark, Error> {
        let (author, message) = match changeset.metadata {
            Some(id) => {
                let metadata = self
                    .state
                    .get_metadata(id)
                    .await
                    .ok_or(Error::MissingMetadata(id))?;
                (metadata.author, metadata.message)
            }
            None => (String::new(), String::new()),
        };

        let mut builder = CommitBuilder::new(branch_ref(&changeset.lod));
        builder
            .committer(Identity::new(None, author, changeset.time)?)
            .message(message);
        if let Some(from) = from {
            builder.from(from);
        }

        for file_revision_id in &changeset.file_revisions {
            let file_revision = self
                .state
                .get_file_revision_by_id(*file_revision_id)
                .await
                .ok_or(Error::MissingFileRevision(*file_revision_id))?;
            let path = file_revision.key.path.clone();

            let ops = mirror
                .apply_file(&changeset.lod, &path, file_revision.mark.map(|_| *file_revision_id))
                .map_err(Error::Mirror)?;

            for op in ops {
                if let Some(command) = op_to_file_command(op, file_revision.mark) {
                    builder.add_file_command(command);
                }
            }
        }

        self.output
            .commit(builder.build().map_err(|e| Error::Build(e.to_string()))?)
            .await
            .map_err(Error::Output)
    }

    /// Emits a synthetic commit holding exactly the tagged file revisions
    /// and tags it. Per-tag commits never share history with the LODs they
    /// were cut from: CVS tags are a point-in-time snapshot across files
    /// that may not correspond to any single real commit, so `DeleteAll`
    /// plus an explicit `Modify` per tagged file is the only way to
    /// guarantee the tag's tree matches exactly.
    async fn emit_tag(&self, name: &[u8], changeset: &Changeset, mirror: &mut RepositoryMirror) -> Result<Option<Mark>, Error> {
        if changeset.file_revisions.is_empty() {
            log::warn!(
                "tag {:?} has no surviving file revisions; skipping",
                String::from_utf8_lossy(name)
            );
            return Ok(None);
        }

        let tag_name = String::from_utf8_lossy(name).into_owned();
        let mut builder = CommitBuilder::new(format!("refs/tags/{}-root", tag_name));
        builder
            .committer(Identity::new(None, TAG_COMMITTER.to_string(), changeset.time)?)
            .message(format!("Tagging {}\n", tag_name));
        builder.add_file_command(FileCommand::DeleteAll);

        for file_revision_id in &changeset.file_revisions {
            let file_revision = self
                .state
                .get_file_revision_by_id(*file_revision_id)
                .await
                .ok_or(Error::MissingFileRevision(*file_revision_id))?;

            if let Some(mark) = file_revision.mark {
                builder.add_file_command(FileCommand::Modify {
                    mode: Mode::Normal,
                    mark: mark.into(),
                    path: file_revision.key.path.to_string_lossy().into_owned(),
                });

                mirror
                    .apply_file(name, &file_revision.key.path, Some(*file_revision_id))
                    .map_err(Error::Mirror)?;
            }
        }

        let mark = self.output
            .commit(builder.build().map_err(|e| Error::Build(e.to_string()))?)
            .await
            .map_err(Error::Output)?;
        self.output
            .lightweight_tag(&tag_name, mark)
            .await
            .map_err(Error::Output)?;

        // A tag's mirror slot is write-once: every tagged file is recorded
        // above, then the tag is closed so any later operation against it
        // (which would mean some other changeset wrongly believes this
        // name is still a live LOD) is caught as a mirror violation.
        mirror.close_tag(name);

        Ok(Some(mark))
    }
}

fn op_to_file_command(op: Op, mark: Option<cvs2dvcs_state::file_revision::Mark>) -> Option<FileCommand> {
    match op {
        Op::AddFile { path, .. } | Op::ChangeFile { path, .. } => mark.map(|mark| FileCommand::Modify {
            mode: Mode::Normal,
            mark: mark.into(),
            path: path.to_string_lossy().into_owned(),
        }),
        Op::DeleteFile(path) => Some(FileCommand::Delete {
            path: path.to_string_lossy().into_owned(),
        }),
        // Directory pruning and whole-LOD copies have no direct
        // git-fast-import equivalent: git has no empty directories to
        // prune, and branch/tag refs are reset wholesale instead of
        // copied path-by-path.
        Op::Mkdir(_) | Op::CopyPath { .. } | Op::ChangeProperty { .. } => None,
    }
}

fn branch_ref(lod: &[u8]) -> String {
    format!("refs/heads/{}", String::from_utf8_lossy(lod))
}

#[derive(Debug, Default)]
pub(crate) struct Summary {
    pub(crate) commits: usize,
    pub(crate) branches: usize,
    pub(crate) tags: usize,
}

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("cannot build commit: {0}")]
    Build(String),

    #[error("changeset references file revision {0} which was never observed")]
    MissingFileRevision(cvs2dvcs_state::file_revision::ID),

    #[error("changeset references metadata {0} which was never interned")]
    MissingMetadata(cvs2dvcs_state::MetadataId),

    #[error(transparent)]
    Output(#[from] cvs2dvcs_process::Error),

    #[error(transparent)]
    Time(#[from] std::time::SystemTimeError),

    #[error(transparent)]
    Mirror(#[from] MirrorError),
}
