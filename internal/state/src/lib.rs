//! In-memory state management for `cvs2dvcs`.
//!
//! `cvs2dvcs-store` acts as the persistence layer underneath this crate:
//! `Manager` holds the authoritative, mutable working state for a run, and
//! can be flushed to and reloaded from a `cvs2dvcs_store::Store` at pass
//! boundaries so a run can be resumed after an interruption.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    io::Read as _,
    os::unix::ffi::{OsStrExt, OsStringExt},
    path::Path,
    sync::Arc,
    time::SystemTime,
};

use git_fast_import::Mark;
use tokio::sync::RwLock;

mod artifact;
pub mod cache;
pub mod changeset;
mod error;
pub mod file_revision;
pub mod ids;
pub mod metadata;
pub mod patchset;
pub mod run_state;
pub mod symbol;
pub mod tag;
mod v1;

pub use self::error::Error;
pub use ids::{ChangesetId, MetadataId, SymbolId};

#[derive(Debug, Clone, Default)]
pub struct Manager {
    file_revisions: Arc<RwLock<file_revision::Store>>,
    patchsets: Arc<RwLock<patchset::Store>>,
    tags: Arc<RwLock<tag::Store>>,
    raw_marks: Arc<RwLock<Vec<u8>>>,
    symbols: Arc<RwLock<symbol::Store>>,
    metadata: Arc<RwLock<metadata::Store>>,
    changesets: Arc<RwLock<changeset::Store>>,
    run_state: Arc<RwLock<run_state::RunState>>,
    artifacts: Arc<RwLock<artifact::Store>>,
    materialized_text_cache: Arc<RwLock<cache::MaterializedTextCache>>,
}

impl Manager {
    /// Builds a fresh manager whose materialized-text cache is bounded to
    /// `cache_capacity_bytes` instead of [`cache::DEFAULT_CAPACITY_BYTES`].
    pub fn new_with_cache_capacity(cache_capacity_bytes: usize) -> Self {
        Self {
            materialized_text_cache: Arc::new(RwLock::new(cache::MaterializedTextCache::new(
                cache_capacity_bytes,
            ))),
            ..Self::new()
        }
    }

    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a previously persisted `bincode` snapshot (the legacy v1
    /// on-disk format) from an arbitrary reader.
    pub async fn deserialize_from<R>(reader: R) -> Result<Self, Error>
    where
        R: std::io::Read,
    {
        v1::deserialize_from(reader).await
    }

    /// Rehydrates the full working state from a `cvs2dvcs-store` database,
    /// used when resuming an interrupted run.
    ///
    /// SQL rows are keyed by their own autoincrement IDs, which don't
    /// generally match the newtype IDs the in-memory stores assign, so this
    /// builds `sql id -> state id` maps as each entity type is reloaded and
    /// uses them to translate foreign keys (symbol names, metadata, and
    /// changeset predecessor edges) on the way back in.
    pub async fn load_from_store(path: &Path) -> Result<Self, Error> {
        let store = cvs2dvcs_store::Store::new(path)?;
        let mut conn = store.connection()?;
        let manager = Self::new();

        let mut file_revision_ids: HashMap<cvs2dvcs_store::ID, file_revision::ID> = HashMap::new();
        {
            let mut file_revisions = manager.file_revisions.write().await;
            conn.get_file_revisions(|commit| -> Result<(), Error> {
                let sql_id = commit.id;
                let key = file_revision::Key {
                    path: std::path::PathBuf::from(std::ffi::OsString::from_vec(commit.path)),
                    revision: commit.revision,
                };

                let id = file_revisions.add(
                    key,
                    commit.mark.map(|mark| file_revision::Mark::from(Mark::from(mark))),
                    commit.branches.into_iter(),
                    &String::from_utf8_lossy(&commit.author),
                    &String::from_utf8_lossy(&commit.message),
                    &commit.time,
                    &commit.time_raw,
                )?;
                file_revision_ids.insert(sql_id, id);
                Ok(())
            })
            .map_err(|e| Error::Load(e.to_string()))?;
        }

        if let Some(mut raw_marks) = conn.get_raw_marks()? {
            let mut buf = Vec::new();
            raw_marks.read_to_end(&mut buf)?;
            *manager.raw_marks.write().await = buf;
        }

        let mut symbol_names: HashMap<cvs2dvcs_store::ID, Vec<u8>> = HashMap::new();
        {
            let mut symbols = manager.symbols.write().await;
            conn.get_symbols(|symbol| -> Result<(), Error> {
                let sql_id = symbol.id;
                let kind = symbol::Kind::from_str(&symbol.kind)
                    .ok_or_else(|| Error::Load(format!("unknown symbol kind {:?}", symbol.kind)))?;

                symbol_names.insert(sql_id, symbol.name.clone());
                symbols.restore(
                    symbol.name,
                    symbol::Votes {
                        branch: symbol.branch_votes as u64,
                        tag: symbol.tag_votes as u64,
                    },
                    kind,
                    symbol.preferred_parent_lod,
                );
                Ok(())
            })
            .map_err(|e| Error::Load(e.to_string()))?;
        }

        let mut metadata_ids: HashMap<cvs2dvcs_store::ID, MetadataId> = HashMap::new();
        {
            let mut metadata = manager.metadata.write().await;
            conn.get_metadata_entries(|entry| -> Result<(), Error> {
                let sql_id = entry.id;
                let id = metadata.intern(
                    &String::from_utf8_lossy(&entry.author),
                    &String::from_utf8_lossy(&entry.message),
                );
                metadata_ids.insert(sql_id, id);
                Ok(())
            })
            .map_err(|e| Error::Load(e.to_string()))?;
        }

        {
            let mut tags = manager.tags.write().await;
            conn.get_tags(|tag_name, ids| -> Result<(), Error> {
                for sql_id in ids {
                    if let Some(file_revision_id) = file_revision_ids.get(&sql_id) {
                        tags.add(&tag_name, *file_revision_id);
                    }
                }
                Ok(())
            })
            .map_err(|e| Error::Load(e.to_string()))?;
        }

        {
            let mut patchsets = manager.patchsets.write().await;
            conn.get_patchsets(|ps| -> Result<(), Error> {
                let mark = patchset::Mark::from(Mark::from(ps.mark));
                let file_revision_iter = ps
                    .file_revisions
                    .iter()
                    .filter_map(|sql_id| file_revision_ids.get(sql_id).copied());

                patchsets.add(mark, &ps.branch, &ps.time, file_revision_iter);
                Ok(())
            })
            .map_err(|e| Error::Load(e.to_string()))?;
        }

        let mut raw_changesets: Vec<cvs2dvcs_store::Changeset> = Vec::new();
        conn.get_changesets(|c| -> Result<(), Error> {
            raw_changesets.push(c);
            Ok(())
        })
        .map_err(|e| Error::Load(e.to_string()))?;

        {
            let mut changesets = manager.changesets.write().await;
            let mut changeset_ids: HashMap<cvs2dvcs_store::ID, ChangesetId> = HashMap::new();

            for c in &raw_changesets {
                let kind = if c.kind == "revision" {
                    changeset::Kind::Revision
                } else if let Some(symbol_kind) = c.kind.strip_prefix("symbol_") {
                    let kind = symbol::Kind::from_str(symbol_kind)
                        .ok_or_else(|| Error::Load(format!("unknown changeset kind {:?}", c.kind)))?;
                    let sql_symbol_id = c
                        .symbol_id
                        .ok_or_else(|| Error::Load("symbol changeset missing symbol_id".to_string()))?;
                    let name = symbol_names
                        .get(&sql_symbol_id)
                        .cloned()
                        .ok_or_else(|| Error::Load(format!("unknown symbol id {}", sql_symbol_id)))?;
                    changeset::Kind::Symbol { name, kind }
                } else {
                    return Err(Error::Load(format!("unknown changeset kind {:?}", c.kind)));
                };

                let metadata = c.metadata_id.and_then(|sql_id| metadata_ids.get(&sql_id).copied());
                let file_revisions: BTreeSet<file_revision::ID> = c
                    .file_revisions
                    .iter()
                    .filter_map(|sql_id| file_revision_ids.get(sql_id).copied())
                    .collect();

                let id = changesets.add(changeset::Changeset {
                    kind,
                    lod: c.lod.clone(),
                    file_revisions,
                    time: c.time,
                    predecessors: Vec::new(),
                    metadata,
                    file_predecessors: BTreeMap::new(),
                });
                changeset_ids.insert(c.id, id);
            }

            // Predecessor edges are filled in as a second pass: a split
            // changeset's predecessor list can reference a changeset created
            // later in insertion order, so every changeset must exist before
            // any edge is wired up.
            for c in &raw_changesets {
                let id = *changeset_ids.get(&c.id).expect("every row was just inserted above");

                for sql_predecessor_id in &c.predecessors {
                    if let Some(predecessor_id) = changeset_ids.get(sql_predecessor_id) {
                        changesets.add_predecessor(id, *predecessor_id);
                    }
                }

                for (sql_file_revision_id, sql_predecessor_id) in &c.file_predecessors {
                    if let (Some(file_revision_id), Some(predecessor_id)) = (
                        file_revision_ids.get(sql_file_revision_id),
                        changeset_ids.get(sql_predecessor_id),
                    ) {
                        changesets.add_file_predecessor(id, *file_revision_id, *predecessor_id);
                    }
                }
            }

            let ordered_ids = conn.get_ordered_changeset_ids()?;
            if !ordered_ids.is_empty() {
                let order: Vec<ChangesetId> = ordered_ids
                    .iter()
                    .filter_map(|sql_id| changeset_ids.get(sql_id).copied())
                    .collect();
                changesets.set_order(order);
            }
        }

        if let Some(stored_run_state) = conn.get_run_state()? {
            *manager.run_state.write().await = run_state::RunState {
                last_completed_pass: stored_run_state.last_completed_pass,
                schema_version: stored_run_state.schema_version as u32,
            };
        }

        Ok(manager)
    }

    /// Flushes the full working state to a `cvs2dvcs-store` database, so a
    /// run can later be resumed with [`Manager::load_from_store`].
    ///
    /// The database is cleared first: re-persisting to the same file
    /// replaces its contents rather than appending to them, which keeps the
    /// SQL autoincrement IDs assigned below in step with the in-memory
    /// stores' own ID sequences.
    pub async fn persist_to_store(&self, path: &Path) -> Result<(), Error> {
        let store = cvs2dvcs_store::Store::new(path)?;
        let mut conn = store.connection()?;

        conn.clear_all()?;

        log::trace!("persisting file revisions");
        let file_revisions = self.file_revisions.read().await;
        let mut file_revision_sql_ids: BTreeMap<file_revision::ID, cvs2dvcs_store::ID> = BTreeMap::new();
        for id in 0..file_revisions.len() {
            let state_id = file_revision::ID::from(id);
            let revision = file_revisions
                .get_by_id(state_id)
                .expect("id within bounds returned by len()");

            let sql_id = conn.insert_file_revision_commit(
                revision.key.path.as_os_str().as_bytes(),
                &revision.key.revision,
                revision.mark.map(|mark| {
                    let mark: Mark = mark.into();
                    mark.as_usize()
                }),
                &revision.author,
                &revision.message,
                &revision.time,
                &revision.time_raw,
                revision.branches.iter().map(|branch| branch.as_slice()),
            )?;
            file_revision_sql_ids.insert(state_id, sql_id);
        }
        drop(file_revisions);
        log::trace!("done persisting file revisions");

        log::trace!("persisting symbols");
        let symbols = self.symbols.read().await;
        let mut symbol_sql_ids: HashMap<Vec<u8>, cvs2dvcs_store::ID> = HashMap::new();
        for (_, symbol) in symbols.iter() {
            let sql_id = conn.insert_symbol(
                &symbol.name,
                symbol.kind.as_str(),
                symbol.votes.branch as i64,
                symbol.votes.tag as i64,
                symbol.votes.is_conflicted(),
                symbol.preferred_parent.as_deref(),
            )?;
            symbol_sql_ids.insert(symbol.name.clone(), sql_id);
        }
        drop(symbols);

        log::trace!("persisting metadata");
        let metadata = self.metadata.read().await;
        let mut metadata_sql_ids: HashMap<MetadataId, cvs2dvcs_store::ID> = HashMap::new();
        for (id, entry) in metadata.iter() {
            let sql_id = conn.insert_metadata(&entry.author, &entry.message)?;
            metadata_sql_ids.insert(id, sql_id);
        }
        drop(metadata);

        log::trace!("persisting tags");
        let tags = self.tags.read().await;
        for (tag, ids) in tags.iter() {
            let sql_ids = ids.iter().filter_map(|id| file_revision_sql_ids.get(id).copied());
            conn.insert_tag(tag, sql_ids)?;
        }
        drop(tags);

        log::trace!("persisting patchsets");
        let patchsets = self.patchsets.read().await;
        let mut branches_by_mark: BTreeMap<patchset::Mark, Vec<Vec<u8>>> = BTreeMap::new();
        for (branch, mark) in patchsets.iter_by_branch() {
            branches_by_mark.entry(mark).or_default().push(branch.to_vec());
        }
        for (mark, ps) in patchsets.iter() {
            // The schema only records one branch per patchset row; extra
            // aliases registered via `add_branch_to_patchset` aren't
            // round-tripped, since nothing downstream of a reload consults
            // them beyond the branch a patchset was originally created on.
            let branch = branches_by_mark
                .get(&mark)
                .and_then(|branches| branches.first())
                .cloned()
                .unwrap_or_default();
            let mark_usize = {
                let mark: Mark = mark.into();
                mark.as_usize()
            };
            let file_revision_ids = ps
                .file_revisions
                .iter()
                .filter_map(|id| file_revision_sql_ids.get(id).copied());

            conn.insert_patchset(mark_usize, &branch, &ps.time, file_revision_ids)?;
        }
        drop(patchsets);

        log::trace!("persisting changesets");
        let changesets = self.changesets.read().await;
        let mut changeset_sql_ids: HashMap<ChangesetId, cvs2dvcs_store::ID> = HashMap::new();
        for (id, changeset) in changesets.iter() {
            let (kind, symbol_sql_id) = match &changeset.kind {
                changeset::Kind::Revision => ("revision".to_string(), None),
                changeset::Kind::Symbol { name, kind } => {
                    (format!("symbol_{}", kind.as_str()), symbol_sql_ids.get(name).copied())
                }
            };
            let metadata_sql_id = changeset.metadata.and_then(|id| metadata_sql_ids.get(&id).copied());
            let file_revision_ids = changeset
                .file_revisions
                .iter()
                .filter_map(|id| file_revision_sql_ids.get(id).copied());

            let sql_id = conn.insert_changeset(
                &kind,
                &changeset.lod,
                symbol_sql_id,
                metadata_sql_id,
                &changeset.time,
                file_revision_ids,
            )?;
            changeset_sql_ids.insert(id, sql_id);
        }

        // Predecessor edges are written in a second pass for the same
        // reason they're read back in one: a split changeset's predecessor
        // can have a higher ID than the changeset referencing it.
        for (id, changeset) in changesets.iter() {
            let sql_id = *changeset_sql_ids.get(&id).expect("just inserted above");

            if !changeset.predecessors.is_empty() {
                let predecessor_sql_ids = changeset
                    .predecessors
                    .iter()
                    .filter_map(|id| changeset_sql_ids.get(id).copied());
                conn.insert_changeset_predecessors(sql_id, predecessor_sql_ids)?;
            }

            if !changeset.file_predecessors.is_empty() {
                let file_predecessor_sql_ids =
                    changeset.file_predecessors.iter().filter_map(|(file_id, predecessor_id)| {
                        let file_id = file_revision_sql_ids.get(file_id).copied()?;
                        let predecessor_id = changeset_sql_ids.get(predecessor_id).copied()?;
                        Some((file_id, predecessor_id))
                    });
                conn.insert_changeset_file_predecessors(sql_id, file_predecessor_sql_ids)?;
            }
        }

        for (index, id) in changesets.order().iter().enumerate() {
            if let Some(sql_id) = changeset_sql_ids.get(id) {
                conn.set_ordered_changeset(*sql_id, index as i64)?;
            }
        }
        drop(changesets);
        log::trace!("done persisting changesets");

        let run_state = self.run_state.read().await;
        conn.set_run_state(&cvs2dvcs_store::types::RunState {
            last_completed_pass: run_state.last_completed_pass.clone(),
            schema_version: run_state.schema_version as i64,
        })?;

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn add_file_revision<I>(
        &self,
        key: file_revision::Key,
        mark: Option<file_revision::Mark>,
        branches: I,
        author: &str,
        message: &str,
        time: &SystemTime,
        time_raw: &SystemTime,
    ) -> Result<file_revision::ID, Error>
    where
        I: Iterator,
        I::Item: AsRef<[u8]>,
    {
        self.file_revisions
            .write()
            .await
            .add(key, mark, branches, author, message, time, time_raw)
    }

    pub async fn get_file_revision_by_id(
        &self,
        id: file_revision::ID,
    ) -> Option<Arc<file_revision::FileRevision>> {
        self.file_revisions.read().await.get_by_id(id)
    }

    pub async fn get_file_revision_by_key(
        &self,
        path: &Path,
        revision: &[u8],
    ) -> Option<Arc<file_revision::FileRevision>> {
        self.file_revisions.read().await.get_by_key(path, revision)
    }

    pub async fn add_patchset<I>(
        &self,
        mark: patchset::Mark,
        branch: &[u8],
        time: &SystemTime,
        file_revision_iter: I,
    ) where
        I: Iterator<Item = file_revision::ID>,
    {
        self.patchsets
            .write()
            .await
            .add(mark, branch, time, file_revision_iter)
    }

    pub async fn get_patchset_by_mark(&self, mark: &patchset::Mark) -> Option<Arc<patchset::PatchSet>> {
        self.patchsets.read().await.get_by_mark(mark)
    }

    pub async fn get_last_mark_on_branch(&self, branch: &[u8]) -> Option<patchset::Mark> {
        self.patchsets.read().await.get_last_mark_on_branch(branch)
    }

    pub async fn add_tag(&self, tag: &[u8], file_revision_id: file_revision::ID) {
        self.tags.write().await.add(tag, file_revision_id)
    }

    pub async fn get_tag(&self, tag: &[u8]) -> Option<Vec<file_revision::ID>> {
        self.tags
            .read()
            .await
            .get_file_revisions(tag)
            .map(|ids| ids.clone())
    }

    pub async fn intern_metadata(&self, author: &str, message: &str) -> MetadataId {
        self.metadata.write().await.intern(author, message)
    }

    pub async fn get_metadata(&self, id: MetadataId) -> Option<metadata::Metadata> {
        self.metadata.read().await.get(id).cloned()
    }

    pub async fn vote_symbol_branch(&self, name: &[u8]) {
        self.symbols.write().await.vote_branch(name)
    }

    pub async fn vote_symbol_tag(&self, name: &[u8]) {
        self.symbols.write().await.vote_tag(name)
    }

    pub async fn force_symbol(&self, name: &[u8], kind: symbol::Kind) {
        self.symbols.write().await.force(name, kind)
    }

    pub async fn vote_symbol_parent(&self, name: &[u8], parent: Option<&[u8]>) {
        self.symbols.write().await.vote_parent(name, parent)
    }

    /// Resolves every symbol that hasn't been forced by CLI flags, returning
    /// the names of any that were ambiguous (equal branch/tag votes).
    pub async fn classify_symbols(&self, strict: bool) -> Vec<Vec<u8>> {
        self.symbols.write().await.classify_unforced(strict)
    }

    pub async fn get_symbol_kind(&self, name: &[u8]) -> Option<symbol::Kind> {
        self.symbols.read().await.get_by_name(name).map(|s| s.kind)
    }

    /// Returns every classified symbol (post [`Manager::classify_symbols`]),
    /// along with the preferred parent line of development for those
    /// classified as branches.
    pub async fn symbols(&self) -> Vec<symbol::Symbol> {
        self.symbols
            .read()
            .await
            .iter()
            .map(|(_, symbol)| symbol.clone())
            .collect()
    }

    /// Returns every tag name observed, along with the file revisions
    /// attached to it.
    pub async fn tags(&self) -> Vec<(Vec<u8>, Vec<file_revision::ID>)> {
        self.tags
            .read()
            .await
            .iter()
            .map(|(name, ids)| (name.to_vec(), ids.clone()))
            .collect()
    }

    pub async fn add_changeset(&self, changeset: changeset::Changeset) -> ChangesetId {
        self.changesets.write().await.add(changeset)
    }

    pub async fn get_changeset(&self, id: ChangesetId) -> Option<changeset::Changeset> {
        self.changesets.read().await.get(id).cloned()
    }

    /// Roots a line of development's first revision changeset on the symbol
    /// changeset that forked it, once that symbol changeset exists.
    pub async fn add_changeset_predecessor(&self, id: ChangesetId, predecessor: ChangesetId) {
        self.changesets.write().await.add_predecessor(id, predecessor)
    }

    /// Splits a changeset at a file boundary so its two halves can be
    /// ordered independently; see [`changeset::Store::split`].
    pub async fn split_changeset(
        &self,
        id: ChangesetId,
        blocked_files: std::collections::BTreeSet<file_revision::ID>,
    ) -> ChangesetId {
        self.changesets.write().await.split(id, blocked_files)
    }

    /// Returns every changeset created so far, in creation (not commit)
    /// order, for the graph pass to sequence.
    pub async fn changesets(&self) -> Vec<(ChangesetId, changeset::Changeset)> {
        self.changesets
            .read()
            .await
            .iter()
            .map(|(id, changeset)| (id, changeset.clone()))
            .collect()
    }

    pub async fn changeset_count(&self) -> usize {
        self.changesets.read().await.len()
    }

    pub async fn set_changeset_order(&self, order: Vec<ChangesetId>) {
        self.changesets.write().await.set_order(order)
    }

    pub async fn get_changeset_order(&self) -> Vec<ChangesetId> {
        self.changesets.read().await.order().to_vec()
    }

    pub async fn get_raw_marks(&self) -> Vec<u8> {
        self.raw_marks.read().await.clone()
    }

    pub async fn set_raw_marks(&self, marks: Vec<u8>) {
        *self.raw_marks.write().await = marks;
    }

    pub async fn last_completed_pass(&self) -> Option<String> {
        self.run_state.read().await.last_completed_pass.clone()
    }

    pub async fn set_last_completed_pass(&self, pass: &str) {
        self.run_state.write().await.last_completed_pass = Some(pass.to_string());
    }

    /// Looks up a previously materialized revision's full text, if it's
    /// still in cache.
    pub async fn cache_get_materialized(&self, key: &file_revision::Key) -> Option<Vec<u8>> {
        self.materialized_text_cache.write().await.get(key)
    }

    /// Records a revision's materialized full text, evicting the least
    /// recently used entries if the cache's configured byte ceiling would
    /// otherwise be exceeded.
    pub async fn cache_put_materialized(&self, key: file_revision::Key, text: Vec<u8>) {
        self.materialized_text_cache.write().await.put(key, text)
    }

    /// Declares that `pass` (1-indexed) wrote the named artifact, for later
    /// `require_artifact` checks by passes that read it.
    pub async fn declare_artifact(&self, name: &str, pass: usize) {
        self.artifacts.write().await.declare(name, pass)
    }

    /// Fails unless some pass at or before `current_pass` has already
    /// declared `name` as written. Used by the pass manager to refuse to
    /// run a pass whose inputs were skipped by `--start`.
    pub async fn require_artifact(&self, name: &str, current_pass: usize) -> Result<(), Error> {
        match self.artifacts.read().await.written_by(name) {
            Some(written_pass) if written_pass <= current_pass => Ok(()),
            _ => Err(Error::ArtifactNotDeclared(name.to_string())),
        }
    }
}
