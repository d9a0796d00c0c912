//! Low level types mapping to the database tables.

use std::time::SystemTime;

pub type ID = i64;

#[derive(Debug, Clone)]
pub struct FileRevisionCommit {
    pub id: ID,
    pub path: Vec<u8>,
    pub revision: Vec<u8>,
    pub mark: Option<usize>,
    pub author: Vec<u8>,
    pub message: Vec<u8>,
    pub time: SystemTime,
    pub time_raw: SystemTime,
    pub branches: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct FileRevisionCommitBranch {
    pub file_revision_commit_id: ID,
    pub branch: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Tag {
    pub id: ID,
    pub tag: Vec<u8>,
    pub file_revision_commit_id: ID,
}

#[derive(Debug, Clone)]
pub struct PatchSet {
    pub id: ID,
    pub mark: usize,
    pub branch: Vec<u8>,
    pub time: SystemTime,
}

#[derive(Debug, Clone)]
pub struct FileRevisionCommitPatchSet {
    pub file_revision_commit_id: ID,
    pub patchset_id: ID,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: ID,
    pub name: Vec<u8>,
    pub kind: String,
    pub branch_votes: i64,
    pub tag_votes: i64,
    pub conflicted: bool,
    pub preferred_parent_lod: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct Changeset {
    pub id: ID,
    pub kind: String,
    pub lod: Vec<u8>,
    pub symbol_id: Option<ID>,
    pub metadata_id: Option<ID>,
    pub time: SystemTime,
    pub file_revisions: Vec<ID>,
    pub predecessors: Vec<ID>,
    /// `(file_revision_commit_id, predecessor_changeset_id)` pairs: for each
    /// file revision this changeset carries, whichever earlier changeset on
    /// any line of development last touched the same path.
    pub file_predecessors: Vec<(ID, ID)>,
}

#[derive(Debug, Clone)]
pub struct Metadata {
    pub id: ID,
    pub author: Vec<u8>,
    pub message: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RunState {
    pub last_completed_pass: Option<String>,
    pub schema_version: i64,
}
