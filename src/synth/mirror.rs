//! Repository mirror: a directory-tree snapshot of every line of
//! development the commit synthesizer has touched so far.
//!
//! The synthesizer never decides "add" vs "change" itself; it hands the
//! mirror a path and an optional content ref, and the mirror computes the
//! right operation by consulting its own record of what that line of
//! development currently contains. An operation that's inconsistent with
//! that record (deleting a path never added, copying from an unknown LOD,
//! touching a tag after it was cut) is a [`MirrorError`]: per spec, this is
//! always a fatal signal of an earlier logic bug, never a recoverable
//! condition.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use cvs2dvcs_state::file_revision;
use thiserror::Error;

/// One filesystem-level effect of a changeset against a line of
/// development's current mirror state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    Mkdir(PathBuf),
    AddFile { path: PathBuf, content: file_revision::ID },
    ChangeFile { path: PathBuf, content: file_revision::ID },
    DeleteFile(PathBuf),
    CopyPath { from_lod: Vec<u8>, to_lod: Vec<u8> },
    ChangeProperty { path: PathBuf, key: String, value: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum MirrorError {
    #[error("delete_file on {0:?}, which has no prior add_file in the mirror")]
    DeleteMissing(PathBuf),

    #[error("copy_path from unknown line of development {0:?}")]
    UnknownSourceLod(String),

    #[error("operation on {0:?} targets tag line of development {1:?}, which was already cut and must never be modified again")]
    TagModifiedAfterCreation(PathBuf, String),

    #[error("change_property on {0:?}, which has no prior add_file in the mirror")]
    PropertyOnMissingFile(PathBuf),
}

#[derive(Debug, Default, Clone)]
struct Tree {
    files: BTreeMap<PathBuf, file_revision::ID>,
}

impl Tree {
    /// Whether any file remains under `dir` (a path's parent) after an
    /// entry was just removed from `files`.
    /// Whether `dir` is a real subdirectory (not the tree root, which is
    /// never created or pruned explicitly) with no file left under it.
    fn dir_is_empty(&self, dir: &Path) -> bool {
        !dir.as_os_str().is_empty() && !self.files.keys().any(|path| path.starts_with(dir))
    }
}

/// Tracks the current content of every path on every line of development
/// the synthesizer has emitted operations for, so each changeset's
/// operations can be computed as a diff against that state rather than
/// asserted blindly.
#[derive(Debug, Default)]
pub(crate) struct RepositoryMirror {
    lods: BTreeMap<Vec<u8>, Tree>,
    /// Lines of development that are tag snapshots: once cut, CVS tags
    /// never receive another write, so any further operation on one is a
    /// logic bug rather than a legitimate no-op.
    tag_lods: std::collections::BTreeSet<Vec<u8>>,
    prune_empty_dirs: bool,
    dirs_pruned: usize,
}

impl RepositoryMirror {
    pub(crate) fn new(prune_empty_dirs: bool) -> Self {
        Self {
            prune_empty_dirs,
            ..Default::default()
        }
    }

    /// Computes and applies the operation for a single file's new state on
    /// `lod`: `Some(content)` becomes an `add_file` or `change_file`
    /// depending on whether the mirror already holds the path; `None`
    /// becomes a `delete_file`, pruning the containing directory if that
    /// was its last entry and pruning is enabled.
    pub(crate) fn apply_file(
        &mut self,
        lod: &[u8],
        path: &Path,
        content: Option<file_revision::ID>,
    ) -> Result<Vec<Op>, MirrorError> {
        if self.tag_lods.contains(lod) {
            return Err(MirrorError::TagModifiedAfterCreation(path.to_path_buf(), lod_name(lod)));
        }

        let tree = self.lods.entry(lod.to_vec()).or_default();

        match content {
            Some(content) => {
                // A path's directory is new exactly when no other path
                // already lived under it; backends that need an explicit
                // directory-creation node (e.g. an SVN dump) get an
                // `Mkdir` ahead of the `add_file`.
                let mut ops = Vec::with_capacity(2);
                let is_add = !tree.files.contains_key(path);
                if is_add {
                    if let Some(dir) = path.parent() {
                        if tree.dir_is_empty(dir) {
                            ops.push(Op::Mkdir(dir.to_path_buf()));
                        }
                    }
                }

                tree.files.insert(path.to_path_buf(), content);
                ops.push(if is_add {
                    Op::AddFile {
                        path: path.to_path_buf(),
                        content,
                    }
                } else {
                    Op::ChangeFile {
                        path: path.to_path_buf(),
                        content,
                    }
                });
                Ok(ops)
            }
            None => {
                if tree.files.remove(path).is_none() {
                    return Err(MirrorError::DeleteMissing(path.to_path_buf()));
                }

                let mut ops = vec![Op::DeleteFile(path.to_path_buf())];
                if self.prune_empty_dirs {
                    if let Some(dir) = path.parent() {
                        if tree.dir_is_empty(dir) {
                            self.dirs_pruned += 1;
                        }
                    }
                }
                Ok(ops)
            }
        }
    }

    /// Records a file property change. The path must already exist on the
    /// mirror (properties are never set on a path before its content is).
    pub(crate) fn change_property(
        &mut self,
        lod: &[u8],
        path: &Path,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Op, MirrorError> {
        let tree = self.lods.entry(lod.to_vec()).or_default();
        if !tree.files.contains_key(path) {
            return Err(MirrorError::PropertyOnMissingFile(path.to_path_buf()));
        }

        Ok(Op::ChangeProperty {
            path: path.to_path_buf(),
            key: key.into(),
            value: value.into(),
        })
    }

    /// Branch creation: copies `from`'s entire mirror state wholesale to
    /// the new branch `to`, matching the invariant that every branch is
    /// created via a single copy from its chosen parent LOD.
    pub(crate) fn copy_lod(&mut self, from: &[u8], to: &[u8]) -> Result<Op, MirrorError> {
        let tree = self
            .lods
            .get(from)
            .cloned()
            .ok_or_else(|| MirrorError::UnknownSourceLod(lod_name(from)))?;
        self.lods.insert(to.to_vec(), tree);

        Ok(Op::CopyPath {
            from_lod: from.to_vec(),
            to_lod: to.to_vec(),
        })
    }

    /// Marks `tag` as a closed tag snapshot: any further write to it is a
    /// mirror violation. A tag's content routinely spans several source
    /// LODs at once (CVS tags aren't cut from one coherent parent tree),
    /// so unlike a branch this isn't modeled as a copy from anywhere.
    pub(crate) fn close_tag(&mut self, tag: &[u8]) {
        self.tag_lods.insert(tag.to_vec());
    }

    pub(crate) fn contains_lod(&self, lod: &[u8]) -> bool {
        self.lods.contains_key(lod)
    }

    pub(crate) fn dirs_pruned(&self) -> usize {
        self.dirs_pruned
    }
}

fn lod_name(lod: &[u8]) -> String {
    String::from_utf8_lossy(lod).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: usize) -> file_revision::ID {
        file_revision::ID::from(n)
    }

    #[test]
    fn test_add_then_change_same_path() {
        let mut mirror = RepositoryMirror::new(false);
        let path = Path::new("foo.c");

        assert_eq!(
            mirror.apply_file(b"main", path, Some(id(1))).unwrap(),
            vec![Op::AddFile { path: path.to_path_buf(), content: id(1) }]
        );
        assert_eq!(
            mirror.apply_file(b"main", path, Some(id(2))).unwrap(),
            vec![Op::ChangeFile { path: path.to_path_buf(), content: id(2) }]
        );
    }

    #[test]
    fn test_add_to_new_directory_emits_mkdir_first() {
        let mut mirror = RepositoryMirror::new(false);
        let path = Path::new("dir/foo.c");

        assert_eq!(
            mirror.apply_file(b"main", path, Some(id(1))).unwrap(),
            vec![
                Op::Mkdir(PathBuf::from("dir")),
                Op::AddFile { path: path.to_path_buf(), content: id(1) },
            ]
        );

        // A second file in the same directory doesn't need another mkdir.
        let sibling = Path::new("dir/bar.c");
        assert_eq!(
            mirror.apply_file(b"main", sibling, Some(id(2))).unwrap(),
            vec![Op::AddFile { path: sibling.to_path_buf(), content: id(2) }]
        );
    }

    #[test]
    fn test_delete_without_prior_add_is_mirror_violation() {
        let mut mirror = RepositoryMirror::new(false);
        let err = mirror.apply_file(b"main", Path::new("foo.c"), None).unwrap_err();
        assert_eq!(err, MirrorError::DeleteMissing(PathBuf::from("foo.c")));
    }

    #[test]
    fn test_delete_prunes_empty_directory() {
        let mut mirror = RepositoryMirror::new(true);
        mirror.apply_file(b"main", Path::new("dir/foo.c"), Some(id(1))).unwrap();

        let ops = mirror.apply_file(b"main", Path::new("dir/foo.c"), None).unwrap();
        assert_eq!(ops, vec![Op::DeleteFile(PathBuf::from("dir/foo.c"))]);
        assert_eq!(mirror.dirs_pruned(), 1);
    }

    #[test]
    fn test_delete_does_not_prune_nonempty_directory() {
        let mut mirror = RepositoryMirror::new(true);
        mirror.apply_file(b"main", Path::new("dir/foo.c"), Some(id(1))).unwrap();
        mirror.apply_file(b"main", Path::new("dir/bar.c"), Some(id(2))).unwrap();

        let ops = mirror.apply_file(b"main", Path::new("dir/foo.c"), None).unwrap();
        assert_eq!(ops, vec![Op::DeleteFile(PathBuf::from("dir/foo.c"))]);
        assert_eq!(mirror.dirs_pruned(), 0);
    }

    #[test]
    fn test_copy_lod_from_unknown_source_is_mirror_violation() {
        let mut mirror = RepositoryMirror::new(false);
        assert_eq!(
            mirror.copy_lod(b"main", b"feature").unwrap_err(),
            MirrorError::UnknownSourceLod("main".to_string())
        );
    }

    #[test]
    fn test_copy_lod_then_diverge_independently() {
        let mut mirror = RepositoryMirror::new(false);
        mirror.apply_file(b"main", Path::new("foo.c"), Some(id(1))).unwrap();
        mirror.copy_lod(b"main", b"feature").unwrap();

        // feature starts with foo.c already present, so the next write is a
        // change, not an add.
        assert_eq!(
            mirror.apply_file(b"feature", Path::new("foo.c"), Some(id(2))).unwrap(),
            vec![Op::ChangeFile { path: PathBuf::from("foo.c"), content: id(2) }]
        );
        // main is untouched by feature's change.
        assert_eq!(
            mirror.apply_file(b"main", Path::new("foo.c"), Some(id(3))).unwrap(),
            vec![Op::ChangeFile { path: PathBuf::from("foo.c"), content: id(3) }]
        );
    }

    #[test]
    fn test_tag_rejects_further_writes() {
        let mut mirror = RepositoryMirror::new(false);
        mirror.apply_file(b"v1", Path::new("foo.c"), Some(id(1))).unwrap();
        mirror.close_tag(b"v1");

        let err = mirror.apply_file(b"v1", Path::new("foo.c"), Some(id(2))).unwrap_err();
        assert_eq!(
            err,
            MirrorError::TagModifiedAfterCreation(PathBuf::from("foo.c"), "v1".to_string())
        );
    }
}
