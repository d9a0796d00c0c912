//! Output backend selection.
//!
//! `spec.md` section 6 names four possible output streams (git fast-import,
//! SVN dump, Bazaar, Mercurial) but section 1 scopes the encoders
//! themselves out as "thin collaborators, not respecified." Only the git
//! fast-import backend (`git-fast-import`, `cvs2dvcs-process`) has a working
//! pipeline behind it; the others are accepted as CLI values so the surface
//! matches the spec, then rejected here before discovery ever starts.

use crate::config::Backend;

/// A target DVCS stream. Implementations validate that whatever external
/// tooling they need is available before the conversion does any real work.
pub(crate) trait OutputBackend {
    fn preflight(&self) -> anyhow::Result<()>;
}

/// The only implemented backend: commits are streamed to `git fast-import`
/// via `cvs2dvcs_process`/`git-fast-import`, whose own preflight check
/// (`cvs2dvcs_process::preflight`) already runs in `main` before this one.
struct GitBackend;

impl OutputBackend for GitBackend {
    fn preflight(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Resolves the CLI's `--output` value to a backend. Any value other than
/// `git` is rejected here, before discovery starts, rather than left to
/// fail partway through a run.
pub(crate) fn resolve(backend: Backend) -> anyhow::Result<Box<dyn OutputBackend>> {
    match backend {
        Backend::Git => Ok(Box::new(GitBackend)),
        other => anyhow::bail!(
            "output backend {:?} is not implemented; only git is supported",
            other
        ),
    }
}
