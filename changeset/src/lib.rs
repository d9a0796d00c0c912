//! Changeset aggregation and sequencing.
//!
//! Turns the stream of individual file revisions a CVS repository stores
//! into the atomic, ordered changesets a modern DVCS expects: groups of file
//! revisions committed together become `Revision` changesets, and each
//! branch or tag symbol becomes a `Symbol` changeset that roots it on its
//! parent line of development.

pub mod aggregate;
mod error;
pub mod graph;

pub use error::Error;

use std::collections::HashMap;

use cvs2dvcs_state::{file_revision, Manager};
use patchset::PatchSet;

/// Runs the full changeset pipeline against a populated [`Manager`]:
/// aggregates the patchsets detected per branch into `Revision` changesets,
/// synthesizes `Symbol` changesets for every classified branch and tag, and
/// computes the final acyclic commit order.
pub async fn run(
    state: &Manager,
    trunk: &[u8],
    branches: HashMap<Vec<u8>, Vec<PatchSet<file_revision::ID>>>,
) -> Result<(), Error> {
    let branch_changesets = aggregate::revisions(state, branches).await;
    aggregate::symbols_and_tags(state, &branch_changesets, trunk).await;

    let nodes = state.changesets().await;
    let order = graph::order(state, nodes).await?;
    state.set_changeset_order(order).await;

    Ok(())
}
