//! Pass manager: registers the conversion's passes in order, persists
//! progress after each one, and honors `--start`/`--end`.
//!
//! A pass declares the named artifacts it reads and writes. Before running,
//! the manager checks every declared read against [`Manager::require_artifact`]
//! — which fails if no earlier-or-equal pass (this run or a resumed one)
//! ever declared that artifact written — so `--start` skipping a pass whose
//! output a later pass needs is a startup error, not a silent corruption.
//! A pass skipped by `--start` still has its writes declared (the loaded
//! state is trusted to already hold them); `--end` simply stops the loop
//! before a pass numbered past it ever runs.

use async_trait::async_trait;
use cvs2dvcs_state::Manager;
use thiserror::Error;

#[async_trait(?Send)]
pub(crate) trait Pass {
    /// Used in logging and as the artifact-registry pass name; should be
    /// short and stable across runs (it's part of `RunState`).
    fn name(&self) -> &'static str;

    /// Named artifacts this pass requires some earlier pass to have
    /// written. Checked before `run` is called.
    fn reads(&self) -> &'static [&'static str] {
        &[]
    }

    /// Named artifacts this pass produces, declared once `run` returns
    /// successfully (or immediately, if the pass was skipped by `--start`).
    fn writes(&self) -> &'static [&'static str] {
        &[]
    }

    async fn run(&mut self) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("pass {0} ({1}) failed: {2}")]
    Failed(usize, &'static str, anyhow::Error),

    #[error("cannot start at pass {start}: {source}")]
    MissingArtifact {
        start: usize,
        #[source]
        source: cvs2dvcs_state::Error,
    },

    /// A resumable failure per spec.md section 6 (exit code 3): the
    /// current pass's partial artifacts are left intact for a later
    /// `--start=<next pass>`.
    #[error("interrupted by signal during pass {0} ({1}); partial artifacts kept, rerun with --start={2} to resume")]
    Interrupted(usize, &'static str, usize),
}

pub(crate) struct PassManager<'a> {
    state: &'a Manager,
    passes: Vec<Box<dyn Pass + 'a>>,
}

impl<'a> PassManager<'a> {
    pub(crate) fn new(state: &'a Manager) -> Self {
        Self {
            state,
            passes: Vec::new(),
        }
    }

    pub(crate) fn register(&mut self, pass: impl Pass + 'a) {
        self.passes.push(Box::new(pass));
    }

    /// Runs every registered pass numbered in `start..=end` (1-indexed,
    /// both ends inclusive, defaulting to the full range), in registration
    /// order. A pass before `start` is skipped, but its declared writes are
    /// still registered with the artifact registry, trusting that the
    /// loaded `Manager` state already holds them.
    pub(crate) async fn execute(mut self, start: Option<usize>, end: Option<usize>) -> Result<(), Error> {
        let start = start.unwrap_or(1);
        let end = end.unwrap_or(self.passes.len());

        for (index, pass) in self.passes.iter_mut().enumerate() {
            let number = index + 1;

            if number > end {
                log::info!("stopping before pass {} ({}): --end={}", number, pass.name(), end);
                break;
            }

            if number < start {
                log::info!("skipping pass {} ({}): before --start={}", number, pass.name(), start);
                for artifact in pass.writes() {
                    self.state.declare_artifact(artifact, number).await;
                }
                continue;
            }

            for artifact in pass.reads() {
                self.state
                    .require_artifact(artifact, number)
                    .await
                    .map_err(|source| Error::MissingArtifact { start: number, source })?;
            }

            log::info!("running pass {} ({})", number, pass.name());

            tokio::select! {
                result = pass.run() => {
                    result.map_err(|source| Error::Failed(number, pass.name(), source))?;
                }
                _ = tokio::signal::ctrl_c() => {
                    return Err(Error::Interrupted(number, pass.name(), number));
                }
            }

            for artifact in pass.writes() {
                self.state.declare_artifact(artifact, number).await;
            }
            self.state.set_last_completed_pass(pass.name()).await;
        }

        Ok(())
    }
}
