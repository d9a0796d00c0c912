//! Conversion driver.
//!
//! Wires together the passes that turn a CVS/RCS repository into a
//! `git fast-import` stream: discovery parses every `,v` file and records
//! its revisions and symbols; the symbol strategy classifies and filters
//! branches and tags; changeset aggregation groups per-file commits into
//! atomic changesets and orders them; synthesis replays that order as
//! commits, resets and tags against the output backend. [`pass::PassManager`]
//! drives these in order, honoring `--start`/`--end` and marking an
//! interrupted pass's artifacts as incomplete rather than silently
//! corrupting them.
//!
//! Discovery is fed paths on stdin rather than walking the repository
//! itself, one per line, so the caller controls traversal order and can
//! filter paths (e.g. with `find`) before they ever reach this process.

use std::{
    cell::RefCell,
    collections::HashMap,
    ffi::OsStr,
    io::{self, BufRead, BufReader},
    os::unix::prelude::OsStrExt,
    path::{Path, PathBuf},
    rc::Rc,
    sync::Arc,
};

use async_trait::async_trait;
use cvs2dvcs_state::{file_revision, Manager};
use cvs2dvcs_process::Output;
use patchset::PatchSet;
use structopt::StructOpt;

mod backend;
mod config;
mod discovery;
mod encoding;
mod filter;
mod observer;
mod pass;
mod resync;
mod symbol;
mod synth;

use config::Config;
use discovery::Discovery;
use observer::Observer;
use pass::{Pass, PassManager};

type Branches = HashMap<Vec<u8>, Vec<PatchSet<file_revision::ID>>>;

/// Top-level CLI surface: the conversion options proper, plus whatever
/// `cvs2dvcs-process` needs to drive `git fast-import`.
#[derive(Debug, StructOpt)]
struct Cli {
    #[structopt(flatten)]
    opt: config::Opt,

    #[structopt(flatten)]
    process: cvs2dvcs_process::Opt,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::from_args();
    let _logger = flexi_logger::Logger::try_with_env_or_str("info")?.start()?;

    let config = Arc::new(Config::load(cli.opt)?);
    let output_backend = backend::resolve(config.output)?;
    let decoder = encoding::Decoder::new(&config.encoding)?;
    cvs2dvcs_process::preflight(&cli.process)?;

    let store_path = config.tmpdir.join("state.sqlite3");
    let state = match config.start {
        Some(pass) if pass > 1 => load_state(&store_path).await?,
        _ => Manager::new_with_cache_capacity(config.cache_bytes),
    };

    let mark_file = config.tmpdir.join("marks");
    let (output, worker) = cvs2dvcs_process::new(&mark_file, &cli.process);

    let branches_cell: Rc<RefCell<Option<Branches>>> = Rc::new(RefCell::new(None));
    let branch_report_cell: Rc<RefCell<Option<filter::FilterReport>>> = Rc::new(RefCell::new(None));
    let tag_report_cell: Rc<RefCell<Option<filter::FilterReport>>> = Rc::new(RefCell::new(None));
    let summary_cell: Rc<RefCell<Option<synth::Summary>>> = Rc::new(RefCell::new(None));

    let mut passes = PassManager::new(&state);
    passes.register(DiscoverPass {
        config: &config,
        state: &state,
        output: &output,
        decoder,
        branches_out: branches_cell.clone(),
    });
    passes.register(ClassifySymbolsPass {
        config: &config,
        state: &state,
    });
    passes.register(FilterPass {
        state: &state,
        branches: branches_cell.clone(),
        branch_report_out: branch_report_cell.clone(),
        tag_report_out: tag_report_cell.clone(),
    });
    passes.register(AggregateAndOrderPass {
        state: &state,
        head_branch: &config.head_branch,
        branches: branches_cell.clone(),
    });
    passes.register(SynthesizePass {
        state: &state,
        output: &output,
        head_branch: &config.head_branch,
        prune_empty_dirs: config.prune_empty_dirs,
        backend: output_backend.as_ref(),
        summary_out: summary_cell.clone(),
    });

    match passes.execute(config.start, config.end).await {
        Ok(()) => {}
        Err(pass::Error::Interrupted(number, name, resume_at)) => {
            log::warn!(
                "pass {} ({}) interrupted; rerun with --start={} to resume",
                number,
                name,
                resume_at
            );
            state.persist_to_store(&store_path).await?;
            std::process::exit(3);
        }
        Err(err) => return Err(err.into()),
    }

    drop(output);
    worker.wait().await?;

    state.persist_to_store(&store_path).await?;

    let branch_report = branch_report_cell.borrow_mut().take().unwrap_or_default();
    let tag_report = tag_report_cell.borrow_mut().take().unwrap_or_default();
    let summary = summary_cell.borrow_mut().take().unwrap_or_default();

    log::info!(
        "conversion complete: {} commit(s), {} branch(es), {} tag(s) written; {} branch(es) and {} tag(s) excluded by symbol strategy, {} revision(s) orphaned",
        summary.commits,
        summary.branches,
        summary.tags,
        branch_report.excluded_branches.len(),
        tag_report.excluded_tags.len(),
        branch_report.orphaned_revisions,
    );

    Ok(())
}

/// Reads newline-delimited paths from stdin and hands each one to
/// discovery. Filesystem traversal itself is the caller's job.
fn feed_paths(discovery: &Discovery) -> anyhow::Result<()> {
    for line in BufReader::new(io::stdin()).split(b'\n') {
        let bytes = line.map_err(|e| anyhow::anyhow!("error reading path from stdin: {}", e))?;
        let path: &Path = Path::new(OsStr::from_bytes(&bytes));
        log::trace!("sending {} to discovery", path.display());
        discovery.discover(path)?;
    }
    Ok(())
}

/// Loads a previously persisted run, falling back to a fresh one if the
/// store doesn't exist yet (e.g. `--start` given on a first run).
async fn load_state(store_path: &PathBuf) -> anyhow::Result<Manager> {
    if store_path.exists() {
        Ok(Manager::load_from_store(store_path).await?)
    } else {
        log::warn!(
            "no persisted state found at {}; starting a fresh run",
            store_path.display()
        );
        Ok(Manager::new())
    }
}

/// Pass 1 (C5, data collector): walks the paths fed on stdin, parsing every
/// `,v` file and recording its revisions, symbols and per-symbol votes.
struct DiscoverPass<'a> {
    config: &'a Config,
    state: &'a Manager,
    output: &'a Output,
    decoder: encoding::Decoder,
    branches_out: Rc<RefCell<Option<Branches>>>,
}

#[async_trait(?Send)]
impl<'a> Pass for DiscoverPass<'a> {
    fn name(&self) -> &'static str {
        "discover"
    }

    fn writes(&self) -> &'static [&'static str] {
        &["items", "symbol_votes"]
    }

    async fn run(&mut self) -> anyhow::Result<()> {
        let (observer, collector) = Observer::new(self.config.commit_threshold, self.state.clone(), self.decoder);
        let discovery = Discovery::new(self.state, self.output, &observer, self.config, self.config.jobs, &self.config.root);

        feed_paths(&discovery)?;
        drop(discovery);
        drop(observer);

        let observation = collector.join().await?;
        *self.branches_out.borrow_mut() = Some(observation.into_branches());
        Ok(())
    }
}

/// Pass 2 (C6, symbol statistics & strategy): applies CLI overrides, then
/// classifies every symbol not already forced.
struct ClassifySymbolsPass<'a> {
    config: &'a Config,
    state: &'a Manager,
}

#[async_trait(?Send)]
impl<'a> Pass for ClassifySymbolsPass<'a> {
    fn name(&self) -> &'static str {
        "classify_symbols"
    }

    fn reads(&self) -> &'static [&'static str] {
        &["symbol_votes"]
    }

    fn writes(&self) -> &'static [&'static str] {
        &["symbol_decisions"]
    }

    async fn run(&mut self) -> anyhow::Result<()> {
        symbol::apply_overrides(self.state, self.config).await;
        let ambiguous = symbol::classify(self.state, self.config.strict).await;
        if self.config.strict && !ambiguous.is_empty() {
            anyhow::bail!(
                "{} symbol(s) have ambiguous branch/tag usage across files and --strict was given",
                ambiguous.len()
            );
        }
        Ok(())
    }
}

/// Pass 3 (C7, item filter): drops lines of development and tags whose
/// symbol was excluded by the strategy pass.
struct FilterPass<'a> {
    state: &'a Manager,
    branches: Rc<RefCell<Option<Branches>>>,
    branch_report_out: Rc<RefCell<Option<filter::FilterReport>>>,
    tag_report_out: Rc<RefCell<Option<filter::FilterReport>>>,
}

#[async_trait(?Send)]
impl<'a> Pass for FilterPass<'a> {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn reads(&self) -> &'static [&'static str] {
        &["items", "symbol_decisions"]
    }

    fn writes(&self) -> &'static [&'static str] {
        &["filtered_items"]
    }

    async fn run(&mut self) -> anyhow::Result<()> {
        let mut branches_ref = self.branches.borrow_mut();
        let branches = branches_ref
            .as_mut()
            .expect("discover pass's output was declared present but is missing");

        let branch_report = filter::apply_branches(self.state, branches).await;

        let mut tags = self.state.tags().await;
        let tag_report = filter::apply_tags(self.state, &mut tags).await;

        *self.branch_report_out.borrow_mut() = Some(branch_report);
        *self.tag_report_out.borrow_mut() = Some(tag_report);
        Ok(())
    }
}

/// Pass 4 (C8 + C9, changeset aggregator and graph): clusters patchsets into
/// changesets and computes the final acyclic commit order.
struct AggregateAndOrderPass<'a> {
    state: &'a Manager,
    head_branch: &'a str,
    branches: Rc<RefCell<Option<Branches>>>,
}

#[async_trait(?Send)]
impl<'a> Pass for AggregateAndOrderPass<'a> {
    fn name(&self) -> &'static str {
        "aggregate_and_order_changesets"
    }

    fn reads(&self) -> &'static [&'static str] {
        &["filtered_items"]
    }

    fn writes(&self) -> &'static [&'static str] {
        &["ordered_changesets"]
    }

    async fn run(&mut self) -> anyhow::Result<()> {
        let branches = self
            .branches
            .borrow_mut()
            .take()
            .expect("filter pass's output was declared present but is missing");
        changeset::run(self.state, self.head_branch.as_bytes(), branches).await?;
        Ok(())
    }
}

/// Pass 5 (C10, commit synthesizer): replays the ordered changesets as
/// commits, branch resets and tags against the output backend.
struct SynthesizePass<'a> {
    state: &'a Manager,
    output: &'a Output,
    head_branch: &'a str,
    prune_empty_dirs: bool,
    backend: &'a dyn backend::OutputBackend,
    summary_out: Rc<RefCell<Option<synth::Summary>>>,
}

#[async_trait(?Send)]
impl<'a> Pass for SynthesizePass<'a> {
    fn name(&self) -> &'static str {
        "synthesize"
    }

    fn reads(&self) -> &'static [&'static str] {
        &["ordered_changesets"]
    }

    fn writes(&self) -> &'static [&'static str] {
        &["commits"]
    }

    async fn run(&mut self) -> anyhow::Result<()> {
        self.backend.preflight()?;
        let synthesizer = synth::Synthesizer::new(self.state, self.output, self.head_branch, self.prune_empty_dirs);
        let summary = synthesizer.run().await?;
        *self.summary_out.borrow_mut() = Some(summary);
        Ok(())
    }
}
