//! CLI surface and declarative configuration file support.

use std::{
    collections::HashMap,
    path::PathBuf,
    time::Duration,
};

use serde::Deserialize;
use structopt::StructOpt;

/// The backend that the synthesized commit stream is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Backend {
    Git,
    Svn,
    Bzr,
    Hg,
}

impl std::str::FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "git" => Ok(Self::Git),
            "svn" => Ok(Self::Svn),
            "bzr" => Ok(Self::Bzr),
            "hg" => Ok(Self::Hg),
            other => anyhow::bail!("unknown output backend {:?}", other),
        }
    }
}

/// A `NAME=VALUE`-style symbol override given on the command line, e.g.
/// `--rename OLD=NEW`.
fn parse_rename(src: &str) -> anyhow::Result<(String, String)> {
    let (old, new) = src
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected OLD=NEW, got {:?}", src))?;
    Ok((old.to_string(), new.to_string()))
}

#[derive(Debug, StructOpt)]
#[structopt(about = "Converts a CVS/RCS repository into a DVCS-native commit stream.")]
pub(crate) struct Opt {
    /// Path to the CVS repository root (a directory tree of ",v" files).
    pub root: PathBuf,

    /// Directory used to hold artifact store state. Defaults to $TMPDIR (or
    /// the system temp directory) if not given.
    #[structopt(long)]
    pub tmpdir: Option<PathBuf>,

    /// First pass to run (1-indexed, inclusive). Requires a pre-existing
    /// tmpdir from an earlier, interrupted run.
    #[structopt(long)]
    pub start: Option<usize>,

    /// Last pass to run (1-indexed, inclusive).
    #[structopt(long)]
    pub end: Option<usize>,

    /// Encoding used to decode author/log bytes that aren't valid UTF-8.
    #[structopt(long, default_value = "latin1")]
    pub encoding: String,

    /// Force the named symbol to be treated as a branch, regardless of its
    /// observed usage. Repeatable.
    #[structopt(long = "force-branch")]
    pub force_branch: Vec<String>,

    /// Force the named symbol to be treated as a tag, regardless of its
    /// observed usage. Repeatable.
    #[structopt(long = "force-tag")]
    pub force_tag: Vec<String>,

    /// Exclude the named symbol (and transitively, revisions reachable only
    /// through it) from the output entirely. Repeatable.
    #[structopt(long)]
    pub exclude: Vec<String>,

    /// Rename a symbol as it's encountered, given as OLD=NEW. Repeatable.
    #[structopt(long, parse(try_from_str = parse_rename))]
    pub rename: Vec<(String, String)>,

    /// Maximum gap between two commits on the same line of development
    /// before they're considered separate changesets.
    #[structopt(long, default_value = "5min", parse(try_from_str = parse_duration::parse))]
    pub commit_threshold: Duration,

    /// Fail the conversion (instead of warning) if a symbol's branch/tag
    /// usage is ambiguous across files.
    #[structopt(long)]
    pub strict: bool,

    /// Ignore files that fail to parse instead of aborting the run.
    #[structopt(long)]
    pub ignore_errors: bool,

    /// Number of worker tasks used to parse RCS files concurrently.
    #[structopt(long)]
    pub jobs: Option<usize>,

    /// Branch name to use for the RCS default/head branch (i.e. trunk).
    #[structopt(long, default_value = "main")]
    pub head_branch: String,

    /// Output backend: one of git, svn, bzr, hg. Only git is implemented.
    #[structopt(long, default_value = "git")]
    pub output: Backend,

    /// Byte ceiling for the materialized RCS revision text cache.
    #[structopt(long, default_value = "67108864")]
    pub cache_bytes: usize,

    /// Remove directories left empty by a delete_file or copy_path
    /// operation from the synthesized tree.
    #[structopt(long)]
    pub no_prune_empty_dirs: bool,

    /// Load additional configuration from a JSON file. CLI flags take
    /// precedence over anything set here.
    #[structopt(long)]
    pub options: Option<PathBuf>,
}

/// The subset of [`Opt`] that can additionally be supplied via
/// `--options=FILE`, a declarative JSON configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct FileConfig {
    pub force_branch: Vec<String>,
    pub force_tag: Vec<String>,
    pub exclude: Vec<String>,
    pub rename: HashMap<String, String>,
    pub encoding: Option<String>,
}

/// The fully resolved configuration for a run: CLI flags merged over
/// `--options=FILE`, with CLI flags taking precedence.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub root: PathBuf,
    pub tmpdir: PathBuf,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub encoding: String,
    pub force_branch: Vec<String>,
    pub force_tag: Vec<String>,
    pub exclude: Vec<String>,
    pub rename: HashMap<Vec<u8>, Vec<u8>>,
    pub commit_threshold: Duration,
    pub strict: bool,
    pub ignore_errors: bool,
    pub jobs: usize,
    pub head_branch: String,
    pub output: Backend,
    pub cache_bytes: usize,
    pub prune_empty_dirs: bool,
}

impl Config {
    /// Builds the resolved configuration for a run, merging any
    /// `--options=FILE` declarative config in under CLI-flag precedence.
    pub fn load(opt: Opt) -> anyhow::Result<Self> {
        let file_config = match &opt.options {
            Some(path) => {
                let bytes = std::fs::read(path)?;
                serde_json::from_slice(&bytes)?
            }
            None => FileConfig::default(),
        };

        let mut rename: HashMap<Vec<u8>, Vec<u8>> = file_config
            .rename
            .into_iter()
            .map(|(old, new)| (old.into_bytes(), new.into_bytes()))
            .collect();
        for (old, new) in opt.rename {
            rename.insert(old.into_bytes(), new.into_bytes());
        }

        let mut force_branch = file_config.force_branch;
        force_branch.extend(opt.force_branch);

        let mut force_tag = file_config.force_tag;
        force_tag.extend(opt.force_tag);

        let mut exclude = file_config.exclude;
        exclude.extend(opt.exclude);

        let tmpdir = match opt.tmpdir {
            Some(tmpdir) => tmpdir,
            None if opt.start.is_some() => {
                anyhow::bail!("--start requires --tmpdir pointing at an earlier, interrupted run's artifacts")
            }
            None => {
                // A fresh, uniquely-named directory under $TMPDIR rather than
                // $TMPDIR itself, so two conversions started without an
                // explicit --tmpdir don't clobber each other's artifact
                // store. Left on disk (not cleaned up on drop): the whole
                // point of persisting artifacts is that a later --start can
                // find them again.
                let dir = tempfile::Builder::new()
                    .prefix("cvs2dvcs-")
                    .tempdir()?
                    .into_path();
                log::info!("no --tmpdir given; using {}", dir.display());
                dir
            }
        };

        Ok(Self {
            root: opt.root,
            tmpdir,
            start: opt.start,
            end: opt.end,
            encoding: file_config.encoding.unwrap_or(opt.encoding),
            force_branch,
            force_tag,
            exclude,
            rename,
            commit_threshold: opt.commit_threshold,
            strict: opt.strict,
            ignore_errors: opt.ignore_errors,
            jobs: opt.jobs.unwrap_or_else(num_cpus::get),
            head_branch: opt.head_branch,
            output: opt.output,
            cache_bytes: opt.cache_bytes,
            prune_empty_dirs: !opt.no_prune_empty_dirs,
        })
    }

    /// Applies any configured `--rename` to a symbol name as it's first
    /// observed, so every later vote/classification/lookup sees the
    /// canonical name.
    pub fn canonicalize_symbol<'a>(&'a self, name: &'a [u8]) -> std::borrow::Cow<'a, [u8]> {
        match self.rename.get(name) {
            Some(renamed) => std::borrow::Cow::Borrowed(renamed.as_slice()),
            None => std::borrow::Cow::Borrowed(name),
        }
    }
}
