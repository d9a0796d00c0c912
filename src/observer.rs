use std::{
    borrow::Borrow,
    collections::HashMap,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use comma_v::{Delta, DeltaText, Num, Sym};
use cvs2dvcs_state::{file_revision, file_revision::ID as FileRevisionID, Manager};
use git_fast_import::Mark;
use patchset::{Detector, PatchSet};
use thiserror::Error;

use crate::encoding::Decoder;
use tokio::{
    sync::{
        mpsc::{self, error::SendError, UnboundedSender},
        oneshot,
    },
    task::{self, JoinHandle},
};

/// An `Observer` receives a stream of file revisions and hands them to both the
/// patchset detector and the state manager.
#[derive(Clone, Debug)]
pub(crate) struct Observer {
    file_revision_tx: UnboundedSender<Message>,
    state: Manager,
    decoder: Decoder,
}

/// A message sent to the observer worker.
///
/// This is public because it's exposed within the error type, but otherwise is
/// an implementation detail.
#[derive(Debug)]
pub(crate) struct Message {
    file_revision: FileRevision,
    id_tx: oneshot::Sender<FileRevisionID>,
}

/// A file revision sent to an observer worker.
///
/// This is public because it's exposed within the error type, but otherwise is
/// an implementation detail.
#[derive(Debug)]
pub(crate) struct FileRevision {
    path: PathBuf,
    revision: String,
    mark: Option<Mark>,
    branches: Vec<Vec<u8>>,
    author: String,
    message: String,
    time: SystemTime,
    time_raw: SystemTime,
}

impl Observer {
    /// Constructs a new file revision observer, along with a collector that can
    /// be awaited once all observers have been dropped to receive the final
    /// result of the observations.
    pub(crate) fn new(delta: Duration, state: Manager, decoder: Decoder) -> (Self, Collector) {
        let (file_revision_tx, mut file_revision_rx) = mpsc::unbounded_channel::<Message>();

        let task_state = state.clone();
        let join_handle = task::spawn(async move {
            let mut detectors = HashMap::new();

            while let Some(msg) = file_revision_rx.recv().await {
                let id = task_state
                    .add_file_revision(
                        file_revision::Key {
                            path: msg.file_revision.path.clone(),
                            revision: msg.file_revision.revision.as_bytes().to_vec(),
                        },
                        msg.file_revision.mark.map(file_revision::Mark::from),
                        msg.file_revision.branches.iter(),
                        &msg.file_revision.author,
                        &msg.file_revision.message,
                        &msg.file_revision.time,
                        &msg.file_revision.time_raw,
                    )
                    .await?;

                for branch in msg.file_revision.branches.iter() {
                    let detector = detectors
                        .entry(branch.clone())
                        .or_insert_with(|| Detector::new(delta));

                    detector.add_file_commit(
                        msg.file_revision.path.clone().into_os_string(),
                        Some(id),
                        std::iter::empty::<Vec<u8>>(),
                        msg.file_revision.author.clone(),
                        msg.file_revision.message.clone(),
                        msg.file_revision.time,
                    );
                }

                msg.id_tx
                    .send(id)
                    .expect("cannot return file ID back to caller")
            }

            Ok::<HashMap<Vec<u8>, Detector<FileRevisionID>>, Error>(detectors)
        });

        (
            Self {
                file_revision_tx,
                state,
                decoder,
            },
            Collector { join_handle },
        )
    }

    /// Observe a single file revision, and return its ID as stored in the state
    /// manager.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn file_revision<I>(
        &self,
        path: &Path,
        revision: &Num,
        branches: I,
        mark: Option<Mark>,
        delta: &Delta,
        text: &DeltaText,
        time: SystemTime,
        time_raw: SystemTime,
    ) -> Result<FileRevisionID, Error>
    where
        I: Iterator,
        I::Item: Borrow<Sym>,
    {
        let (tx, rx) = oneshot::channel();

        self.file_revision_tx.send(Message {
            file_revision: FileRevision {
                path: path.to_path_buf(),
                revision: revision.to_string(),
                mark,
                branches: branches.map(|branch| branch.borrow().to_vec()).collect(),
                author: self.decoder.decode(&delta.author),
                message: self.decoder.decode(&text.log),
                time,
                time_raw,
            },
            id_tx: tx,
        })?;

        Ok(rx.await?)
    }

    /// Observe a single file revision tag.
    pub(crate) async fn tag(&self, tag: &Sym, file_revision_id: FileRevisionID) {
        self.state.add_tag(tag, file_revision_id).await;
        self.state.vote_symbol_tag(tag).await;
    }
}

type BranchDetectorHashMap = HashMap<Vec<u8>, Detector<FileRevisionID>>;

/// The `Collector` is used to wait for all file revisions to be observed, and
/// then can be used to access the observation result.
#[derive(Debug)]
pub(crate) struct Collector {
    join_handle: JoinHandle<Result<BranchDetectorHashMap, Error>>,
}

/// An object that can be joined to wait for the results of the [`Observer`].
impl Collector {
    /// Waits for the observations to be complete, the results their results.
    pub(crate) async fn join(self) -> Result<ObservationResult, Error> {
        Ok(ObservationResult {
            branches: self
                .join_handle
                .await??
                .into_iter()
                .map(|(branch, detector)| (branch, detector.into_patchset_iter().collect()))
                .collect(),
        })
    }
}

/// The result of observing file revisions and tags with [`Observer`].
pub(crate) struct ObservationResult {
    branches: HashMap<Vec<u8>, Vec<PatchSet<FileRevisionID>>>,
}

impl ObservationResult {
    pub(crate) fn into_branches(self) -> HashMap<Vec<u8>, Vec<PatchSet<FileRevisionID>>> {
        self.branches
    }
}

/// Errors that can be returned when observing.
#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error(transparent)]
    Join(#[from] task::JoinError),

    #[error(transparent)]
    OneshotRecv(#[from] oneshot::error::RecvError),

    #[error(transparent)]
    Send(#[from] SendError<Message>),

    #[error(transparent)]
    State(#[from] cvs2dvcs_state::Error),
}
