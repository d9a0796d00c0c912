use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("changeset graph has an unbreakable cycle among {0} changeset(s)")]
    UnbreakableCycle(usize),
}
