use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct Mark(pub(super) usize);

impl Mark {
    /// Returns the raw mark number, without the leading `:` used on the wire.
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl From<usize> for Mark {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl Display for Mark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, ":{}", self.0)
    }
}
