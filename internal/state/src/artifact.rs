//! Tracks which pass produced which named artifact, so the pass manager can
//! refuse to run a pass whose declared `reads` were never written by an
//! earlier pass (e.g. because `--start` skipped the pass that writes it).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
pub(crate) struct Store {
    /// Artifact name -> index (1-indexed) of the pass that wrote it.
    written_by: HashMap<String, usize>,
}

impl Store {
    pub(crate) fn declare(&mut self, name: &str, pass: usize) {
        self.written_by.insert(name.to_string(), pass);
    }

    pub(crate) fn written_by(&self, name: &str) -> Option<usize> {
        self.written_by.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_and_lookup() {
        let mut store = Store::default();
        assert_eq!(store.written_by("file_revisions"), None);

        store.declare("file_revisions", 1);
        assert_eq!(store.written_by("file_revisions"), Some(1));

        store.declare("file_revisions", 2);
        assert_eq!(store.written_by("file_revisions"), Some(2));
    }
}
