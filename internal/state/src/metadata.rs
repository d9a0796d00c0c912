//! Interned (author, message) pairs shared across file revisions.
//!
//! CVS stores the commit message once per file revision, so the same
//! logical commit message is repeated once per file touched. Interning
//! collapses those duplicates to a single allocation, which is also what
//! lets the changeset aggregator key on `MetadataId` equality instead of
//! string comparison.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::MetadataId;

#[derive(Debug, Clone, Hash, PartialEq, Eq, Deserialize, Serialize)]
pub struct Metadata {
    pub author: String,
    pub message: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub(crate) struct Store {
    metadata: Vec<Metadata>,
    by_value: HashMap<Metadata, MetadataId>,
}

impl Store {
    pub(crate) fn intern(&mut self, author: &str, message: &str) -> MetadataId {
        let key = Metadata {
            author: author.to_string(),
            message: message.to_string(),
        };

        if let Some(id) = self.by_value.get(&key) {
            return *id;
        }

        let id = MetadataId(self.metadata.len());
        self.metadata.push(key.clone());
        self.by_value.insert(key, id);

        id
    }

    pub(crate) fn get(&self, id: MetadataId) -> Option<&Metadata> {
        self.metadata.get(id.0)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (MetadataId, &Metadata)> {
        self.metadata.iter().enumerate().map(|(i, metadata)| (MetadataId(i), metadata))
    }
}
