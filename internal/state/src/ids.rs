//! Newtype identifiers for the entity stores below. Each is a thin wrapper
//! around a `usize` index into the owning store's backing `Vec`, so lookups
//! are always `O(1)` and the types can't be mixed up at a call site.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Debug,
            Display,
            Deserialize,
            Serialize,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            From,
            Into,
        )]
        pub struct $name(pub usize);
    };
}

id_type!(SymbolId);
id_type!(MetadataId);
id_type!(ChangesetId);
