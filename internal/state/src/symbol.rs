//! Symbol statistics and classification.
//!
//! Every RCS symbolic name is observed once per file revision it's attached
//! to, voting either for "branch" (odd-length, magic-branch revision number)
//! or "tag" (even-length revision number) shape. [`Store`] accumulates those
//! votes across the whole repository so the strategy pass (see
//! `src/symbol/strategy.rs` in the binary crate) can resolve the symbol's
//! final [`Kind`] once every file has been observed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::SymbolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Kind {
    Branch,
    Tag,
    Excluded,
    Unclassified,
}

impl Kind {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Kind::Branch => "branch",
            Kind::Tag => "tag",
            Kind::Excluded => "excluded",
            Kind::Unclassified => "unclassified",
        }
    }

    pub(crate) fn from_str(s: &str) -> Option<Self> {
        match s {
            "branch" => Some(Kind::Branch),
            "tag" => Some(Kind::Tag),
            "excluded" => Some(Kind::Excluded),
            "unclassified" => Some(Kind::Unclassified),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Votes {
    pub branch: u64,
    pub tag: u64,
}

impl Votes {
    pub fn is_conflicted(&self) -> bool {
        self.branch > 0 && self.tag > 0
    }

    pub fn majority(&self) -> Option<Kind> {
        match self.branch.cmp(&self.tag) {
            std::cmp::Ordering::Greater => Some(Kind::Branch),
            std::cmp::Ordering::Less => Some(Kind::Tag),
            std::cmp::Ordering::Equal if self.branch > 0 => None,
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// A candidate line of development a branch symbol was observed sprouting
/// from, represented the same way a changeset's `lod` field is: `None` is
/// trunk, `Some(name)` is the branch it forked from. Tallied per-file in
/// `Store::vote_parent` so the strategy pass (parent selection) can pick
/// the most common parent, independent of how many *revisions* happen to
/// live on each candidate.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ParentVotes {
    counts: HashMap<Option<Vec<u8>>, u64>,
}

impl ParentVotes {
    fn vote(&mut self, parent: Option<Vec<u8>>) {
        *self.counts.entry(parent).or_insert(0) += 1;
    }

    /// Picks the most commonly observed parent. Ties break trunk-first, then
    /// lexicographically on the branch name, so the choice is deterministic
    /// across runs regardless of hash-map iteration order.
    fn resolve(&self) -> Option<Vec<u8>> {
        self.counts
            .iter()
            .max_by(|(a_name, a_count), (b_name, b_count)| {
                a_count
                    .cmp(b_count)
                    .then_with(|| match (a_name, b_name) {
                        (None, None) => std::cmp::Ordering::Equal,
                        (None, Some(_)) => std::cmp::Ordering::Greater,
                        (Some(_), None) => std::cmp::Ordering::Less,
                        (Some(a), Some(b)) => b.cmp(a),
                    })
            })
            .and_then(|(name, _)| name.clone())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Symbol {
    pub name: Vec<u8>,
    pub votes: Votes,
    pub kind: Kind,
    pub preferred_parent: Option<Vec<u8>>,
    parent_votes: ParentVotes,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub(crate) struct Store {
    symbols: Vec<Symbol>,
    by_name: HashMap<Vec<u8>, SymbolId>,
}

impl Store {
    fn get_or_create(&mut self, name: &[u8]) -> SymbolId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }

        let id = SymbolId(self.symbols.len());
        self.symbols.push(Symbol {
            name: name.to_vec(),
            votes: Votes::default(),
            kind: Kind::Unclassified,
            preferred_parent: None,
            parent_votes: ParentVotes::default(),
        });
        self.by_name.insert(name.to_vec(), id);

        id
    }

    pub(crate) fn vote_branch(&mut self, name: &[u8]) {
        let id = self.get_or_create(name);
        self.symbols[id.0].votes.branch += 1;
    }

    pub(crate) fn vote_tag(&mut self, name: &[u8]) {
        let id = self.get_or_create(name);
        self.symbols[id.0].votes.tag += 1;
    }

    /// Records one file's observed sprouting point for a branch symbol:
    /// `parent` is `None` for trunk, or the name of the branch the symbol
    /// was rooted on in that file.
    pub(crate) fn vote_parent(&mut self, name: &[u8], parent: Option<&[u8]>) {
        let id = self.get_or_create(name);
        self.symbols[id.0]
            .parent_votes
            .vote(parent.map(|p| p.to_vec()));
    }

    pub(crate) fn force(&mut self, name: &[u8], kind: Kind) {
        let id = self.get_or_create(name);
        self.symbols[id.0].kind = kind;
    }

    /// Resolves every symbol that hasn't been forced by CLI flags: picks a
    /// `Kind` (unanimous evidence, else majority
    /// with a warning, or strict failure), then a `preferred_parent` per
    /// rule 4 for anything classified as a branch. Returns the names of any
    /// symbols whose branch/tag usage was ambiguous (equal votes).
    pub(crate) fn classify_unforced(&mut self, strict: bool) -> Vec<Vec<u8>> {
        let mut ambiguous = Vec::new();

        for symbol in self.symbols.iter_mut() {
            if symbol.kind == Kind::Unclassified {
                match symbol.votes.majority() {
                    Some(kind) => symbol.kind = kind,
                    None => {
                        if strict {
                            ambiguous.push(symbol.name.clone());
                            continue;
                        } else {
                            symbol.kind = Kind::Branch;
                            ambiguous.push(symbol.name.clone());
                        }
                    }
                }
            }

            if symbol.kind == Kind::Branch {
                symbol.preferred_parent = symbol.parent_votes.resolve();
            }
        }

        ambiguous
    }

    /// Re-inserts an already-classified symbol, loaded back from a
    /// persisted snapshot. Parent votes aren't carried: by the time a
    /// symbol's classification is persisted, the strategy pass that
    /// consumes them has already run to completion.
    pub(crate) fn restore(&mut self, name: Vec<u8>, votes: Votes, kind: Kind, preferred_parent: Option<Vec<u8>>) -> SymbolId {
        let id = SymbolId(self.symbols.len());
        self.symbols.push(Symbol {
            name: name.clone(),
            votes,
            kind,
            preferred_parent,
            parent_votes: ParentVotes::default(),
        });
        self.by_name.insert(name, id);

        id
    }

    pub(crate) fn get_by_name(&self, name: &[u8]) -> Option<&Symbol> {
        self.by_name.get(name).map(|id| &self.symbols[id.0])
    }

    pub(crate) fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.0)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, symbol)| (SymbolId(i), symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_votes_majority() {
        let mut votes = Votes::default();
        assert_eq!(votes.majority(), None);

        votes.branch = 3;
        assert_eq!(votes.majority(), Some(Kind::Branch));

        votes.tag = 5;
        assert_eq!(votes.majority(), Some(Kind::Tag));

        votes.tag = 3;
        assert_eq!(votes.majority(), None);
        assert!(votes.is_conflicted());
    }

    #[test]
    fn test_classify_unforced_strict_reports_ambiguous() {
        let mut store = Store::default();
        store.vote_branch(b"REL-1");
        store.vote_tag(b"REL-1");

        let ambiguous = store.classify_unforced(true);
        assert_eq!(ambiguous, vec![b"REL-1".to_vec()]);
    }

    #[test]
    fn test_force_overrides_votes() {
        let mut store = Store::default();
        store.vote_tag(b"REL-1");
        store.force(b"REL-1", Kind::Branch);

        assert_eq!(store.get_by_name(b"REL-1").unwrap().kind, Kind::Branch);
    }

    #[test]
    fn test_classify_picks_majority_parent() {
        let mut store = Store::default();
        store.vote_branch(b"stable");
        store.vote_parent(b"stable", None);
        store.vote_parent(b"stable", None);
        store.vote_parent(b"stable", Some(b"devel"));

        store.classify_unforced(false);

        assert_eq!(store.get_by_name(b"stable").unwrap().preferred_parent, None);
    }

    #[test]
    fn test_classify_parent_tie_breaks_trunk_first() {
        let mut store = Store::default();
        store.vote_branch(b"stable");
        store.vote_parent(b"stable", None);
        store.vote_parent(b"stable", Some(b"devel"));

        store.classify_unforced(false);

        assert_eq!(store.get_by_name(b"stable").unwrap().preferred_parent, None);
    }

    #[test]
    fn test_classify_parent_tie_breaks_lexicographically() {
        let mut store = Store::default();
        store.vote_branch(b"stable");
        store.vote_parent(b"stable", Some(b"zeta"));
        store.vote_parent(b"stable", Some(b"alpha"));

        store.classify_unforced(false);

        assert_eq!(
            store.get_by_name(b"stable").unwrap().preferred_parent,
            Some(b"alpha".to_vec())
        );
    }
}
