//! Discovery metadata for the datasets this crate provides.

use std::path::PathBuf;

use crate::dataset::{Corpus, IntentSlotDataset, Segment};
use crate::errors::{DataError, Result};

/// A named dataset together with the segments it can be opened with.
#[derive(Debug, Clone, Copy)]
pub struct RegistryEntry {
    pub name: &'static str,
    pub corpus: Corpus,
    pub segments: &'static [Segment],
}

impl RegistryEntry {
    pub fn supports(&self, segment: Segment) -> bool {
        self.segments.contains(&segment)
    }

    /// Opens `segment` after checking it is declared for this entry.
    pub fn open(&self, segment: Segment, root: Option<PathBuf>) -> Result<IntentSlotDataset> {
        if !self.supports(segment) {
            return Err(DataError::InvalidSegment(segment.to_string()));
        }
        IntentSlotDataset::new(self.corpus, segment, root)
    }
}

pub static REGISTRY: &[RegistryEntry] = &[
    RegistryEntry {
        name: "atis",
        corpus: Corpus::Atis,
        segments: &Segment::ALL,
    },
    RegistryEntry {
        name: "snips",
        corpus: Corpus::Snips,
        segments: &Segment::ALL,
    },
];

pub fn lookup(name: &str) -> Result<&'static RegistryEntry> {
    REGISTRY
        .iter()
        .find(|entry| entry.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| DataError::UnknownDataset(name.to_string()))
}

pub fn registered_names() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|entry| entry.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_corpus_is_registered_with_all_segments() {
        for corpus in Corpus::ALL {
            let entry = lookup(corpus.name()).unwrap();
            assert_eq!(entry.corpus, corpus);
            assert!(Segment::ALL.iter().all(|segment| entry.supports(*segment)));
        }
        assert_eq!(registered_names().collect::<Vec<_>>(), vec!["atis", "snips"]);
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(matches!(lookup("mnist"), Err(DataError::UnknownDataset(_))));
    }
}
