//! Joint intent detection and slot filling datasets.
//!
//! Each corpus is a zip archive holding `{segment}_sentence.txt`,
//! `{segment}_tags.txt`, `{segment}_intent.txt` for the train, dev and test
//! segments, plus `intent_vocab.json` and `slot_vocab.json`. The archive is
//! downloaded and verified on first use and reused afterwards.

pub mod dataset;
pub mod errors;
pub mod fetch;
pub mod reader;
pub mod registry;
pub mod vocab;

pub use dataset::{Corpus, IntentSlotDataset, Segment, SlotStats};
pub use errors::{DataError, Result};
pub use fetch::{ensure_archive, ArchiveSource, DownloadDescriptor, FetchOutcome, HttpSource};
pub use reader::{read_segment, DatasetRecord};
pub use registry::{RegistryEntry, REGISTRY};
pub use vocab::{strip_slot_prefix, Vocabulary};
