use std::fmt;
use std::ops::Index;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use once_cell::sync::OnceCell;
use tracing::info;

use crate::errors::{DataError, Result};
use crate::fetch::{ensure_archive, ArchiveSource, DownloadDescriptor, HttpSource};
use crate::reader::{read_segment, DatasetRecord};
use crate::vocab::Vocabulary;

/// Overrides the parent directory of the default dataset roots.
pub const DATA_HOME_ENV: &str = "SLU_DATA_HOME";
const DEFAULT_DATA_DIR: &str = "data";

pub const INTENT_VOCAB_FILE: &str = "intent_vocab.json";
pub const SLOT_VOCAB_FILE: &str = "slot_vocab.json";

/// One of the fixed data partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Train,
    Dev,
    Test,
}

impl Segment {
    pub const ALL: [Segment; 3] = [Segment::Train, Segment::Dev, Segment::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Segment::Train => "train",
            Segment::Dev => "dev",
            Segment::Test => "test",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Segment {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Segment::Train),
            "dev" => Ok(Segment::Dev),
            "test" => Ok(Segment::Test),
            other => Err(DataError::InvalidSegment(other.to_string())),
        }
    }
}

/// The supported corpora. They share every behaviour except where their
/// archive lives and where it is stored locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corpus {
    /// ATIS, converted from sz128/slot_filling_and_intent_detection_of_SLU
    /// (Hakkani-Tur et al., 2016).
    Atis,
    /// SNIPS, converted from the same source (Coucke et al., 2018).
    Snips,
}

impl Corpus {
    pub const ALL: [Corpus; 2] = [Corpus::Atis, Corpus::Snips];

    pub fn name(self) -> &'static str {
        match self {
            Corpus::Atis => "atis",
            Corpus::Snips => "snips",
        }
    }

    pub fn descriptor(self) -> DownloadDescriptor<'static> {
        match self {
            Corpus::Atis => DownloadDescriptor {
                filename: "atis.zip",
                url: "https://www.dropbox.com/s/w3afmp41t1jtna4/atis.zip?dl=1",
                sha1: "fb75a1b595566d5c5ec06ee6f2296d6629b8c225",
            },
            Corpus::Snips => DownloadDescriptor {
                filename: "snips.zip",
                url: "https://www.dropbox.com/s/3ashuawsyzpkx0m/snips.zip?dl=1",
                sha1: "f22420cc0f2a26078337dc375606be46a4cc8c51",
            },
        }
    }

    /// `$SLU_DATA_HOME/<name>` when set, otherwise `data/<name>`.
    pub fn default_root(self) -> PathBuf {
        let base = std::env::var_os(DATA_HOME_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        base.join(self.name())
    }
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Corpus {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "atis" => Ok(Corpus::Atis),
            "snips" => Ok(Corpus::Snips),
            _ => Err(DataError::UnknownDataset(s.to_string())),
        }
    }
}

/// Records of one segment of one corpus, plus its vocabularies.
///
/// Construction fetches the archive if needed and parses the segment;
/// afterwards the collection is read-only. Vocabularies are read from the
/// dataset root on first access and cached for the lifetime of the instance.
#[derive(Debug)]
pub struct IntentSlotDataset {
    corpus: Corpus,
    segment: Segment,
    root: PathBuf,
    records: Vec<DatasetRecord>,
    intent_vocab: OnceCell<Vocabulary>,
    slot_vocab: OnceCell<Vocabulary>,
}

impl IntentSlotDataset {
    /// Opens `segment` of `corpus`, downloading over HTTPS when needed.
    /// `root` defaults to [`Corpus::default_root`].
    pub fn new(corpus: Corpus, segment: Segment, root: Option<PathBuf>) -> Result<Self> {
        let source = HttpSource::new()?;
        Self::with_source(corpus, segment, root, &source)
    }

    pub fn with_source(
        corpus: Corpus,
        segment: Segment,
        root: Option<PathBuf>,
        source: &dyn ArchiveSource,
    ) -> Result<Self> {
        let root = root.unwrap_or_else(|| corpus.default_root());
        Self::open(corpus, segment, root, &corpus.descriptor(), source)
    }

    /// Opens a dataset whose archive is described by `descriptor` rather than
    /// the corpus default.
    pub fn open(
        corpus: Corpus,
        segment: Segment,
        root: PathBuf,
        descriptor: &DownloadDescriptor<'_>,
        source: &dyn ArchiveSource,
    ) -> Result<Self> {
        ensure_archive(&root, descriptor, source)?;

        let mut dataset = Self {
            corpus,
            segment,
            root,
            records: Vec::new(),
            intent_vocab: OnceCell::new(),
            slot_vocab: OnceCell::new(),
        };
        let records = read_segment(&dataset.root, segment, dataset.intent_vocab()?)?;
        dataset.records = records;

        info!(
            corpus = corpus.name(),
            segment = segment.as_str(),
            records = dataset.records.len(),
            "dataset ready"
        );
        Ok(dataset)
    }

    pub fn corpus(&self) -> Corpus {
        self.corpus
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DatasetRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[DatasetRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DatasetRecord> {
        self.records.iter()
    }

    pub fn intent_vocab(&self) -> Result<&Vocabulary> {
        self.intent_vocab
            .get_or_try_init(|| Vocabulary::from_path(&self.root.join(INTENT_VOCAB_FILE)))
    }

    pub fn slot_vocab(&self) -> Result<&Vocabulary> {
        self.slot_vocab
            .get_or_try_init(|| Vocabulary::from_path(&self.root.join(SLOT_VOCAB_FILE)))
    }
}

impl Index<usize> for IntentSlotDataset {
    type Output = DatasetRecord;

    fn index(&self, index: usize) -> &Self::Output {
        &self.records[index]
    }
}

impl<'a> IntoIterator for &'a IntentSlotDataset {
    type Item = &'a DatasetRecord;
    type IntoIter = std::slice::Iter<'a, DatasetRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Per-tag occurrence counts over one or more datasets, indexed by slot id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStats {
    pub counts: Vec<usize>,
    pub records: usize,
}

impl SlotStats {
    pub fn collect<'a, I>(slot_vocab: &Vocabulary, datasets: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a IntentSlotDataset>,
    {
        let mut counts = vec![0usize; slot_vocab.len()];
        let mut records = 0;
        for dataset in datasets {
            for record in dataset {
                for id in slot_vocab.lookup_all(&record.tags)? {
                    counts[id as usize] += 1;
                }
                records += 1;
            }
        }
        Ok(Self { counts, records })
    }

    /// Slot ids never observed in any record.
    pub fn unseen(&self) -> Vec<u32> {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &count)| count == 0)
            .map(|(id, _)| id as u32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_names_round_trip() {
        for segment in Segment::ALL {
            assert_eq!(segment.as_str().parse::<Segment>().unwrap(), segment);
        }
        assert!(matches!(
            "validation".parse::<Segment>(),
            Err(DataError::InvalidSegment(_))
        ));
    }

    #[test]
    fn corpora_differ_only_in_descriptor() {
        let atis = Corpus::Atis.descriptor();
        let snips = Corpus::Snips.descriptor();
        assert_eq!(atis.filename, "atis.zip");
        assert_eq!(snips.filename, "snips.zip");
        assert_ne!(atis.sha1, snips.sha1);
        assert!(atis.url.starts_with("https://"));
        assert!(snips.url.starts_with("https://"));
        assert_eq!("SNIPS".parse::<Corpus>().unwrap(), Corpus::Snips);
    }
}
