use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::dataset::Segment;
use crate::errors::{DataError, Result};
use crate::vocab::Vocabulary;

const INTENT_SEPARATOR: char = ';';
const TOKEN_SEPARATOR: char = ' ';

/// One utterance: its tokens, the slot tag of every token, and the ids of
/// the intents it expresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRecord {
    pub tokens: Vec<String>,
    pub tags: Vec<String>,
    pub intents: Vec<u32>,
}

/// Paths of the three aligned files making up a segment.
#[derive(Debug, Clone)]
pub struct SegmentFiles {
    pub sentences: PathBuf,
    pub tags: PathBuf,
    pub intents: PathBuf,
}

impl SegmentFiles {
    pub fn new(root: &Path, segment: Segment) -> Self {
        let name = segment.as_str();
        Self {
            sentences: root.join(format!("{name}_sentence.txt")),
            tags: root.join(format!("{name}_tags.txt")),
            intents: root.join(format!("{name}_intent.txt")),
        }
    }
}

/// Reads every record of `segment` from `root`, in file order.
///
/// Line `i` of the sentence, tag and intent files forms record `i`. The
/// three files must have the same number of lines and every sentence must
/// carry exactly one tag per token; anything else is reported as
/// [`DataError::Misaligned`].
pub fn read_segment(
    root: &Path,
    segment: Segment,
    intent_vocab: &Vocabulary,
) -> Result<Vec<DatasetRecord>> {
    let files = SegmentFiles::new(root, segment);
    let sentences = read_lines(&files.sentences)?;
    let tags = read_lines(&files.tags)?;
    let intents = read_lines(&files.intents)?;

    if sentences.len() != tags.len() || sentences.len() != intents.len() {
        return Err(misaligned(
            segment,
            format!(
                "line counts differ (sentences={}, tags={}, intents={})",
                sentences.len(),
                tags.len(),
                intents.len()
            ),
        ));
    }

    let mut records = Vec::with_capacity(sentences.len());
    for (line_no, ((sentence, seq_tags), intent)) in
        sentences.iter().zip(&tags).zip(&intents).enumerate()
    {
        let tokens = split_tokens(sentence);
        let tags = split_tokens(seq_tags);
        if tokens.len() != tags.len() {
            return Err(misaligned(
                segment,
                format!(
                    "line {} has {} tokens but {} tags",
                    line_no + 1,
                    tokens.len(),
                    tags.len()
                ),
            ));
        }

        let intents = parse_intents(intent, intent_vocab)?;
        records.push(DatasetRecord {
            tokens,
            tags,
            intents,
        });
    }

    debug!(
        segment = segment.as_str(),
        records = records.len(),
        "segment parsed"
    );
    Ok(records)
}

/// Maps a `;`-separated intent line to vocabulary ids.
pub fn parse_intents(line: &str, intent_vocab: &Vocabulary) -> Result<Vec<u32>> {
    line.trim()
        .split(INTENT_SEPARATOR)
        .map(|intent| intent_vocab.lookup(intent))
        .collect()
}

fn split_tokens(line: &str) -> Vec<String> {
    line.split(TOKEN_SEPARATOR).map(str::to_string).collect()
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|source| DataError::MissingFile {
        path: path.to_path_buf(),
        source,
    })?;

    BufReader::new(file)
        .lines()
        .map(|line| {
            line.map(|line| line.trim_end().to_string())
                .map_err(DataError::from)
        })
        .collect()
}

fn misaligned(segment: Segment, reason: String) -> DataError {
    DataError::Misaligned {
        segment: segment.as_str().to_string(),
        reason,
    }
}
