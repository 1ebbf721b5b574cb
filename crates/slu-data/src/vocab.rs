use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{DataError, Result};

/// Bidirectional token/id mapping shipped alongside each corpus.
///
/// The on-disk layout is the gluonnlp `Vocab.to_json` object. Only
/// `idx_to_token` is required; `token_to_idx` is rebuilt from it when absent
/// and checked for consistency when present.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    idx_to_token: Vec<String>,
    token_to_idx: HashMap<String, u32>,
    unknown_token: Option<String>,
    reserved_tokens: Vec<String>,
    padding_token: Option<String>,
    bos_token: Option<String>,
    eos_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VocabularyFile {
    idx_to_token: Vec<String>,
    #[serde(default)]
    token_to_idx: Option<HashMap<String, u32>>,
    #[serde(default)]
    unknown_token: Option<String>,
    #[serde(default)]
    reserved_tokens: Option<Vec<String>>,
    #[serde(default)]
    padding_token: Option<String>,
    #[serde(default)]
    bos_token: Option<String>,
    #[serde(default)]
    eos_token: Option<String>,
}

impl Vocabulary {
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| DataError::MissingFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents).map_err(|err| match err {
            DataError::Vocabulary { reason, .. } => DataError::Vocabulary {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: VocabularyFile = serde_json::from_str(json).map_err(invalid)?;
        Self::from_file(raw)
    }

    /// Builds a vocabulary from an ordered token list; ids follow list order.
    pub fn from_tokens<I, S>(tokens: I, unknown_token: Option<&str>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_file(VocabularyFile {
            idx_to_token: tokens.into_iter().map(Into::into).collect(),
            token_to_idx: None,
            unknown_token: unknown_token.map(str::to_string),
            reserved_tokens: None,
            padding_token: None,
            bos_token: None,
            eos_token: None,
        })
    }

    fn from_file(raw: VocabularyFile) -> Result<Self> {
        let mut token_to_idx = HashMap::with_capacity(raw.idx_to_token.len());
        for (idx, token) in raw.idx_to_token.iter().enumerate() {
            if token_to_idx.insert(token.clone(), idx as u32).is_some() {
                return Err(invalid(format!("duplicate token '{token}'")));
            }
        }

        if let Some(stored) = raw.token_to_idx {
            if stored != token_to_idx {
                return Err(invalid("token_to_idx disagrees with idx_to_token"));
            }
        }

        for special in [&raw.unknown_token, &raw.padding_token, &raw.bos_token, &raw.eos_token]
            .into_iter()
            .flatten()
        {
            if !token_to_idx.contains_key(special) {
                return Err(invalid(format!(
                    "special token '{special}' missing from idx_to_token"
                )));
            }
        }

        Ok(Self {
            idx_to_token: raw.idx_to_token,
            token_to_idx,
            unknown_token: raw.unknown_token,
            reserved_tokens: raw.reserved_tokens.unwrap_or_default(),
            padding_token: raw.padding_token,
            bos_token: raw.bos_token,
            eos_token: raw.eos_token,
        })
    }

    pub fn len(&self) -> usize {
        self.idx_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx_to_token.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.token_to_idx.contains_key(token)
    }

    /// Id of `token`, falling back to the unknown token's id.
    pub fn lookup(&self, token: &str) -> Result<u32> {
        if let Some(&idx) = self.token_to_idx.get(token) {
            return Ok(idx);
        }
        self.unknown_id()
            .ok_or_else(|| DataError::UnknownToken(token.to_string()))
    }

    pub fn lookup_all<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Vec<u32>> {
        tokens.iter().map(|token| self.lookup(token.as_ref())).collect()
    }

    pub fn token(&self, idx: u32) -> Option<&str> {
        self.idx_to_token.get(idx as usize).map(String::as_str)
    }

    pub fn idx_to_token(&self) -> &[String] {
        &self.idx_to_token
    }

    pub fn unknown_token(&self) -> Option<&str> {
        self.unknown_token.as_deref()
    }

    pub fn unknown_id(&self) -> Option<u32> {
        self.unknown_token
            .as_ref()
            .and_then(|token| self.token_to_idx.get(token).copied())
    }

    pub fn reserved_tokens(&self) -> &[String] {
        &self.reserved_tokens
    }

    pub fn padding_token(&self) -> Option<&str> {
        self.padding_token.as_deref()
    }

    pub fn bos_token(&self) -> Option<&str> {
        self.bos_token.as_deref()
    }

    pub fn eos_token(&self) -> Option<&str> {
        self.eos_token.as_deref()
    }

    /// Distinct slot types once `B-`/`I-` span prefixes are removed.
    pub fn slot_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self
            .idx_to_token
            .iter()
            .map(|tag| strip_slot_prefix(tag))
            .collect();
        types.sort_unstable();
        types.dedup();
        types
    }
}

/// Removes a leading span marker from a slot tag: `B-city` and `I-city`
/// both become `city`. Tags starting with `B` or `I` lose their first two
/// characters, matching how the corpora were converted.
pub fn strip_slot_prefix(tag: &str) -> &str {
    if tag.starts_with('B') || tag.starts_with('I') {
        tag.get(2..).unwrap_or("")
    } else {
        tag
    }
}

fn invalid(reason: impl ToString) -> DataError {
    DataError::Vocabulary {
        path: Default::default(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GLUON_JSON: &str = r#"{
        "idx_to_token": ["<unk>", "<pad>", "O", "B-city", "I-city", "B-date"],
        "token_to_idx": {"<unk>": 0, "<pad>": 1, "O": 2, "B-city": 3, "I-city": 4, "B-date": 5},
        "reserved_tokens": ["<pad>"],
        "unknown_token": "<unk>",
        "padding_token": "<pad>",
        "bos_token": null,
        "eos_token": null
    }"#;

    #[test]
    fn parses_gluon_layout() {
        let vocab = Vocabulary::from_json(GLUON_JSON).unwrap();
        assert_eq!(vocab.len(), 6);
        assert_eq!(vocab.lookup("B-city").unwrap(), 3);
        assert_eq!(vocab.token(5), Some("B-date"));
        assert_eq!(vocab.padding_token(), Some("<pad>"));
        assert_eq!(vocab.reserved_tokens(), &["<pad>".to_string()]);
    }

    #[test]
    fn unknown_tokens_map_to_reserved_id() {
        let vocab = Vocabulary::from_json(GLUON_JSON).unwrap();
        assert_eq!(vocab.lookup("B-airline").unwrap(), 0);
        assert_eq!(vocab.lookup_all(&["O", "nope"]).unwrap(), vec![2, 0]);
    }

    #[test]
    fn lookup_without_unknown_token_fails() {
        let vocab = Vocabulary::from_tokens(["atis_flight", "atis_airfare"], None).unwrap();
        assert_eq!(vocab.lookup("atis_airfare").unwrap(), 1);
        assert!(matches!(
            vocab.lookup("atis_meal"),
            Err(DataError::UnknownToken(token)) if token == "atis_meal"
        ));
    }

    #[test]
    fn inconsistent_index_is_rejected() {
        let json = r#"{"idx_to_token": ["a", "b"], "token_to_idx": {"a": 1, "b": 0}}"#;
        assert!(matches!(
            Vocabulary::from_json(json),
            Err(DataError::Vocabulary { .. })
        ));
    }

    #[test]
    fn slot_prefixes_collapse_to_types() {
        assert_eq!(strip_slot_prefix("B-fromloc.city_name"), "fromloc.city_name");
        assert_eq!(strip_slot_prefix("I-fromloc.city_name"), "fromloc.city_name");
        assert_eq!(strip_slot_prefix("O"), "O");
        assert_eq!(strip_slot_prefix(strip_slot_prefix("B-x")), "x");

        let vocab = Vocabulary::from_json(GLUON_JSON).unwrap();
        assert_eq!(vocab.slot_types(), vec!["<pad>", "<unk>", "O", "city", "date"]);
    }
}
