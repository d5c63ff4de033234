use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{Result, TokenizerError};

/// Character vocabulary.
///
/// Ids are dense in `[0, len)` and follow code point order of the characters
/// seen at construction time, so building from the same corpus always yields
/// the same mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocab {
    id_to_char: Vec<char>,
    char_to_id: HashMap<char, u32>,
}

impl Vocab {
    /// Collect every distinct character of `text`, sorted.
    pub fn from_text(text: &str) -> Self {
        let chars: BTreeSet<char> = text.chars().collect();
        let id_to_char: Vec<char> = chars.into_iter().collect();
        let char_to_id = id_to_char
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i as u32))
            .collect();

        Self {
            id_to_char,
            char_to_id,
        }
    }

    /// Build from an explicit id order. Rejects duplicates.
    pub fn from_chars(chars: Vec<char>) -> Result<Self> {
        let mut char_to_id = HashMap::with_capacity(chars.len());
        for (i, &c) in chars.iter().enumerate() {
            if char_to_id.insert(c, i as u32).is_some() {
                return Err(TokenizerError::DuplicateSymbol(c));
            }
        }

        Ok(Self {
            id_to_char: chars,
            char_to_id,
        })
    }

    pub fn get_id(&self, c: char) -> Option<u32> {
        self.char_to_id.get(&c).copied()
    }

    pub fn get_char(&self, id: u32) -> Option<char> {
        self.id_to_char.get(id as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.id_to_char.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_char.is_empty()
    }

    /// All symbols concatenated in id order.
    pub fn alphabet(&self) -> String {
        self.id_to_char.iter().collect()
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        text.chars()
            .map(|c| self.get_id(c).ok_or(TokenizerError::UnknownSymbol(c)))
            .collect()
    }

    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        ids.iter()
            .map(|&id| self.get_char(id).ok_or(TokenizerError::UnknownId(id)))
            .collect()
    }

    /// Writes the symbols as a JSON array of one-character strings, in id order.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        let entries: Vec<String> = self.id_to_char.iter().map(|c| c.to_string()).collect();
        serde_json::to_writer_pretty(writer, &entries)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let entries: Vec<String> = serde_json::from_reader(reader)?;

        let mut chars = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut it = entry.chars();
            match (it.next(), it.next()) {
                (Some(c), None) => chars.push(c),
                _ => return Err(TokenizerError::InvalidEntry(entry)),
            }
        }

        Self::from_chars(chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocab_is_sorted_and_dense() {
        let vocab = Vocab::from_text("ba=\nab");
        assert_eq!(vocab.len(), 4);
        assert_eq!(vocab.alphabet(), "\n=ab");
        for id in 0..vocab.len() as u32 {
            let c = vocab.get_char(id).unwrap();
            assert_eq!(vocab.get_id(c), Some(id));
        }
    }

    #[test]
    fn test_round_trip() {
        let corpus = "12 + 30 = 42\n7 * 6 = 42\n";
        let vocab = Vocab::from_text(corpus);
        let text = "42 = 6 * 7\n";
        let ids = vocab.encode(text).unwrap();
        assert_eq!(ids.len(), text.chars().count());
        assert_eq!(vocab.decode(&ids).unwrap(), text);
    }

    #[test]
    fn test_unknown_symbol() {
        let vocab = Vocab::from_text("abc");
        match vocab.encode("abz") {
            Err(TokenizerError::UnknownSymbol('z')) => {}
            other => panic!("expected UnknownSymbol, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_id() {
        let vocab = Vocab::from_text("abc");
        assert!(matches!(vocab.decode(&[0, 3]), Err(TokenizerError::UnknownId(3))));
    }

    #[test]
    fn test_no_normalization() {
        let vocab = Vocab::from_text("aA \t");
        assert_eq!(vocab.len(), 4);
        assert_ne!(vocab.get_id('a'), vocab.get_id('A'));
    }

    #[test]
    fn test_save_load() {
        let vocab = Vocab::from_text("hello, world\n");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.json");
        vocab.save(&path).unwrap();
        let loaded = Vocab::load(&path).unwrap();
        assert_eq!(loaded, vocab);
    }

    #[test]
    fn test_duplicate_rejected() {
        assert!(matches!(
            Vocab::from_chars(vec!['a', 'b', 'a']),
            Err(TokenizerError::DuplicateSymbol('a'))
        ));
    }
}
