//! Corpus: documents as word-index sequences

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tokenizers::models::wordlevel::WordLevel;
use tokenizers::pre_tokenizers::sequence::Sequence;
use tokenizers::pre_tokenizers::split::{Split, SplitPattern};
use tokenizers::pre_tokenizers::whitespace::WhitespaceSplit;
use tokenizers::{
    Model, OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer, SplitDelimiterBehavior,
};
use zip::ZipArchive;

use crate::error::{Result, TrainError};

/// Characters dropped before splitting text into words
const FILTER_PATTERN: &str = r##"[!"#$%&()*+,\-./:;<=>?@\[\\\]\^_`{|}~\t\n]"##;

/// Token holding index 0
const UNKNOWN: &str = "[UNK]";

/// First document of the reference IMDB index sequences
const EXAMPLE_DOCUMENT: [u64; 20] = [
    4935, 3090, 12, 6, 182, 2, 2843, 48, 58, 157, 127, 779, 458, 10178, 134, 1, 25527, 2, 1, 113,
];

/// Vocabulary size belonging to [`EXAMPLE_DOCUMENT`]
const EXAMPLE_VOCAB_SIZE: u64 = 213_271;

fn tokenizer_error(e: tokenizers::Error) -> TrainError {
    TrainError::Tokenizer(e.to_string())
}

/// Filter characters removed, then split on whitespace; case is kept
fn word_splitter() -> Result<Sequence> {
    let filters = Split::new(
        SplitPattern::Regex(FILTER_PATTERN.to_string()),
        SplitDelimiterBehavior::Removed,
        false,
    )
    .map_err(tokenizer_error)?;
    Ok(Sequence::new(vec![filters.into(), WhitespaceSplit.into()]))
}

fn split_words(splitter: &Sequence, text: &str) -> Result<Vec<String>> {
    let mut pretokenized = PreTokenizedString::from(text);
    splitter
        .pre_tokenize(&mut pretokenized)
        .map_err(tokenizer_error)?;
    Ok(pretokenized
        .get_splits(OffsetReferential::Original, OffsetType::Byte)
        .into_iter()
        .filter(|(word, _, _)| !word.is_empty())
        .map(|(word, _, _)| word.to_string())
        .collect())
}

/// Word-level model ordered by descending frequency.
///
/// Index 0 is reserved for words that were not seen when the vocabulary was
/// built; the most frequent word is 1.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    model: WordLevel,
    splitter: Sequence,
}

impl Vocabulary {
    /// Split text into words
    pub fn tokenize(text: &str) -> Result<Vec<String>> {
        split_words(&word_splitter()?, text)
    }

    /// Build from texts; ties in frequency keep first-occurrence order
    pub fn from_texts<S: AsRef<str>>(texts: &[S]) -> Result<Self> {
        let splitter = word_splitter()?;
        let mut counts: HashMap<String, (u64, usize)> = HashMap::new();
        for text in texts {
            for word in split_words(&splitter, text.as_ref())? {
                let first = counts.len();
                counts.entry(word).or_insert((0, first)).0 += 1;
            }
        }

        let mut ranked: Vec<(String, (u64, usize))> = counts.into_iter().collect();
        ranked.sort_by(|(_, a), (_, b)| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let vocab = std::iter::once((UNKNOWN.to_string(), 0u32))
            .chain(
                ranked
                    .into_iter()
                    .enumerate()
                    .map(|(i, (word, _))| (word, i as u32 + 1)),
            )
            .collect();
        let model = WordLevel::builder()
            .vocab(vocab)
            .unk_token(UNKNOWN.to_string())
            .build()
            .map_err(tokenizer_error)?;
        Ok(Self { model, splitter })
    }

    /// Index of `word`, 0 if unknown
    pub fn id(&self, word: &str) -> u64 {
        self.model.token_to_id(word).map_or(0, u64::from)
    }

    pub fn word(&self, id: u64) -> Option<String> {
        if id == 0 {
            return None;
        }
        self.model.id_to_token(u32::try_from(id).ok()?)
    }

    /// Number of indices in use, including the unknown index 0
    pub fn size(&self) -> u64 {
        self.model.get_vocab_size() as u64
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u64>> {
        Ok(split_words(&self.splitter, text)?
            .iter()
            .map(|w| self.id(w))
            .collect())
    }
}

/// Text of one file, or one text per file entry of a `.zip` archive in
/// archive order
fn read_texts(path: &Path) -> Result<Vec<String>> {
    let is_zip = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if !is_zip {
        return Ok(vec![std::fs::read_to_string(path)?]);
    }

    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut texts = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        tracing::debug!("{}: {} bytes", entry.name(), bytes.len());
        texts.push(String::from_utf8_lossy(&bytes).into_owned());
    }
    Ok(texts)
}

/// Documents of word indices, all below `vocab_size`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corpus {
    documents: Vec<Vec<u64>>,
    vocab_size: u64,
}

impl Corpus {
    /// Validate and wrap index sequences
    pub fn new(documents: Vec<Vec<u64>>, vocab_size: u64) -> Result<Self> {
        for (d, doc) in documents.iter().enumerate() {
            if let Some(&id) = doc.iter().find(|&&id| id >= vocab_size) {
                return Err(TrainError::Corpus(format!(
                    "document {} contains index {} outside vocabulary of {}",
                    d, id, vocab_size
                )));
            }
        }
        if !documents.iter().any(|d| d.len() >= 2) {
            return Err(TrainError::Corpus(
                "corpus has no document with at least two words".to_string(),
            ));
        }
        Ok(Self {
            documents,
            vocab_size,
        })
    }

    /// The built-in single-document corpus
    pub fn example() -> Self {
        Self {
            documents: vec![EXAMPLE_DOCUMENT.to_vec()],
            vocab_size: EXAMPLE_VOCAB_SIZE,
        }
    }

    /// Tokenize texts into one document each
    pub fn from_texts<S: AsRef<str>>(texts: &[S]) -> Result<(Self, Vocabulary)> {
        let vocab = Vocabulary::from_texts(texts)?;
        let documents = texts
            .iter()
            .map(|t| vocab.encode(t.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let corpus = Self::new(documents, vocab.size())?;
        Ok((corpus, vocab))
    }

    /// Load text files and `.zip` archives of documents, or every file of a
    /// directory in name order
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<(Self, Vocabulary)> {
        let mut files = Vec::new();
        for path in paths {
            let path = path.as_ref();
            if path.is_dir() {
                let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
                    .map(|entry| entry.map(|e| e.path()))
                    .collect::<std::io::Result<_>>()?;
                entries.retain(|p| p.is_file());
                entries.sort();
                files.extend(entries);
            } else {
                files.push(path.to_path_buf());
            }
        }
        if files.is_empty() {
            return Err(TrainError::Corpus("no corpus files given".to_string()));
        }

        let mut texts = Vec::new();
        for file in &files {
            texts.extend(read_texts(file)?);
        }
        tracing::debug!("Read {} documents from {} files", texts.len(), files.len());
        Self::from_texts(&texts)
    }

    pub fn documents(&self) -> &[Vec<u64>] {
        &self.documents
    }

    pub fn vocab_size(&self) -> u64 {
        self.vocab_size
    }

    pub fn token_count(&self) -> usize {
        self.documents.iter().map(Vec::len).sum()
    }

    /// Number of positive examples in one pass
    pub fn pair_count(&self) -> usize {
        self.documents
            .iter()
            .map(|d| d.len().saturating_sub(1))
            .sum()
    }
}
