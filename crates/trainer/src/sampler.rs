//! Skip-gram example stream

use serde::Serialize;

/// Whether an example is an observed pair or a sampled negative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    Positive,
    Negative,
}

impl SampleKind {
    /// Target score for this kind of example
    pub fn label(self) -> f64 {
        match self {
            SampleKind::Positive => 1.0,
            SampleKind::Negative => 0.0,
        }
    }
}

impl std::fmt::Display for SampleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleKind::Positive => write!(f, "positive"),
            SampleKind::Negative => write!(f, "negative"),
        }
    }
}

/// One training example
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Example {
    pub word: u64,
    pub context: u64,
    pub kind: SampleKind,
}

impl Example {
    pub fn positive(word: u64, context: u64) -> Self {
        Self {
            word,
            context,
            kind: SampleKind::Positive,
        }
    }

    pub fn negative(word: u64, context: u64) -> Self {
        Self {
            word,
            context,
            kind: SampleKind::Negative,
        }
    }

    pub fn label(&self) -> f64 {
        self.kind.label()
    }
}

/// Endless cursor over the adjacent pairs of every document.
///
/// Documents shorter than two tokens contribute no pairs. After the last
/// pair of the last document the cursor starts the next pass.
#[derive(Debug, Clone)]
pub struct PairCursor {
    documents: Vec<Vec<u64>>,
    doc: usize,
    pos: usize,
    pass: u64,
}

impl PairCursor {
    /// Returns `None` if no document has a pair
    pub fn new(documents: Vec<Vec<u64>>) -> Option<Self> {
        if !documents.iter().any(|d| d.len() >= 2) {
            return None;
        }
        Some(Self {
            documents,
            doc: 0,
            pos: 0,
            pass: 1,
        })
    }

    /// Pass of the most recently returned pair, starting at 1
    pub fn pass(&self) -> u64 {
        self.pass
    }

    pub fn next_pair(&mut self) -> Example {
        loop {
            if self.doc == self.documents.len() {
                self.doc = 0;
                self.pass += 1;
            }
            let doc = &self.documents[self.doc];
            if self.pos + 1 < doc.len() {
                let example = Example::positive(doc[self.pos], doc[self.pos + 1]);
                self.pos += 1;
                return example;
            }
            self.doc += 1;
            self.pos = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_in_order_across_passes() {
        let mut cursor = PairCursor::new(vec![vec![1, 2, 3], vec![4], vec![5, 6]]).unwrap();
        let mut seen = Vec::new();
        for _ in 0..6 {
            let ex = cursor.next_pair();
            let pass = cursor.pass();
            assert_eq!(ex.kind, SampleKind::Positive);
            seen.push((pass, ex.word, ex.context));
        }
        assert_eq!(
            seen,
            vec![
                (1, 1, 2),
                (1, 2, 3),
                (1, 5, 6),
                (2, 1, 2),
                (2, 2, 3),
                (2, 5, 6),
            ]
        );
    }

    #[test]
    fn test_no_pairs() {
        assert!(PairCursor::new(vec![]).is_none());
        assert!(PairCursor::new(vec![vec![7], vec![]]).is_none());
    }

    #[test]
    fn test_labels() {
        assert_eq!(Example::positive(1, 2).label(), 1.0);
        assert_eq!(Example::negative(1, 2).label(), 0.0);
        assert_eq!(
            serde_json::to_string(&SampleKind::Negative).unwrap(),
            "\"negative\""
        );
    }
}
