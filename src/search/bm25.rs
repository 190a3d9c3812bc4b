//! BM25 lexical ranking over chunk metadata documents

use std::collections::HashMap;

/// Term frequency saturation.
const K1: f64 = 1.2;
/// Length normalization.
const B: f64 = 0.75;

/// In-memory BM25 index built per search over the candidate set.
#[derive(Debug, Default)]
pub struct Bm25Index {
    docs: Vec<(String, Vec<String>)>,
    doc_freq: HashMap<String, f64>,
    avg_doc_length: f64,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowercased alphanumeric/underscore tokens, single characters dropped.
    pub fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|s| s.len() > 1)
            .map(String::from)
            .collect()
    }

    pub fn add_document(&mut self, id: String, text: &str) {
        let tokens = Self::tokenize(text);

        let mut unique: Vec<&String> = tokens.iter().collect();
        unique.sort();
        unique.dedup();
        for term in unique {
            *self.doc_freq.entry(term.clone()).or_insert(0.0) += 1.0;
        }

        self.docs.push((id, tokens));
        let total: usize = self.docs.iter().map(|(_, t)| t.len()).sum();
        self.avg_doc_length = total as f64 / self.docs.len() as f64;
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn idf(&self, term: &str) -> f64 {
        let df = self.doc_freq.get(term).copied().unwrap_or(0.0);
        if df == 0.0 {
            return 0.0;
        }
        let n = self.docs.len() as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score(&self, tokens: &[String], query_terms: &[String]) -> f64 {
        let doc_length = tokens.len() as f64;
        let mut freqs: HashMap<&str, usize> = HashMap::new();
        for t in tokens {
            *freqs.entry(t.as_str()).or_insert(0) += 1;
        }

        let mut score = 0.0;
        for term in query_terms {
            let tf = freqs.get(term.as_str()).copied().unwrap_or(0) as f64;
            if tf > 0.0 {
                let numerator = tf * (K1 + 1.0);
                let denominator = tf + K1 * (1.0 - B + B * (doc_length / self.avg_doc_length));
                score += self.idf(term) * (numerator / denominator);
            }
        }
        score
    }

    /// Score every document against the query and return positive hits,
    /// ranked descending with an id tiebreak for determinism.
    pub fn search(&self, query: &str) -> Vec<(String, f64)> {
        let query_terms = Self::tokenize(query);
        if query_terms.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let mut scores: Vec<(String, f64)> = self
            .docs
            .iter()
            .map(|(id, tokens)| (id.clone(), self.score(tokens, &query_terms)))
            .filter(|(_, s)| *s > 0.0)
            .collect();

        scores.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scores
    }
}
