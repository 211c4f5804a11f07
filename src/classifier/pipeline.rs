use std::collections::{HashMap, HashSet};
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::Classifier;
use crate::error::ModelError;

/// Bag-of-words → tf-idf → linear model, exported to JSON from a trained
/// text-classification pipeline.
#[derive(Debug)]
pub struct LinearTextPipeline {
    token_re: Regex,
    lowercase: bool,
    ngram_range: (usize, usize),
    stop_words: HashSet<String>,
    binary: bool,
    vocabulary: HashMap<String, usize>,
    idf: Option<Vec<f64>>,
    sublinear_tf: bool,
    norm: Option<Norm>,
    coef: Vec<f64>,
    intercept: f64,
    labels: [bool; 2],
}

#[derive(Debug, Deserialize)]
struct ModelFile {
    vectorizer: VectorizerSpec,
    tfidf: TfidfSpec,
    classifier: LinearSpec,
}

#[derive(Debug, Deserialize)]
struct VectorizerSpec {
    vocabulary: HashMap<String, usize>,
    #[serde(default = "yes")]
    lowercase: bool,
    #[serde(default = "default_token_pattern")]
    token_pattern: String,
    #[serde(default = "default_ngram_range")]
    ngram_range: (usize, usize),
    #[serde(default)]
    stop_words: Option<Vec<String>>,
    #[serde(default)]
    binary: bool,
}

#[derive(Debug, Deserialize)]
struct TfidfSpec {
    idf: Vec<f64>,
    #[serde(default = "yes")]
    use_idf: bool,
    #[serde(default)]
    sublinear_tf: bool,
    #[serde(default = "default_norm")]
    norm: Option<Norm>,
}

#[derive(Debug, Deserialize)]
struct LinearSpec {
    coef: Vec<f64>,
    intercept: f64,
    #[serde(default = "default_classes")]
    classes: [Value; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Norm {
    L1,
    L2,
}

fn yes() -> bool {
    true
}

fn default_token_pattern() -> String {
    r"(?u)\b\w\w+\b".to_string()
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

fn default_norm() -> Option<Norm> {
    Some(Norm::L2)
}

fn default_classes() -> [Value; 2] {
    [Value::Bool(false), Value::Bool(true)]
}

/// A label counts as positive unless it is false, null, zero or empty.
fn truthy(label: &Value) -> bool {
    match label {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

impl LinearTextPipeline {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let json = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let model: ModelFile = serde_json::from_str(json)?;
        let ModelFile {
            vectorizer,
            tfidf,
            classifier,
        } = model;

        let columns = classifier.coef.len();
        if tfidf.use_idf && tfidf.idf.len() != columns {
            return Err(ModelError::DimensionMismatch {
                idf: tfidf.idf.len(),
                coef: columns,
            });
        }
        if let Some((term, &column)) = vectorizer.vocabulary.iter().find(|(_, &c)| c >= columns) {
            return Err(ModelError::ColumnOutOfRange {
                term: term.clone(),
                column,
                columns,
            });
        }
        let (min_n, max_n) = vectorizer.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(ModelError::NgramRange(min_n, max_n));
        }

        Ok(LinearTextPipeline {
            token_re: Regex::new(&vectorizer.token_pattern)?,
            lowercase: vectorizer.lowercase,
            ngram_range: vectorizer.ngram_range,
            stop_words: vectorizer.stop_words.unwrap_or_default().into_iter().collect(),
            binary: vectorizer.binary,
            vocabulary: vectorizer.vocabulary,
            idf: tfidf.use_idf.then_some(tfidf.idf),
            sublinear_tf: tfidf.sublinear_tf,
            norm: tfidf.norm,
            coef: classifier.coef,
            intercept: classifier.intercept,
            labels: [truthy(&classifier.classes[0]), truthy(&classifier.classes[1])],
        })
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Sparse term counts over vocabulary columns.
    fn count_terms(&self, text: &str) -> HashMap<usize, f64> {
        let text = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        let tokens: Vec<&str> = self
            .token_re
            .find_iter(&text)
            .map(|m| m.as_str())
            .filter(|t| !self.stop_words.contains(*t))
            .collect();

        let mut counts = HashMap::new();
        let (min_n, max_n) = self.ngram_range;
        for n in min_n..=max_n {
            for gram in tokens.windows(n) {
                let gram = gram.join(" ");
                if let Some(&column) = self.vocabulary.get(&gram) {
                    *counts.entry(column).or_insert(0.0) += 1.0;
                }
            }
        }
        counts
    }

    fn tfidf(&self, counts: HashMap<usize, f64>) -> HashMap<usize, f64> {
        let mut weights: HashMap<usize, f64> = counts
            .into_iter()
            .map(|(column, count)| {
                let mut tf = if self.binary { 1.0 } else { count };
                if self.sublinear_tf {
                    tf = tf.ln() + 1.0;
                }
                if let Some(idf) = &self.idf {
                    tf *= idf[column];
                }
                (column, tf)
            })
            .collect();

        let length = match self.norm {
            Some(Norm::L2) => weights.values().map(|w| w * w).sum::<f64>().sqrt(),
            Some(Norm::L1) => weights.values().map(|w| w.abs()).sum(),
            None => 1.0,
        };
        if length > 0.0 {
            for w in weights.values_mut() {
                *w /= length;
            }
        }
        weights
    }

    pub fn decision(&self, text: &str) -> f64 {
        let features = self.tfidf(self.count_terms(text));
        features
            .iter()
            .map(|(&column, w)| self.coef[column] * w)
            .sum::<f64>()
            + self.intercept
    }
}

impl Classifier for LinearTextPipeline {
    fn predict(&self, texts: &[String]) -> Vec<bool> {
        texts
            .iter()
            .map(|t| self.labels[usize::from(self.decision(t) > 0.0)])
            .collect()
    }
}
