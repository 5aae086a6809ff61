use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use strsim::jaro_winkler;

use crate::models::medicine::MedicineDetail;

/// Records compiled into the binary.
const BUILTIN_CATALOG: &str = include_str!("../../data/catalog.json");

/// OCR lines at or below this confidence are discarded before matching.
pub const MIN_LINE_CONFIDENCE: f64 = 0.8;

/// Threshold for fuzzy name matching (0.0 - 1.0).
pub const MATCH_THRESHOLD: f64 = 0.85;

/// One line of text read off the package.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OcrLine {
    pub text: String,
    pub confidence: f64,
}

/// Catalog record: the detail plus extra spellings to match against.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub detail: MedicineDetail,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CatalogMatch<'a> {
    pub entry: &'a CatalogEntry,
    pub line: &'a OcrLine,
    pub similarity: f64,
}

impl CatalogMatch<'_> {
    /// OCR certainty scaled by how closely the text matched.
    pub fn confidence(&self) -> f64 {
        (self.line.confidence * self.similarity).clamp(0.0, 1.0)
    }
}

/// Known medicines keyed by medicine id.
#[derive(Debug, Default)]
pub struct MedicineCatalog {
    entries: Vec<CatalogEntry>,
    by_id: HashMap<String, usize>,
}

impl MedicineCatalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
        let mut catalog = Self::default();
        catalog.extend(entries)?;
        Ok(catalog)
    }

    /// Merge records from a JSON file; ids already present are replaced.
    pub fn load_file(&mut self, path: &Path) -> Result<usize, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let entries: Vec<CatalogEntry> = serde_json::from_str(&raw)?;
        let count = entries.len();
        self.extend(entries)?;
        Ok(count)
    }

    fn extend(&mut self, entries: Vec<CatalogEntry>) -> Result<(), CatalogError> {
        for entry in entries {
            if entry.detail.medicine_id.trim().is_empty() {
                return Err(CatalogError::EmptyId(entry.detail.name));
            }
            match self.by_id.get(&entry.detail.medicine_id) {
                Some(&idx) => self.entries[idx] = entry,
                None => {
                    self.by_id
                        .insert(entry.detail.medicine_id.clone(), self.entries.len());
                    self.entries.push(entry);
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, medicine_id: &str) -> Option<&CatalogEntry> {
        self.by_id.get(medicine_id).map(|&idx| &self.entries[idx])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best catalog entry for the given OCR lines.
    ///
    /// Each confident line is compared against every entry's name, aliases and
    /// ingredients; the highest Jaro-Winkler score wins if it clears
    /// [`MATCH_THRESHOLD`].
    pub fn match_lines<'a>(&'a self, lines: &'a [OcrLine]) -> Option<CatalogMatch<'a>> {
        let mut best: Option<CatalogMatch<'a>> = None;

        for line in lines.iter().filter(|l| l.confidence > MIN_LINE_CONFIDENCE) {
            let text = normalize(&line.text);
            if text.is_empty() {
                continue;
            }
            for entry in &self.entries {
                let similarity = candidates(entry)
                    .map(|c| jaro_winkler(&text, &normalize(c)))
                    .fold(0.0_f64, f64::max);
                let better = best.as_ref().map_or(true, |b| {
                    similarity > b.similarity
                        || (similarity == b.similarity && line.confidence > b.line.confidence)
                });
                if similarity >= MATCH_THRESHOLD && better {
                    best = Some(CatalogMatch {
                        entry,
                        line,
                        similarity,
                    });
                }
            }
        }

        best
    }
}

fn candidates(entry: &CatalogEntry) -> impl Iterator<Item = &str> {
    std::iter::once(entry.detail.name.as_str())
        .chain(entry.aliases.iter().map(String::as_str))
        .chain(entry.detail.ingredients.iter().map(String::as_str))
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Catalog entry {0:?} has an empty medicine_id")]
    EmptyId(String),
}
