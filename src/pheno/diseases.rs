//! Disease to phenotype term frequency annotations.
//!
//! Reads the HPO `phenotype.hpoa` file (current layout with `DB:ID` in the first column) or the
//! legacy `phenotype_annotation.tab` layout (database and ID in separate columns).

use std::{collections::HashMap, io::BufRead, path::Path};

use indexmap::IndexMap;
use regex::Regex;

use crate::common::io::open_read_maybe_gz;

/// Disease databases that are considered.
pub const DATABASES: &[&str] = &["DECIPHER", "OMIM", "ORPHA"];

lazy_static::lazy_static! {
    /// Disease references embedded in the reference column.
    static ref DB_REF_REGEX: Regex =
        Regex::new(r"([A-Z]+):(\d+)").expect("invalid regex in source code");
}

/// Frequency of the HPO frequency sub ontology terms.
pub fn frequency_term(id: &str) -> Option<f64> {
    match id {
        "HP:0040280" => Some(1.0),
        "HP:0040281" => Some((0.99 + 0.80) / 2.0),
        "HP:0040282" => Some((0.79 + 0.30) / 2.0),
        "HP:0040283" => Some((0.05 + 0.29) / 2.0),
        "HP:0040284" => Some((0.01 + 0.04) / 2.0),
        "HP:0040285" => Some(0.0),
        _ => None,
    }
}

/// Frequency of qualitative frequency descriptions.
pub fn frequency_word(word: &str) -> Option<f64> {
    match word {
        "very rare" => Some(0.01),
        "rare" => Some(0.05),
        "occasional" => Some(0.075),
        "frequent" => Some(0.33),
        "typical" | "variable" => Some(0.5),
        "common" => Some(0.75),
        "hallmark" => Some(0.9),
        "obligate" => Some(1.0),
        _ => None,
    }
}

/// Parse a frequency field into a value in `[0, 1]`.
///
/// Returns `Ok(None)` for an empty field.
pub fn parse_frequency(field: &str) -> Result<Option<f64>, anyhow::Error> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(None);
    }
    if let Some(freq) = frequency_term(&field.to_ascii_uppercase()) {
        return Ok(Some(freq));
    }

    let field = field.to_lowercase();
    let freq = if let Some(freq) = frequency_word(&field) {
        freq
    } else if let Some(percent) = field.strip_suffix('%') {
        if let Some((low, high)) = percent.split_once('-') {
            (low.trim().parse::<f64>()? + high.trim().parse::<f64>()?) / 2.0 / 100.0
        } else {
            percent.trim().parse::<f64>()? / 100.0
        }
    } else if let Some((num, denom)) = field.split_once('/') {
        let denom = denom.trim().parse::<f64>()?;
        if denom == 0.0 {
            anyhow::bail!("zero denominator in frequency {:?}", &field);
        }
        num.trim().parse::<f64>()? / denom
    } else {
        anyhow::bail!("unknown frequency {:?}", &field);
    };

    if (0.0..=1.0).contains(&freq) {
        Ok(Some(freq))
    } else {
        anyhow::bail!("frequency {:?} out of range", &field)
    }
}

/// Normalize a disease code, e.g., `MIM:616007` becomes `OMIM:616007`.
pub fn normalize_code(code: &str) -> Option<String> {
    let (db, id) = code.trim().split_once(':')?;
    let db = match db.trim().to_ascii_uppercase().as_str() {
        "MIM" | "IM" | "OMIM" => "OMIM".to_string(),
        "ORPHANET" => "ORPHA".to_string(),
        other => other.to_string(),
    };
    let id = id.trim();
    if id.is_empty() {
        None
    } else {
        Some(format!("{}:{}", db, id))
    }
}

/// A disease with its phenotype term frequencies.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Disease {
    /// Database, e.g., `OMIM`.
    pub database: String,
    /// ID within the database.
    pub id: String,
    /// Maps term ID to frequency, `None` if unknown.
    pub phenotype_freqs: IndexMap<String, Option<f64>>,
}

impl Disease {
    /// The `DB:ID` code of the disease.
    pub fn code(&self) -> String {
        format!("{}:{}", self.database, self.id)
    }

    /// Record one annotation, keeping the maximal frequency.
    fn annotate(&mut self, term_id: &str, freq: Option<f64>) {
        match self.phenotype_freqs.get_mut(term_id) {
            Some(old) => {
                if let Some(freq) = freq {
                    if old.map(|old| old < freq).unwrap_or(true) {
                        *old = Some(freq);
                    }
                }
            }
            None => {
                self.phenotype_freqs.insert(term_id.to_string(), freq);
            }
        }
    }
}

/// One annotation line.
#[derive(Debug, Clone, PartialEq)]
struct Annotation {
    code: String,
    negated: bool,
    term_id: String,
    reference: String,
    frequency: String,
}

impl Annotation {
    /// Interpret a record in either the current or the legacy layout.
    fn from_record(record: &csv::StringRecord) -> Option<Self> {
        let field = |i: usize| record.get(i).unwrap_or_default().trim().to_string();
        if field(0).contains(':') {
            Some(Self {
                code: field(0),
                negated: field(2) == "NOT",
                term_id: field(3),
                reference: field(4),
                frequency: field(7),
            })
        } else if record.len() > 8 {
            Some(Self {
                code: format!("{}:{}", field(0), field(1)),
                negated: field(3) == "NOT",
                term_id: field(4),
                reference: field(5),
                frequency: field(8),
            })
        } else {
            None
        }
    }
}

/// The disease frequency table.
#[derive(Debug, Clone, Default)]
pub struct Diseases {
    diseases: IndexMap<String, Disease>,
    /// Maps cross-referenced codes to the code of the annotated disease.
    aliases: HashMap<String, String>,
}

impl Diseases {
    /// Load from the given file, optionally gzip-compressed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let reader = open_read_maybe_gz(path.as_ref())?;
        Self::from_reader(reader).map_err(|e| {
            anyhow::anyhow!("could not load annotations {:?}: {}", path.as_ref(), e)
        })
    }

    /// Parse the annotations from a reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, anyhow::Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(true)
            .quoting(false)
            .from_reader(reader);

        let mut result = Self::default();
        for record in csv_reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("skipping malformed annotation record: {}", e);
                    continue;
                }
            };
            let Some(annotation) = Annotation::from_record(&record) else {
                continue;
            };
            result.push(annotation);
        }

        Ok(result)
    }

    fn push(&mut self, annotation: Annotation) {
        let Some(code) = normalize_code(&annotation.code) else {
            return;
        };
        let Some((database, id)) = code.split_once(':') else {
            return;
        };
        if !DATABASES.contains(&database) || annotation.negated {
            return;
        }
        let freq = match parse_frequency(&annotation.frequency) {
            Ok(freq) => freq,
            Err(e) => {
                tracing::warn!(
                    "ignoring {} annotation of {}: {}",
                    &annotation.term_id,
                    &code,
                    e
                );
                return;
            }
        };

        for caps in DB_REF_REGEX.captures_iter(&annotation.reference) {
            let Some(alias) = normalize_code(&caps[0]) else {
                continue;
            };
            let known_db = alias
                .split_once(':')
                .map(|(db, _)| DATABASES.contains(&db))
                .unwrap_or(false);
            if known_db && alias != code {
                self.aliases.entry(alias).or_insert_with(|| code.clone());
            }
        }

        self.diseases
            .entry(code.clone())
            .or_insert_with(|| Disease {
                database: database.to_string(),
                id: id.to_string(),
                ..Default::default()
            })
            .annotate(&annotation.term_id, freq);
    }

    /// Look up a disease by its code or a cross-referenced code.
    pub fn get(&self, code: &str) -> Option<&Disease> {
        let code = normalize_code(code)?;
        self.diseases.get(&code).or_else(|| {
            self.aliases
                .get(&code)
                .and_then(|primary| self.diseases.get(primary))
        })
    }

    /// Iterate over the annotated diseases; aliases are not repeated.
    pub fn iter(&self) -> impl Iterator<Item = &Disease> {
        self.diseases.values()
    }

    /// Number of annotated diseases.
    pub fn len(&self) -> usize {
        self.diseases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diseases.is_empty()
    }

    /// Number of cross-reference codes.
    pub fn num_aliases(&self) -> usize {
        self.aliases.len()
    }
}
