//! Phenotype ontology graph loaded from an OBO file.
//!
//! Terms live in an arena and reference their parents and children by index.  Ancestor
//! closures are computed once while building the graph and cached for the lifetime of the
//! ontology.

use std::{
    collections::{HashMap, HashSet},
    io::BufRead,
    path::Path,
};

use crate::common::io::open_read_maybe_gz;

/// ID of the ontology root term.
pub const ROOT: &str = "HP:0000001";

/// Error type for loading the ontology.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("malformed term block at line {line}: {msg}")]
    Parse { line: usize, msg: String },
    #[error("root term {0} not found in ontology")]
    MissingRoot(String),
    #[error("problem reading ontology: {0}")]
    Io(#[from] std::io::Error),
}

/// Index of a term in the ontology arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermIdx(u32);

impl TermIdx {
    pub(crate) fn get(self) -> usize {
        self.0 as usize
    }
}

/// One ontology term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub id: String,
    pub name: String,
    pub alt_ids: Vec<String>,
    pub parents: Vec<TermIdx>,
    pub children: Vec<TermIdx>,
}

/// A term block as read from the OBO file, before linking.
#[derive(Debug, Default)]
struct RawTerm {
    line: usize,
    id: Option<String>,
    name: Option<String>,
    parent_ids: Vec<String>,
    alt_ids: Vec<String>,
    obsolete: bool,
    replaced_by: Option<String>,
}

impl RawTerm {
    /// Interpret one `tag: value` line of a `[Term]` stanza.
    fn push_line(&mut self, line: &str) {
        let Some((tag, value)) = line.split_once(':') else {
            return;
        };
        // Strip trailing comments and qualifier blocks, e.g., `HP:0000118 {...} ! name`.
        let value = value.split(" !").next().unwrap_or_default().trim();
        let first_token = || value.split_whitespace().next().map(str::to_string);
        match tag.trim() {
            "id" => self.id = first_token(),
            "name" => self.name = Some(value.to_string()).filter(|name| !name.is_empty()),
            "is_a" => self.parent_ids.extend(first_token()),
            "alt_id" => self.alt_ids.extend(first_token()),
            "is_obsolete" => self.obsolete = value == "true",
            "replaced_by" => self.replaced_by = first_token(),
            _ => (),
        }
    }

    /// Check for the required fields.
    fn validate(&self) -> Result<(), Error> {
        match (&self.id, &self.name) {
            (Some(_), Some(_)) => Ok(()),
            (None, _) => Err(Error::Parse {
                line: self.line,
                msg: "missing id".into(),
            }),
            (Some(id), None) => Err(Error::Parse {
                line: self.line,
                msg: format!("missing name for {}", id),
            }),
        }
    }
}

/// The ontology graph.
#[derive(Debug, Clone)]
pub struct Ontology {
    terms: Vec<Term>,
    /// Maps canonical IDs, alternative IDs and replaced obsolete IDs to terms.
    index: HashMap<String, TermIdx>,
    /// Sorted ancestor closure of each term, including the term itself.
    ancestors: Vec<Vec<TermIdx>>,
    root: TermIdx,
}

impl Ontology {
    /// Load the ontology from the given OBO file, optionally gzip-compressed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let reader = open_read_maybe_gz(path.as_ref())?;
        Self::from_reader(reader)
            .map_err(|e| anyhow::anyhow!("could not load ontology {:?}: {}", path.as_ref(), e))
    }

    /// Parse the ontology from a reader of OBO data.
    ///
    /// Malformed term blocks are logged and skipped.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        let raw_terms = Self::read_stanzas(reader)?;

        let mut terms = Vec::new();
        let mut index = HashMap::new();
        let mut replacements = Vec::new();
        let mut pending_parents = Vec::new();
        for raw in raw_terms {
            if let Err(e) = raw.validate() {
                tracing::warn!("skipping term: {}", e);
                continue;
            }
            let (Some(id), Some(name)) = (raw.id, raw.name) else {
                continue;
            };
            if raw.obsolete {
                if let Some(replaced_by) = raw.replaced_by {
                    replacements.push((id, replaced_by));
                }
                continue;
            }
            let idx = TermIdx(terms.len() as u32);
            if index.insert(id.clone(), idx).is_some() {
                tracing::warn!("duplicate term {}, keeping the last one", &id);
            }
            pending_parents.push(raw.parent_ids);
            terms.push(Term {
                id,
                name,
                alt_ids: raw.alt_ids,
                parents: Vec::new(),
                children: Vec::new(),
            });
        }

        // Alternative IDs never shadow canonical ones.
        for (i, term) in terms.iter().enumerate() {
            for alt_id in &term.alt_ids {
                index.entry(alt_id.clone()).or_insert(TermIdx(i as u32));
            }
        }
        for (obsolete_id, replaced_by) in replacements {
            match index.get(&replaced_by).copied() {
                Some(idx) => {
                    index.entry(obsolete_id).or_insert(idx);
                }
                None => tracing::warn!(
                    "obsolete term {} replaced by unknown term {}",
                    &obsolete_id,
                    &replaced_by
                ),
            }
        }

        for (i, parent_ids) in pending_parents.into_iter().enumerate() {
            let child = TermIdx(i as u32);
            for parent_id in parent_ids {
                match index.get(&parent_id).copied() {
                    Some(parent) if parent != child => {
                        if !terms[i].parents.contains(&parent) {
                            terms[i].parents.push(parent);
                            terms[parent.get()].children.push(child);
                        }
                    }
                    Some(_) => tracing::warn!("term {} is its own parent", &terms[i].id),
                    None => tracing::warn!(
                        "term {} has unknown parent {}",
                        &terms[i].id,
                        &parent_id
                    ),
                }
            }
        }

        let root = index
            .get(ROOT)
            .copied()
            .ok_or_else(|| Error::MissingRoot(ROOT.to_string()))?;
        let ancestors = Self::ancestor_closures(&terms);

        Ok(Self {
            terms,
            index,
            ancestors,
            root,
        })
    }

    /// Split the OBO data into `[Term]` stanzas; header and other stanzas are ignored.
    fn read_stanzas<R: BufRead>(reader: R) -> Result<Vec<RawTerm>, Error> {
        let mut result = Vec::new();
        let mut current: Option<RawTerm> = None;
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.starts_with('[') {
                result.extend(current.take());
                if line == "[Term]" {
                    current = Some(RawTerm {
                        line: lineno + 1,
                        ..Default::default()
                    });
                }
            } else if let Some(current) = current.as_mut() {
                if !line.is_empty() {
                    current.push_line(line);
                }
            }
        }
        result.extend(current);
        Ok(result)
    }

    /// Compute the ancestor closure of every term.
    fn ancestor_closures(terms: &[Term]) -> Vec<Vec<TermIdx>> {
        terms
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let mut seen = HashSet::new();
                let mut stack = vec![TermIdx(i as u32)];
                while let Some(idx) = stack.pop() {
                    if seen.insert(idx) {
                        stack.extend(terms[idx.get()].parents.iter().copied());
                    }
                }
                let mut closure = seen.into_iter().collect::<Vec<_>>();
                closure.sort();
                closure
            })
            .collect()
    }

    /// Resolve a canonical, alternative or replaced obsolete ID.
    pub fn lookup(&self, id: &str) -> Option<TermIdx> {
        self.index.get(id).copied()
    }

    /// Access a term by index.
    pub fn term(&self, idx: TermIdx) -> &Term {
        &self.terms[idx.get()]
    }

    /// The cached ancestor closure of the term, including the term itself.
    pub fn ancestors(&self, idx: TermIdx) -> &[TermIdx] {
        &self.ancestors[idx.get()]
    }

    /// Whether the term is connected to the root.
    pub fn is_rooted(&self, idx: TermIdx) -> bool {
        self.ancestors(idx).binary_search(&self.root).is_ok()
    }

    pub fn root(&self) -> TermIdx {
        self.root
    }

    /// Number of terms, not counting aliases.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Iterate over all term indices.
    pub fn iter(&self) -> impl Iterator<Item = TermIdx> {
        (0..self.terms.len() as u32).map(TermIdx)
    }

    /// Union of the ancestor closures of the given term IDs; unknown IDs are ignored.
    pub fn ancestors_of_all<'a, I>(&self, ids: I) -> HashSet<TermIdx>
    where
        I: IntoIterator<Item = &'a str>,
    {
        ids.into_iter()
            .filter_map(|id| self.lookup(id))
            .flat_map(|idx| self.ancestors(idx).iter().copied())
            .collect()
    }
}
