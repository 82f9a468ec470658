//! Per-author, per-year affiliation index with nearest-prior-year lookup

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::str::FromStr;

use memmap2::Mmap;
use oacrawl_core::PipelineError;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::aggregate::{AggregateStats, AuthorAggregator};
use crate::filter::AuthorAllowlist;
use crate::record::write_compressed_author;

/// Sparse year → country-code set for one author.
///
/// Country lists keep first-seen order and never contain duplicates. A year
/// entry is only created by an insert, so it is never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AuthorTimeline {
    years: BTreeMap<i32, Vec<String>>,
}

impl AuthorTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `country` to `year`. Returns false if it was already present.
    pub fn insert(&mut self, year: i32, country: &str) -> bool {
        let set = self.years.entry(year).or_default();
        if set.iter().any(|c| c == country) {
            return false;
        }
        set.push(country.to_string());
        true
    }

    /// Union another timeline into this one
    pub fn merge(&mut self, other: &AuthorTimeline) {
        for (&year, countries) in &other.years {
            for c in countries {
                self.insert(year, c);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    /// Number of distinct years with data
    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn countries(&self, year: i32) -> Option<&[String]> {
        self.years.get(&year).map(Vec::as_slice)
    }

    pub fn max_year(&self) -> Option<i32> {
        self.years.keys().next_back().copied()
    }

    /// Whether the author counts as affiliated with `country` in `year`.
    ///
    /// An exact-year hit on the country passes. Otherwise the nearest
    /// earlier year with any data decides, even when the exact year exists
    /// without the country.
    pub fn affiliated(&self, year: i32, country: &str) -> bool {
        if year <= 0 {
            return false;
        }
        let Some(max) = self.max_year() else {
            return false;
        };
        if year > max {
            return false;
        }
        if self
            .years
            .get(&year)
            .is_some_and(|c| c.iter().any(|x| x == country))
        {
            return true;
        }
        self.years
            .range(0..year)
            .next_back()
            .is_some_and(|(_, c)| c.iter().any(|x| x == country))
    }
}

/// How to read a compressed-authors file into memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IndexLoad {
    /// Map the file and parse line slices in place
    #[default]
    Mmap,
    /// Read line by line through a buffered reader
    Stream,
}

impl FromStr for IndexLoad {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mmap" => Ok(Self::Mmap),
            "stream" => Ok(Self::Stream),
            other => Err(format!("unknown index load mode '{other}' (mmap|stream)")),
        }
    }
}

impl std::fmt::Display for IndexLoad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mmap => f.write_str("mmap"),
            Self::Stream => f.write_str("stream"),
        }
    }
}

/// author id → timeline. Read-only once built.
#[derive(Debug, Default)]
pub struct AffiliationIndex {
    authors: FxHashMap<String, AuthorTimeline>,
}

impl AffiliationIndex {
    pub(crate) fn from_map(authors: FxHashMap<String, AuthorTimeline>) -> Self {
        Self { authors }
    }

    pub fn get(&self, author_id: &str) -> Option<&AuthorTimeline> {
        self.authors.get(author_id)
    }

    pub fn contains(&self, author_id: &str) -> bool {
        self.authors.contains_key(author_id)
    }

    /// Number of authors, including ones without any affiliation data
    pub fn len(&self) -> usize {
        self.authors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
    }

    /// Affiliation test for one `(author, year)`; unknown authors fail
    pub fn affiliated(&self, author_id: &str, year: i32, country: &str) -> bool {
        self.get(author_id)
            .is_some_and(|t| t.affiliated(year, country))
    }

    /// Serialize every non-empty author, one compressed line each, sorted by
    /// id. Returns the number of lines written.
    pub fn write_compressed<W: Write>(&self, out: &mut W) -> io::Result<usize> {
        let mut ids: Vec<&String> = self
            .authors
            .iter()
            .filter(|(_, t)| !t.is_empty())
            .map(|(id, _)| id)
            .collect();
        ids.sort_unstable();

        for id in &ids {
            write_compressed_author(out, id, &self.authors[id.as_str()])?;
        }
        out.flush()?;
        Ok(ids.len())
    }

    /// Load a compressed-authors file.
    ///
    /// Lines without `country` (when set) and authors outside `allowlist`
    /// are skipped. A missing or empty file is a configuration error.
    pub fn load(
        path: &Path,
        mode: IndexLoad,
        country: Option<&str>,
        allowlist: Option<&AuthorAllowlist>,
    ) -> Result<(Self, AggregateStats), PipelineError> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                PipelineError::config(format!("index file {} does not exist", path.display()))
            } else {
                PipelineError::infra(format!("cannot open index {}", path.display()), e)
            }
        })?;
        let len = file
            .metadata()
            .map_err(|e| PipelineError::infra(format!("cannot stat {}", path.display()), e))?
            .len();
        if len == 0 {
            return Err(PipelineError::config(format!(
                "index file {} is empty",
                path.display()
            )));
        }

        let mut agg = AuthorAggregator::new(country, allowlist);
        match mode {
            IndexLoad::Mmap => {
                // SAFETY: read-only mapping; the index file is not written during a papers run
                let mmap = unsafe { Mmap::map(&file) }
                    .map_err(|e| PipelineError::infra(format!("cannot map {}", path.display()), e))?;
                agg.merge_bytes(&mmap);
            }
            IndexLoad::Stream => {
                agg.merge_reader(BufReader::new(file))
                    .map_err(|e| PipelineError::infra(format!("cannot read {}", path.display()), e))?;
            }
        }

        let (index, stats) = agg.finish();
        log::info!(
            "Loaded index {} ({mode}): {} authors from {} lines ({} filtered, {} malformed)",
            path.display(),
            index.len(),
            stats.lines,
            stats.filtered,
            stats.malformed
        );
        Ok((index, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn timeline(entries: &[(i32, &[&str])]) -> AuthorTimeline {
        let mut t = AuthorTimeline::new();
        for (year, countries) in entries {
            for c in *countries {
                t.insert(*year, c);
            }
        }
        t
    }

    #[test]
    fn insert_has_set_semantics() {
        let mut t = AuthorTimeline::new();
        assert!(t.insert(2020, "US"));
        assert!(!t.insert(2020, "US"));
        assert!(t.insert(2020, "FR"));
        assert_eq!(t.countries(2020).unwrap(), ["US", "FR"]);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn fallback_table() {
        let t = timeline(&[(2018, &["US"]), (2020, &["FR"])]);
        let cases = [
            (2019, "US", true),
            (2019, "FR", false),
            (2018, "US", true),
            (2020, "FR", true),
            // Exact year exists without US: nearest earlier year decides
            (2020, "US", true),
            (2017, "US", false),
            (2017, "FR", false),
            (2021, "FR", false),
            (0, "US", false),
            (-5, "US", false),
        ];
        for (year, country, want) in cases {
            assert_eq!(t.affiliated(year, country), want, "{year} {country}");
        }
    }

    #[test]
    fn negative_years_are_never_used_for_fallback() {
        // -1 marks a malformed year in the source data
        let t = timeline(&[(-1, &["US"]), (2020, &["FR"])]);
        assert!(!t.affiliated(2019, "US"));
        assert!(!t.affiliated(2020, "US"));
    }

    #[test]
    fn empty_timeline_never_affiliated() {
        let t = AuthorTimeline::new();
        assert!(!t.affiliated(2020, "US"));
        assert_eq!(t.max_year(), None);
    }

    #[test]
    fn merge_unions_countries() {
        let mut a = timeline(&[(2019, &["US"])]);
        let b = timeline(&[(2019, &["US", "DE"]), (2021, &["FR"])]);
        a.merge(&b);
        assert_eq!(a.countries(2019).unwrap(), ["US", "DE"]);
        assert_eq!(a.countries(2021).unwrap(), ["FR"]);
    }

    #[test]
    fn write_compressed_skips_empty_and_sorts() {
        let mut map = FxHashMap::default();
        map.insert("B".to_string(), timeline(&[(2020, &["FR"]), (2019, &["US"])]));
        map.insert("A".to_string(), timeline(&[(2001, &["DE"])]));
        map.insert("E".to_string(), AuthorTimeline::new());
        let index = AffiliationIndex::from_map(map);
        assert_eq!(index.len(), 3);

        let mut out = Vec::new();
        assert_eq!(index.write_compressed(&mut out).unwrap(), 2);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "{\"id\":\"A\",\"affs\":{\"2001\":[\"DE\"]}}\n\
             {\"id\":\"B\",\"affs\":{\"2019\":[\"US\"],\"2020\":[\"FR\"]}}\n"
        );
    }

    #[test]
    fn index_load_mode_parsing() {
        assert_eq!("mmap".parse::<IndexLoad>().unwrap(), IndexLoad::Mmap);
        assert_eq!("STREAM".parse::<IndexLoad>().unwrap(), IndexLoad::Stream);
        assert!("disk".parse::<IndexLoad>().is_err());
        assert_eq!(IndexLoad::default().to_string(), "mmap");
    }

    fn write_index(dir: &TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("authors_compressed.jsonl");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn load_both_modes_agree() {
        let dir = TempDir::new().unwrap();
        let path = write_index(
            &dir,
            "{\"id\":\"A1\",\"affs\":{\"2019\":[\"US\"],\"2020\":[\"US\"]}}\n\
             {\"id\":\"A2\",\"affs\":{\"2015\":[\"FR\"]}}\n\
             not json\n",
        );
        for mode in [IndexLoad::Mmap, IndexLoad::Stream] {
            let (index, stats) = AffiliationIndex::load(&path, mode, None, None).unwrap();
            assert_eq!(index.len(), 2, "{mode}");
            assert_eq!(stats.malformed, 1, "{mode}");
            assert!(index.affiliated("A1", 2020, "US"));
            assert!(index.affiliated("A2", 2016, "FR"));
        }
    }

    #[test]
    fn load_with_country_drops_unrelated_authors() {
        let dir = TempDir::new().unwrap();
        let path = write_index(
            &dir,
            "{\"id\":\"A1\",\"affs\":{\"2019\":[\"US\"]}}\n\
             {\"id\":\"A2\",\"affs\":{\"2015\":[\"FR\"]}}\n",
        );
        let (index, stats) =
            AffiliationIndex::load(&path, IndexLoad::Stream, Some("US"), None).unwrap();
        assert!(index.contains("A1"));
        assert!(!index.contains("A2"));
        assert_eq!(stats.filtered, 1);
    }

    #[test]
    fn load_empty_or_missing_is_config_error() {
        let dir = TempDir::new().unwrap();
        let empty = write_index(&dir, "");
        let err = AffiliationIndex::load(&empty, IndexLoad::Mmap, None, None).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));

        let missing = dir.path().join("nope.jsonl");
        let err = AffiliationIndex::load(&missing, IndexLoad::Stream, None, None).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
