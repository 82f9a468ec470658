//! Descriptive statistics over a set of papers.
//!
//! Every worker folds its papers into a [`DatasetCounts`]; the runner merges
//! them and writes one CSV per distribution.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::record::WorkDetail;

/// `<year>,<papers>`
pub const PAPERS_PER_YEAR: &str = "papers_per_year.csv";
/// `<year>,<distinct authors>`
pub const ACTIVE_AUTHORS_PER_YEAR: &str = "active_authors_per_year.csv";
/// `<papers>,<authors with that many papers>`
pub const PAPERS_PER_AUTHOR: &str = "papers_per_author.csv";
/// `<authorships>,<papers with that many authorships>`
pub const AUTHORS_PER_PAPER: &str = "authors_per_paper.csv";
/// `<topic>,<papers>`
pub const PAPERS_PER_TOPIC: &str = "papers_per_topic.csv";

/// Aggregates for one batch of papers
#[derive(Debug, Default)]
pub struct DatasetCounts {
    pub papers: u64,
    pub papers_per_year: FxHashMap<i32, u64>,
    pub authors_per_year: FxHashMap<i32, FxHashSet<String>>,
    pub papers_per_author: FxHashMap<String, u64>,
    /// Histogram of `authorships[]` length
    pub authors_per_paper: FxHashMap<usize, u64>,
    pub papers_per_topic: FxHashMap<String, u64>,
}

impl DatasetCounts {
    /// Count one paper published in `year`
    pub fn add(&mut self, paper: &WorkDetail<'_>, year: i32) {
        self.papers += 1;
        *self.papers_per_year.entry(year).or_insert(0) += 1;
        *self.authors_per_paper.entry(paper.authorships).or_insert(0) += 1;

        let active = self.authors_per_year.entry(year).or_default();
        for author in &paper.author_ids {
            if !active.contains(&**author) {
                active.insert(author.to_string());
            }
            match self.papers_per_author.get_mut(&**author) {
                Some(n) => *n += 1,
                None => {
                    self.papers_per_author.insert(author.to_string(), 1);
                }
            }
        }
        for topic in &paper.topics {
            match self.papers_per_topic.get_mut(&**topic) {
                Some(n) => *n += 1,
                None => {
                    self.papers_per_topic.insert(topic.to_string(), 1);
                }
            }
        }
    }

    /// Fold `other` into `self`
    pub fn merge(&mut self, other: Self) {
        self.papers += other.papers;
        for (year, n) in other.papers_per_year {
            *self.papers_per_year.entry(year).or_insert(0) += n;
        }
        for (year, authors) in other.authors_per_year {
            self.authors_per_year.entry(year).or_default().extend(authors);
        }
        for (author, n) in other.papers_per_author {
            *self.papers_per_author.entry(author).or_insert(0) += n;
        }
        for (len, n) in other.authors_per_paper {
            *self.authors_per_paper.entry(len).or_insert(0) += n;
        }
        for (topic, n) in other.papers_per_topic {
            *self.papers_per_topic.entry(topic).or_insert(0) += n;
        }
    }

    /// Write every distribution into `dir` (created if needed). Numeric keys
    /// ascend; topics go by count, then name.
    pub fn write_csvs(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();

        let mut by_year: Vec<_> = self.papers_per_year.iter().collect();
        by_year.sort_unstable();
        written.push(write_csv(dir, PAPERS_PER_YEAR, "year,papers", by_year)?);

        let mut active: Vec<_> = self
            .authors_per_year
            .iter()
            .map(|(year, a)| (year, a.len()))
            .collect();
        active.sort_unstable();
        written.push(write_csv(
            dir,
            ACTIVE_AUTHORS_PER_YEAR,
            "year,active_authors",
            active,
        )?);

        let mut histogram: FxHashMap<u64, u64> = FxHashMap::default();
        for n in self.papers_per_author.values() {
            *histogram.entry(*n).or_insert(0) += 1;
        }
        let mut histogram: Vec<_> = histogram.into_iter().collect();
        histogram.sort_unstable();
        written.push(write_csv(dir, PAPERS_PER_AUTHOR, "papers,authors", histogram)?);

        let mut per_paper: Vec<_> = self.authors_per_paper.iter().collect();
        per_paper.sort_unstable();
        written.push(write_csv(dir, AUTHORS_PER_PAPER, "authors,papers", per_paper)?);

        let mut topics: Vec<_> = self
            .papers_per_topic
            .iter()
            .map(|(t, n)| (t.replace(',', " "), *n))
            .collect();
        topics.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        written.push(write_csv(dir, PAPERS_PER_TOPIC, "topic,papers", topics)?);

        Ok(written)
    }
}

fn write_csv<K, V>(
    dir: &Path,
    name: &str,
    header: &str,
    rows: impl IntoIterator<Item = (K, V)>,
) -> io::Result<PathBuf>
where
    K: std::fmt::Display,
    V: std::fmt::Display,
{
    let path = dir.join(name);
    let mut out = BufWriter::new(File::create(&path)?);
    writeln!(out, "{header}")?;
    for (k, v) in rows {
        writeln!(out, "{k},{v}")?;
    }
    out.flush()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use tempfile::TempDir;

    fn paper<'a>(authors: &[&'a str], authorships: usize, topics: &[&'a str]) -> WorkDetail<'a> {
        WorkDetail {
            paper_id: Cow::Borrowed("W"),
            publication_year: None,
            authorships,
            author_ids: authors.iter().map(|a| Cow::Borrowed(*a)).collect(),
            topics: topics.iter().map(|t| Cow::Borrowed(*t)).collect(),
        }
    }

    fn sample() -> DatasetCounts {
        let mut a = DatasetCounts::default();
        a.add(&paper(&["A1", "A2"], 2, &["Physics"]), 2020);
        a.add(&paper(&["A1"], 2, &["Physics", "Optics, applied"]), 2020);
        let mut b = DatasetCounts::default();
        b.add(&paper(&["A1", "A3"], 2, &["Biology"]), 2019);
        b.add(&paper(&[], 0, &[]), 2021);
        a.merge(b);
        a
    }

    #[test]
    fn add_and_merge() {
        let c = sample();
        assert_eq!(c.papers, 4);
        assert_eq!(c.papers_per_year[&2020], 2);
        assert_eq!(c.authors_per_year[&2020].len(), 2);
        assert!(c.authors_per_year[&2021].is_empty());
        assert_eq!(c.papers_per_author["A1"], 3);
        assert_eq!(c.authors_per_paper[&2], 3);
        assert_eq!(c.authors_per_paper[&0], 1);
        assert_eq!(c.papers_per_topic["Physics"], 2);
    }

    #[test]
    fn csvs_are_sorted() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("stats");
        let files = sample().write_csvs(&out).unwrap();
        assert_eq!(files.len(), 5);

        let read = |name: &str| fs::read_to_string(out.join(name)).unwrap();
        assert_eq!(read(PAPERS_PER_YEAR), "year,papers\n2019,1\n2020,2\n2021,1\n");
        assert_eq!(
            read(ACTIVE_AUTHORS_PER_YEAR),
            "year,active_authors\n2019,2\n2020,2\n2021,0\n"
        );
        // A1: 3 papers, A2 and A3: 1 each
        assert_eq!(read(PAPERS_PER_AUTHOR), "papers,authors\n1,2\n3,1\n");
        assert_eq!(read(AUTHORS_PER_PAPER), "authors,papers\n0,1\n2,3\n");
        assert_eq!(
            read(PAPERS_PER_TOPIC),
            "topic,papers\nPhysics,2\nBiology,1\nOptics  applied,1\n"
        );
    }
}
