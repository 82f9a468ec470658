//! Fold compressed-author lines into an [`AffiliationIndex`]

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use rustc_hash::FxHashMap;

use crate::filter::AuthorAllowlist;
use crate::index::{AffiliationIndex, AuthorTimeline};
use crate::record::parse_compressed_author_line;

const READ_BUF_SIZE: usize = 256 * 1024;

/// Counters from one aggregation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    /// Non-blank lines seen
    pub lines: usize,
    /// Skipped by the country pre-filter or the allowlist
    pub filtered: usize,
    /// Not a compressed-author object
    pub malformed: usize,
    /// Lines folded into the index
    pub merged: usize,
}

/// Builds an index from compressed lines, merging repeated authors.
///
/// With a country set, lines that do not contain `"CC"` anywhere are
/// dropped before parsing. This is a raw substring test: it keeps every
/// line that could possibly pass a later affiliation check for that
/// country.
#[derive(Debug)]
pub struct AuthorAggregator<'a> {
    needle: Option<String>,
    allowlist: Option<&'a AuthorAllowlist>,
    authors: FxHashMap<String, AuthorTimeline>,
    stats: AggregateStats,
}

impl<'a> AuthorAggregator<'a> {
    pub fn new(country: Option<&str>, allowlist: Option<&'a AuthorAllowlist>) -> Self {
        Self {
            needle: country
                .filter(|c| !c.is_empty())
                .map(|c| format!("\"{c}\"")),
            allowlist,
            authors: FxHashMap::default(),
            stats: AggregateStats::default(),
        }
    }

    pub fn merge_line(&mut self, line: &str) {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            return;
        }
        self.stats.lines += 1;

        if let Some(needle) = &self.needle {
            if !line.contains(needle.as_str()) {
                self.stats.filtered += 1;
                return;
            }
        }

        let Some(author) = parse_compressed_author_line(line) else {
            self.stats.malformed += 1;
            return;
        };

        if let Some(allow) = self.allowlist {
            if !allow.contains(&author.id) {
                self.stats.filtered += 1;
                return;
            }
        }

        self.stats.merged += 1;
        match self.authors.get_mut(&author.id) {
            Some(existing) => existing.merge(&author.timeline),
            None => {
                self.authors.insert(author.id, author.timeline);
            }
        }
    }

    /// Feed a whole in-memory buffer (e.g. a mapped file)
    pub fn merge_bytes(&mut self, bytes: &[u8]) {
        for chunk in bytes.split(|&b| b == b'\n') {
            match std::str::from_utf8(chunk) {
                Ok(line) => self.merge_line(line),
                Err(_) => {
                    self.stats.lines += 1;
                    self.stats.malformed += 1;
                }
            }
        }
    }

    pub fn merge_reader<R: BufRead>(&mut self, mut reader: R) -> io::Result<()> {
        let mut buf = Vec::with_capacity(4096);
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            self.merge_bytes(&buf);
        }
    }

    pub fn merge_file(&mut self, path: &Path) -> io::Result<()> {
        let file = File::open(path)?;
        self.merge_reader(BufReader::with_capacity(READ_BUF_SIZE, file))
    }

    pub fn stats(&self) -> &AggregateStats {
        &self.stats
    }

    pub fn finish(self) -> (AffiliationIndex, AggregateStats) {
        (AffiliationIndex::from_map(self.authors), self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn dedups_across_lines() {
        let mut agg = AuthorAggregator::new(None, None);
        agg.merge_line(r#"{"id":"A1","affs":{"2019":["US"]}}"#);
        agg.merge_line(r#"{"id":"A1","affs":{"2019":["US","FR"],"2020":["US"]}}"#);
        let (index, stats) = agg.finish();
        assert_eq!(index.len(), 1);
        let t = index.get("A1").unwrap();
        assert_eq!(t.countries(2019).unwrap(), ["US", "FR"]);
        assert_eq!(t.countries(2020).unwrap(), ["US"]);
        assert_eq!(stats.merged, 2);
    }

    #[test]
    fn country_prefilter_is_raw_substring() {
        let mut agg = AuthorAggregator::new(Some("US"), None);
        agg.merge_line(r#"{"id":"A1","affs":{"2019":["US"]}}"#);
        agg.merge_line(r#"{"id":"A2","affs":{"2019":["FR"]}}"#);
        // Quoted "US" elsewhere in the line still passes the pre-filter
        agg.merge_line(r#"{"id":"US","affs":{"2019":["DE"]}}"#);
        let (index, stats) = agg.finish();
        assert!(index.contains("A1"));
        assert!(!index.contains("A2"));
        assert!(index.contains("US"));
        assert_eq!(stats.filtered, 1);
    }

    #[test]
    fn allowlist_restricts_authors() {
        let allow = AuthorAllowlist::from_ids(["A2"]);
        let mut agg = AuthorAggregator::new(None, Some(&allow));
        agg.merge_line(r#"{"id":"A1","affs":{"2019":["US"]}}"#);
        agg.merge_line(r#"{"id":"A2","affs":{"2019":["US"]}}"#);
        let (index, _) = agg.finish();
        assert!(!index.contains("A1"));
        assert!(index.contains("A2"));
    }

    #[test]
    fn empty_authors_retained_but_not_serialized() {
        let mut agg = AuthorAggregator::new(None, None);
        agg.merge_line(r#"{"id":"E","affs":{}}"#);
        agg.merge_line(r#"{"id":"A","affs":{"2000":["US"]}}"#);
        let (index, _) = agg.finish();
        assert_eq!(index.len(), 2);
        let mut out = Vec::new();
        assert_eq!(index.write_compressed(&mut out).unwrap(), 1);
        assert!(!String::from_utf8(out).unwrap().contains("\"E\""));
    }

    #[test]
    fn reader_handles_crlf_blank_and_invalid_utf8() {
        let mut data = b"{\"id\":\"A\",\"affs\":{\"2001\":[\"US\"]}}\r\n\n".to_vec();
        data.extend_from_slice(b"\xff\xfe\n");
        data.extend_from_slice(b"{\"id\":\"B\",\"affs\":{\"2002\":[\"FR\"]}}");
        let mut agg = AuthorAggregator::new(None, None);
        agg.merge_reader(Cursor::new(data)).unwrap();
        assert_eq!(agg.stats().lines, 3);
        assert_eq!(agg.stats().malformed, 1);
        let (index, _) = agg.finish();
        assert!(index.affiliated("A", 2001, "US"));
        assert!(index.affiliated("B", 2002, "FR"));
    }

    #[test]
    fn empty_country_means_no_prefilter() {
        let mut agg = AuthorAggregator::new(Some(""), None);
        agg.merge_line(r#"{"id":"A2","affs":{"2019":["FR"]}}"#);
        assert_eq!(agg.stats().filtered, 0);
        assert_eq!(agg.stats().merged, 1);
    }
}
