//! Paper acceptance: topic match, then author affiliation for a country

use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use oacrawl_core::PipelineError;
use rustc_hash::FxHashSet;

use crate::index::AffiliationIndex;
use crate::record::{PaperRecord, RecordParser};

/// Prefix of OpenAlex field URLs
pub const FIELD_URL_PREFIX: &str = "https://openalex.org/fields/";

/// Topic constraint, matched as a substring (not field-scoped). A field URL
/// must not be followed by another digit, so `fields/1` never hits
/// `fields/17`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicFilter {
    /// OpenAlex field, stored as its full URL. Always case-sensitive.
    Field(String),
    /// Free text; stored lower-cased unless case-sensitive
    Text { needle: String, case_sensitive: bool },
}

impl TopicFilter {
    /// Field filter from a bare id (`"17"`) or a full field URL
    pub fn field(id: &str) -> Self {
        let id = id.trim();
        if id.starts_with("http://") || id.starts_with("https://") {
            Self::Field(id.to_string())
        } else {
            Self::Field(format!("{FIELD_URL_PREFIX}{id}"))
        }
    }

    pub fn text(text: &str, case_sensitive: bool) -> Self {
        let needle = if case_sensitive {
            text.to_string()
        } else {
            text.chars().flat_map(char::to_lowercase).collect()
        };
        Self::Text {
            needle,
            case_sensitive,
        }
    }

    /// Substring test against `haystack`
    pub fn matches(&self, haystack: &str, parser: &mut RecordParser) -> bool {
        match self {
            Self::Field(url) => contains_field(haystack, url),
            Self::Text {
                needle,
                case_sensitive: true,
            } => haystack.contains(needle.as_str()),
            Self::Text {
                needle,
                case_sensitive: false,
            } => parser.lowercase(haystack).contains(needle.as_str()),
        }
    }
}

/// `url` occurs in `haystack` as a whole field id
fn contains_field(haystack: &str, url: &str) -> bool {
    haystack.match_indices(url).any(|(at, _)| {
        !haystack
            .as_bytes()
            .get(at + url.len())
            .is_some_and(u8::is_ascii_digit)
    })
}

/// What the topic needle is matched against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TopicScope {
    /// The whole raw line
    #[default]
    Record,
    /// Each extracted author id
    AuthorIds,
}

impl FromStr for TopicScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "record" => Ok(Self::Record),
            "author-ids" => Ok(Self::AuthorIds),
            other => Err(format!("unknown topic scope '{other}' (record|author-ids)")),
        }
    }
}

impl std::fmt::Display for TopicScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Record => f.write_str("record"),
            Self::AuthorIds => f.write_str("author-ids"),
        }
    }
}

/// Set of author ids eligible for the affiliation test
#[derive(Debug, Clone, Default)]
pub struct AuthorAllowlist {
    ids: FxHashSet<String>,
}

impl AuthorAllowlist {
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// One id per line; surrounding whitespace and blank lines are ignored
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                PipelineError::config(format!("allowlist {} does not exist", path.display()))
            } else {
                PipelineError::infra(format!("cannot read allowlist {}", path.display()), e)
            }
        })?;
        let list = Self::from_ids(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty()),
        );
        log::info!("Loaded {} allowed authors from {}", list.len(), path.display());
        Ok(list)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Everything a paper is tested against
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    /// ISO country code; `None` disables author-based rejection
    pub country_code: Option<String>,
    pub topic: Option<TopicFilter>,
    pub topic_scope: TopicScope,
    /// Only these authors are loaded into the index
    pub author_allowlist: Option<AuthorAllowlist>,
}

impl FilterCriteria {
    /// Country code if set and non-empty
    pub fn country(&self) -> Option<&str> {
        self.country_code.as_deref().filter(|c| !c.is_empty())
    }
}

/// Outcome of testing one paper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    TopicMismatch,
    NoAffiliatedAuthor,
}

/// Applies [`FilterCriteria`] to parsed papers. Shared read-only by all workers.
#[derive(Debug, Clone, Copy)]
pub struct PaperFilter<'a> {
    criteria: &'a FilterCriteria,
    index: Option<&'a AffiliationIndex>,
}

impl<'a> PaperFilter<'a> {
    /// A country filter needs an index to test against
    pub fn new(
        criteria: &'a FilterCriteria,
        index: Option<&'a AffiliationIndex>,
    ) -> Result<Self, PipelineError> {
        if criteria.country().is_some() && index.is_none() {
            return Err(PipelineError::config(
                "a country filter requires an affiliation index",
            ));
        }
        Ok(Self { criteria, index })
    }

    pub fn classify(&self, paper: &PaperRecord<'_>, parser: &mut RecordParser) -> Verdict {
        if let Some(topic) = &self.criteria.topic {
            let hit = match self.criteria.topic_scope {
                TopicScope::Record => topic.matches(paper.raw, parser),
                TopicScope::AuthorIds => paper
                    .author_ids
                    .iter()
                    .any(|id| topic.matches(id, parser)),
            };
            if !hit {
                return Verdict::TopicMismatch;
            }
        }

        if let (Some(country), Some(index)) = (self.criteria.country(), self.index) {
            let year = paper.publication_year;
            if !paper
                .author_ids
                .iter()
                .any(|id| index.affiliated(id, year, country))
            {
                return Verdict::NoAffiliatedAuthor;
            }
        }
        Verdict::Keep
    }

    pub fn decide(&self, paper: &PaperRecord<'_>, parser: &mut RecordParser) -> bool {
        self.classify(paper, parser) == Verdict::Keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AuthorAggregator;
    use tempfile::TempDir;

    fn index(lines: &[&str]) -> AffiliationIndex {
        let mut agg = AuthorAggregator::new(None, None);
        for l in lines {
            agg.merge_line(l);
        }
        agg.finish().0
    }

    fn criteria(country: Option<&str>, topic: Option<TopicFilter>) -> FilterCriteria {
        FilterCriteria {
            country_code: country.map(String::from),
            topic,
            ..Default::default()
        }
    }

    #[test]
    fn field_filter_builds_url() {
        assert_eq!(
            TopicFilter::field("17"),
            TopicFilter::Field("https://openalex.org/fields/17".into())
        );
        assert_eq!(
            TopicFilter::field(" https://openalex.org/fields/22 "),
            TopicFilter::Field("https://openalex.org/fields/22".into())
        );
    }

    #[test]
    fn text_filter_case_insensitive_anywhere() {
        let mut p = RecordParser::new();
        let topic = TopicFilter::text("Computer Science", false);
        let line = r#"{"title":"x","concepts":[{"display_name":"computer science"}]}"#;
        assert!(topic.matches(line, &mut p));
        // Not field-scoped: any occurrence counts
        assert!(topic.matches(r#"{"note":"COMPUTER SCIENCE dept"}"#, &mut p));
        assert!(!topic.matches(r#"{"title":"biology"}"#, &mut p));
    }

    #[test]
    fn text_filter_case_sensitive() {
        let mut p = RecordParser::new();
        let topic = TopicFilter::text("Computer Science", true);
        assert!(!topic.matches("computer science", &mut p));
        assert!(topic.matches("Computer Science", &mut p));
    }

    #[test]
    fn field_filter_is_case_sensitive() {
        let mut p = RecordParser::new();
        let topic = TopicFilter::field("17");
        assert!(topic.matches(r#"{"field":{"id":"https://openalex.org/fields/17"}}"#, &mut p));
        assert!(!topic.matches(r#"{"field":{"id":"HTTPS://OPENALEX.ORG/FIELDS/17"}}"#, &mut p));
    }

    #[test]
    fn field_filter_does_not_match_longer_ids() {
        let mut p = RecordParser::new();
        let topic = TopicFilter::field("1");
        let only_17 = r#"{"primary_topic":{"field":{"id":"https://openalex.org/fields/17"}}}"#;
        assert!(!topic.matches(only_17, &mut p));

        let both = r#"{"topics":[{"field":{"id":"https://openalex.org/fields/17"}},{"field":{"id":"https://openalex.org/fields/1"}}]}"#;
        assert!(topic.matches(both, &mut p));
        // Id at the very end of the haystack
        assert!(topic.matches("https://openalex.org/fields/1", &mut p));
        assert!(TopicFilter::field("17").matches(only_17, &mut p));
    }

    #[test]
    fn topic_scope_parsing() {
        assert_eq!("record".parse::<TopicScope>().unwrap(), TopicScope::Record);
        assert_eq!("author_ids".parse::<TopicScope>().unwrap(), TopicScope::AuthorIds);
        assert!("title".parse::<TopicScope>().is_err());
        assert_eq!(TopicScope::AuthorIds.to_string(), "author-ids");
    }

    #[test]
    fn country_absent_keeps_every_parsed_record() {
        let crit = criteria(None, None);
        let filter = PaperFilter::new(&crit, None).unwrap();
        let mut p = RecordParser::new();
        for line in ["{}", r#"{"publication_year":2020}"#] {
            let paper = p.parse_paper_line(line).unwrap();
            assert!(filter.decide(&paper, &mut p), "{line}");
        }
        // Lines that are not objects never produce a record to keep
        assert!(p.parse_paper_line("garbage").is_none());
    }

    #[test]
    fn country_requires_index() {
        let crit = criteria(Some("US"), None);
        assert!(matches!(
            PaperFilter::new(&crit, None),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn any_affiliated_author_keeps_paper() {
        let idx = index(&[
            r#"{"id":"A1","affs":{"2018":["FR"]}}"#,
            r#"{"id":"A2","affs":{"2018":["US"]}}"#,
        ]);
        let crit = criteria(Some("US"), None);
        let filter = PaperFilter::new(&crit, Some(&idx)).unwrap();
        let mut p = RecordParser::new();

        let both = p
            .parse_paper_line(
                r#"{"publication_year":2019,"authorships":[{"author":{"id":"A1"}},{"author":{"id":"A2"}}]}"#,
            )
            .unwrap();
        assert!(filter.decide(&both, &mut p));

        let only_fr = p
            .parse_paper_line(
                r#"{"publication_year":2018,"authorships":[{"author":{"id":"A1"}}]}"#,
            )
            .unwrap();
        assert_eq!(filter.classify(&only_fr, &mut p), Verdict::NoAffiliatedAuthor);

        let unknown = p
            .parse_paper_line(
                r#"{"publication_year":2018,"authorships":[{"author":{"id":"ZZ"}}]}"#,
            )
            .unwrap();
        assert!(!filter.decide(&unknown, &mut p));

        let no_year = p
            .parse_paper_line(r#"{"authorships":[{"author":{"id":"A2"}}]}"#)
            .unwrap();
        assert!(!filter.decide(&no_year, &mut p));
    }

    #[test]
    fn topic_checked_before_country() {
        let idx = index(&[r#"{"id":"A1","affs":{"2020":["US"]}}"#]);
        let crit = criteria(Some("US"), Some(TopicFilter::text("physics", false)));
        let filter = PaperFilter::new(&crit, Some(&idx)).unwrap();
        let mut p = RecordParser::new();
        let paper = p
            .parse_paper_line(
                r#"{"publication_year":2020,"title":"Biology","authorships":[{"author":{"id":"A1"}}]}"#,
            )
            .unwrap();
        assert_eq!(filter.classify(&paper, &mut p), Verdict::TopicMismatch);
    }

    #[test]
    fn author_id_scope_ignores_rest_of_line() {
        let crit = FilterCriteria {
            topic: Some(TopicFilter::text("a5", false)),
            topic_scope: TopicScope::AuthorIds,
            ..Default::default()
        };
        let filter = PaperFilter::new(&crit, None).unwrap();
        let mut p = RecordParser::new();
        let hit = p
            .parse_paper_line(
                r#"{"title":"nothing","authorships":[{"author":{"id":"https://openalex.org/A5"}}]}"#,
            )
            .unwrap();
        assert!(filter.decide(&hit, &mut p));
        let miss = p
            .parse_paper_line(
                r#"{"title":"a5 in title","authorships":[{"author":{"id":"https://openalex.org/A7"}}]}"#,
            )
            .unwrap();
        assert!(!filter.decide(&miss, &mut p));
    }

    #[test]
    fn allowlist_file_loading() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("allow.txt");
        fs::write(&path, "A1\n\n  A2  \r\nA1\n").unwrap();
        let list = AuthorAllowlist::load(&path).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.contains("A2"));
        assert!(!list.contains(""));

        let err = AuthorAllowlist::load(&dir.path().join("missing.txt")).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
