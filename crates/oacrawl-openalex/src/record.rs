//! Best-effort field extraction from OpenAlex author and work lines.
//!
//! Lines are parsed with sonic-rs into probe structs that name only the
//! fields we need; everything else is skipped without building a tree.
//! Wrong-typed values degrade to "absent" instead of failing the line.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::marker::PhantomData;

use serde::de::value::MapAccessDeserializer;
use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::index::AuthorTimeline;

/// Author id used when a line has no usable `id`
pub const MISSING_AUTHOR_ID: &str = "not found";

/// Country used for affiliations without an institution country
pub const NO_INSTITUTION: &str = "No institution found";

/// Year used for non-integer entries of `years[]`
pub const INVALID_YEAR: i32 = -1;

// === Lenient scalar wrappers ===

/// String if the JSON value is a string, otherwise absent
#[derive(Debug, Default)]
struct LenientStr<'a>(Option<Cow<'a, str>>);

/// Integer if the JSON value is an integer, otherwise absent
#[derive(Debug, Default)]
struct LenientInt(Option<i64>);

/// Object deserialized as `T`, or absent for any other JSON value
#[derive(Debug)]
struct Lenient<T>(Option<T>);

/// Elements of a JSON array, each read as `T`; non-arrays are empty
#[derive(Debug)]
struct LenientList<T>(Vec<T>);

impl<T> Default for Lenient<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> Default for LenientList<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

struct LenientStrVisitor<'a>(PhantomData<&'a ()>);

impl<'de: 'a, 'a> Visitor<'de> for LenientStrVisitor<'a> {
    type Value = LenientStr<'a>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_borrowed_str<E: de::Error>(self, v: &'de str) -> Result<Self::Value, E> {
        Ok(LenientStr(Some(Cow::Borrowed(v))))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(LenientStr(Some(Cow::Owned(v.to_owned()))))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(LenientStr(Some(Cow::Owned(v))))
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
        Ok(LenientStr(None))
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<Self::Value, E> {
        Ok(LenientStr(None))
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<Self::Value, E> {
        Ok(LenientStr(None))
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<Self::Value, E> {
        Ok(LenientStr(None))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(LenientStr(None))
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(LenientStr(None))
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
        d.deserialize_any(self)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(LenientStr(None))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(LenientStr(None))
    }
}

impl<'de: 'a, 'a> Deserialize<'de> for LenientStr<'a> {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_any(LenientStrVisitor(PhantomData))
    }
}

struct LenientIntVisitor;

impl<'de> Visitor<'de> for LenientIntVisitor {
    type Value = LenientInt;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(LenientInt(Some(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(LenientInt(i64::try_from(v).ok()))
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<Self::Value, E> {
        Ok(LenientInt(None))
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
        Ok(LenientInt(None))
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<Self::Value, E> {
        Ok(LenientInt(None))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(LenientInt(None))
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(LenientInt(None))
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
        d.deserialize_any(self)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(LenientInt(None))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(LenientInt(None))
    }
}

impl<'de> Deserialize<'de> for LenientInt {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_any(LenientIntVisitor)
    }
}

impl LenientInt {
    /// Value as a year, `fallback` when absent or out of `i32` range
    fn year_or(&self, fallback: i32) -> i32 {
        self.0
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(fallback)
    }
}

/// Visitor methods mapping every scalar and null to the default value
macro_rules! ignore_other_shapes {
    ($value:ty) => {
        fn visit_bool<E: de::Error>(self, _: bool) -> Result<$value, E> {
            Ok(Default::default())
        }

        fn visit_i64<E: de::Error>(self, _: i64) -> Result<$value, E> {
            Ok(Default::default())
        }

        fn visit_u64<E: de::Error>(self, _: u64) -> Result<$value, E> {
            Ok(Default::default())
        }

        fn visit_f64<E: de::Error>(self, _: f64) -> Result<$value, E> {
            Ok(Default::default())
        }

        fn visit_str<E: de::Error>(self, _: &str) -> Result<$value, E> {
            Ok(Default::default())
        }

        fn visit_unit<E: de::Error>(self) -> Result<$value, E> {
            Ok(Default::default())
        }

        fn visit_none<E: de::Error>(self) -> Result<$value, E> {
            Ok(Default::default())
        }
    };
}

struct LenientVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for LenientVisitor<T> {
    type Value = Lenient<T>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any JSON value")
    }

    ignore_other_shapes!(Lenient<T>);

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
        d.deserialize_any(self)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Lenient(None))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        T::deserialize(MapAccessDeserializer::new(map)).map(|v| Lenient(Some(v)))
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Lenient<T> {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_any(LenientVisitor(PhantomData))
    }
}

struct LenientListVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for LenientListVisitor<T> {
    type Value = LenientList<T>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any JSON value")
    }

    ignore_other_shapes!(LenientList<T>);

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
        d.deserialize_any(self)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(v) = seq.next_element::<T>()? {
            out.push(v);
        }
        Ok(LenientList(out))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(LenientList::default())
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for LenientList<T> {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_any(LenientListVisitor(PhantomData))
    }
}

impl<T> Lenient<T> {
    fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }
}

impl<T> LenientList<Lenient<T>> {
    /// Elements that were objects of the expected shape
    fn objects(&self) -> impl Iterator<Item = &T> {
        self.0.iter().filter_map(Lenient::get)
    }
}

impl<'a> LenientList<LenientStr<'a>> {
    /// String elements, in order
    fn strings(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|s| s.0.as_deref())
    }
}

// === Probes (deserialized from JSON) ===

#[derive(Debug, Deserialize)]
struct AuthorProbe<'a> {
    #[serde(default, borrow)]
    id: LenientStr<'a>,
    #[serde(default, borrow)]
    affiliations: LenientList<Lenient<AffiliationProbe<'a>>>,
}

#[derive(Debug, Deserialize)]
struct AffiliationProbe<'a> {
    #[serde(default, borrow)]
    institution: Lenient<InstitutionProbe<'a>>,
    #[serde(default)]
    years: LenientList<LenientInt>,
}

#[derive(Debug, Deserialize)]
struct InstitutionProbe<'a> {
    #[serde(default, borrow)]
    country_code: LenientStr<'a>,
}

#[derive(Debug, Deserialize)]
struct WorkProbe<'a> {
    #[serde(default, borrow)]
    id: LenientStr<'a>,
    #[serde(default)]
    publication_year: LenientInt,
    #[serde(default, borrow)]
    authorships: LenientList<Lenient<AuthorshipProbe<'a>>>,
}

#[derive(Debug, Deserialize)]
struct AuthorshipProbe<'a> {
    #[serde(default, borrow)]
    author: Lenient<AuthorRefProbe<'a>>,
}

#[derive(Debug, Deserialize)]
struct AuthorRefProbe<'a> {
    #[serde(default, borrow)]
    id: LenientStr<'a>,
}

/// [`WorkProbe`] plus concept names, for the graph and dataset passes
#[derive(Debug, Deserialize)]
struct WorkDetailProbe<'a> {
    #[serde(default, borrow)]
    id: LenientStr<'a>,
    #[serde(default)]
    publication_year: LenientInt,
    #[serde(default, borrow)]
    authorships: LenientList<Lenient<AuthorshipProbe<'a>>>,
    #[serde(default, borrow)]
    concepts: LenientList<Lenient<ConceptProbe<'a>>>,
}

#[derive(Debug, Deserialize)]
struct ConceptProbe<'a> {
    #[serde(default, borrow)]
    display_name: LenientStr<'a>,
}

#[derive(Debug, Deserialize)]
struct CompressedProbe<'a> {
    #[serde(borrow)]
    id: Cow<'a, str>,
    #[serde(default, borrow)]
    affs: Lenient<BTreeMap<Cow<'a, str>, LenientList<LenientStr<'a>>>>,
}

#[derive(Serialize)]
struct CompressedLine<'a> {
    id: &'a str,
    affs: &'a AuthorTimeline,
}

// === Records ===

/// One author line: id plus a `(country, year)` pair per institution-year
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorAffiliationRecord {
    pub author_id: String,
    pub pairs: Vec<(String, i32)>,
}

impl AuthorAffiliationRecord {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Group pairs by year with set semantics
    pub fn timeline(&self) -> AuthorTimeline {
        let mut t = AuthorTimeline::new();
        for (country, year) in &self.pairs {
            t.insert(*year, country);
        }
        t
    }

    /// Write this record as one compressed-author line
    pub fn write_compressed<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_compressed_author(out, &self.author_id, &self.timeline())
    }
}

/// Fields of a work line needed for filtering, borrowing from the line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperRecord<'a> {
    /// Empty when absent
    pub paper_id: Cow<'a, str>,
    /// 0 when absent or not an integer
    pub publication_year: i32,
    /// In authorship order, duplicates kept
    pub author_ids: Vec<Cow<'a, str>>,
    /// The untouched input line
    pub raw: &'a str,
}

/// Work fields used by the graph and dataset passes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDetail<'a> {
    /// Empty when absent
    pub paper_id: Cow<'a, str>,
    /// `None` when absent or not an integer
    pub publication_year: Option<i32>,
    /// Number of `authorships[]` entries, with or without an author id
    pub authorships: usize,
    pub author_ids: Vec<Cow<'a, str>>,
    /// `concepts[].display_name`, in order
    pub topics: Vec<Cow<'a, str>>,
}

/// One line of a compressed-authors file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressedAuthor {
    pub id: String,
    pub timeline: AuthorTimeline,
}

/// Write `{"id":..,"affs":{"<year>":[..],..}}` plus newline
pub fn write_compressed_author<W: Write>(
    out: &mut W,
    id: &str,
    timeline: &AuthorTimeline,
) -> io::Result<()> {
    serde_json::to_writer(&mut *out, &CompressedLine { id, affs: timeline })?;
    out.write_all(b"\n")
}

/// Parse one compressed-author line.
///
/// Non-integer year keys and non-string countries are skipped. `None` when
/// the line is not an object with a string `id`.
pub fn parse_compressed_author_line(line: &str) -> Option<CompressedAuthor> {
    let probe: CompressedProbe = sonic_rs::from_str(line).ok()?;
    let mut timeline = AuthorTimeline::new();
    for (year, countries) in probe.affs.0.iter().flatten() {
        let Ok(year) = year.trim().parse::<i32>() else {
            continue;
        };
        for c in countries.strings() {
            timeline.insert(year, c);
        }
    }
    Some(CompressedAuthor {
        id: probe.id.into_owned(),
        timeline,
    })
}

/// Struct probes would also accept a JSON array of field values
fn is_object(line: &str) -> bool {
    line.trim_start().starts_with('{')
}

fn author_ids<'a>(authorships: LenientList<Lenient<AuthorshipProbe<'a>>>) -> Vec<Cow<'a, str>> {
    authorships
        .0
        .into_iter()
        .filter_map(|a| a.0.and_then(|a| a.author.0).and_then(|r| r.id.0))
        .collect()
}

/// Per-worker parser. Construct once per worker and reuse for every line.
#[derive(Debug, Default)]
pub struct RecordParser {
    lower: String,
}

impl RecordParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract the author id and affiliation pairs. Never fails: a line
    /// that does not parse yields the sentinel id and no pairs.
    pub fn parse_author_line(&mut self, line: &str) -> AuthorAffiliationRecord {
        let parsed = if is_object(line) {
            sonic_rs::from_str::<AuthorProbe>(line).ok()
        } else {
            None
        };
        let Some(probe) = parsed else {
            return AuthorAffiliationRecord {
                author_id: MISSING_AUTHOR_ID.to_string(),
                pairs: Vec::new(),
            };
        };

        let mut pairs = Vec::new();
        for aff in probe.affiliations.objects() {
            let country = aff
                .institution
                .get()
                .and_then(|i| i.country_code.0.as_deref())
                .unwrap_or(NO_INSTITUTION);
            for year in &aff.years.0 {
                pairs.push((country.to_string(), year.year_or(INVALID_YEAR)));
            }
        }

        AuthorAffiliationRecord {
            author_id: probe
                .id
                .0
                .map_or_else(|| MISSING_AUTHOR_ID.to_string(), Cow::into_owned),
            pairs,
        }
    }

    /// Extract id, year and author ids of a work. `None` when the line is
    /// not a JSON object; missing or wrong-typed fields come back empty
    /// (year 0, no authors).
    pub fn parse_paper_line<'a>(&mut self, line: &'a str) -> Option<PaperRecord<'a>> {
        if !is_object(line) {
            return None;
        }
        let probe = sonic_rs::from_str::<WorkProbe<'a>>(line).ok()?;
        Some(PaperRecord {
            paper_id: probe.id.0.unwrap_or(Cow::Borrowed("")),
            publication_year: probe.publication_year.year_or(0),
            author_ids: author_ids(probe.authorships),
            raw: line,
        })
    }

    /// Like [`parse_paper_line`](Self::parse_paper_line), also keeping the
    /// authorship count and concept names
    pub fn parse_work_detail<'a>(&mut self, line: &'a str) -> Option<WorkDetail<'a>> {
        if !is_object(line) {
            return None;
        }
        let probe = sonic_rs::from_str::<WorkDetailProbe<'a>>(line).ok()?;
        Some(WorkDetail {
            paper_id: probe.id.0.unwrap_or(Cow::Borrowed("")),
            publication_year: probe.publication_year.0.and_then(|y| i32::try_from(y).ok()),
            authorships: probe.authorships.0.len(),
            author_ids: author_ids(probe.authorships),
            topics: probe
                .concepts
                .0
                .into_iter()
                .filter_map(|c| c.0.and_then(|c| c.display_name.0))
                .collect(),
        })
    }

    /// Lower-cased copy of `text` in the parser's scratch buffer
    pub fn lowercase(&mut self, text: &str) -> &str {
        self.lower.clear();
        self.lower.extend(text.chars().flat_map(char::to_lowercase));
        &self.lower
    }
}
