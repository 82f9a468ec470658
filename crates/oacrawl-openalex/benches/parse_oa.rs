use oacrawl_openalex::{AuthorAggregator, RecordParser, parse_compressed_author_line};

fn load_lines(filename: &str) -> Vec<String> {
    let dir = std::env::var("BENCH_DATA_DIR")
        .expect("set BENCH_DATA_DIR to directory with sample data files");
    let path = std::path::Path::new(&dir).join(filename);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("{}: {e}", path.display()))
        .lines()
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

#[divan::bench]
fn parse_author_line(bencher: divan::Bencher) {
    let lines = load_lines("oa_authors.jsonl");
    let mut parser = RecordParser::new();
    bencher.bench_local(|| {
        for line in &lines {
            divan::black_box(parser.parse_author_line(line));
        }
    });
}

#[divan::bench]
fn compress_author_line(bencher: divan::Bencher) {
    let lines = load_lines("oa_authors.jsonl");
    let mut parser = RecordParser::new();
    let mut out = Vec::with_capacity(1 << 20);
    bencher.bench_local(|| {
        out.clear();
        for line in &lines {
            parser.parse_author_line(line).write_compressed(&mut out).unwrap();
        }
        out.len()
    });
}

#[divan::bench]
fn parse_paper_line(bencher: divan::Bencher) {
    let lines = load_lines("oa_works.jsonl");
    let mut parser = RecordParser::new();
    bencher.bench_local(|| {
        let mut authors = 0;
        for line in &lines {
            authors += parser
                .parse_paper_line(line)
                .map_or(0, |p| p.author_ids.len());
        }
        authors
    });
}

#[divan::bench]
fn parse_work_detail(bencher: divan::Bencher) {
    let lines = load_lines("oa_works.jsonl");
    let mut parser = RecordParser::new();
    bencher.bench_local(|| {
        let mut topics = 0;
        for line in &lines {
            topics += parser.parse_work_detail(line).map_or(0, |d| d.topics.len());
        }
        topics
    });
}

#[divan::bench]
fn aggregate_compressed(bencher: divan::Bencher) {
    let lines = load_lines("oa_authors.jsonl");
    let mut parser = RecordParser::new();
    let mut compressed = Vec::new();
    for line in &lines {
        parser.parse_author_line(line).write_compressed(&mut compressed).unwrap();
    }
    let text = String::from_utf8(compressed).unwrap();
    assert!(text.lines().all(|l| parse_compressed_author_line(l).is_some()));
    bencher.bench(|| {
        let mut agg = AuthorAggregator::new(None, None);
        agg.merge_bytes(text.as_bytes());
        agg.finish().0.len()
    });
}

fn main() {
    divan::main();
}
