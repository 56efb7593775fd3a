use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use issn_harvester::app::{App, ProgressEvent, ProgressSink};
use issn_harvester::config::{RunConfig, WindowSpec};
use issn_harvester::crossref::WorksClient;
use issn_harvester::domain::{
    ArticleRecord, DedupPolicy, Issn, OutputSchema, QueryWindow, parse_date,
};
use issn_harvester::error::HarvestError;
use issn_harvester::sources::{IdentifierSource, ManualText};

#[derive(Default)]
struct MockCrossref {
    records: HashMap<String, usize>,
    failing: Vec<String>,
    calls: Mutex<Vec<(String, String, usize)>>,
}

impl MockCrossref {
    fn with(records: &[(&str, usize)]) -> Self {
        Self {
            records: records
                .iter()
                .map(|(issn, count)| (issn.to_string(), *count))
                .collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<(String, String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

impl WorksClient for MockCrossref {
    fn fetch_works(
        &self,
        issn: &Issn,
        window: &QueryWindow,
        rows: usize,
    ) -> Result<Vec<ArticleRecord>, HarvestError> {
        self.calls
            .lock()
            .unwrap()
            .push((issn.to_string(), window.label(), rows));
        if self.failing.iter().any(|failing| failing == issn.as_str()) {
            return Err(HarvestError::CrossrefStatus {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        let count = self.records.get(issn.as_str()).copied().unwrap_or(0);
        Ok((0..count)
            .map(|i| ArticleRecord {
                doi: Some(format!("10.1000/{}.{i}", issn.as_str())),
                title: Some(format!("Article {i}")),
                publisher: Some("Example Press".to_string()),
                ..ArticleRecord::default()
            })
            .collect())
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn config(window: WindowSpec, output_dir: Utf8PathBuf, cap: usize) -> RunConfig {
    let mut config = RunConfig::new(window);
    config.output_dir = output_dir;
    config.max_rows_per_file = cap;
    config.pause = Duration::ZERO;
    config
}

fn january() -> WindowSpec {
    WindowSpec::Range {
        from: parse_date("2025-01-01").unwrap(),
        to: parse_date("2025-01-31").unwrap(),
    }
}

fn manual(text: &str) -> Vec<Box<dyn IdentifierSource>> {
    vec![Box::new(ManualText::new(text))]
}

fn temp_output() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().join("output")).unwrap();
    (temp, dir)
}

#[test]
fn duplicate_issns_produce_one_file_with_range_columns() {
    let (_temp, dir) = temp_output();
    let app = App::new(MockCrossref::with(&[("1234-5678", 3), ("2345-6789", 0)]));
    let sink = RecordingSink::default();

    let result = app
        .run(
            &config(january(), dir, 200_000),
            &manual("1234-5678\n1234-5678\n2345-6789"),
            &sink,
        )
        .unwrap();

    assert_eq!(app.client().calls().len(), 2);
    assert_eq!(result.identifiers, 2);
    assert_eq!(result.records, 3);
    assert_eq!(result.files.len(), 1);

    let mut reader = csv::Reader::from_path(&result.files[0].path).unwrap();
    let header = reader.headers().unwrap().clone();
    assert_eq!(
        header.iter().collect::<Vec<_>>(),
        OutputSchema::DateRange.header().to_vec()
    );
    let rows = reader
        .records()
        .map(|record| record.unwrap())
        .collect::<Vec<_>>();
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert_eq!(&row[0], "1234-5678");
        assert_eq!(&row[8], "2025-01-01");
        assert_eq!(&row[9], "2025-01-31");
    }
}

#[test]
fn small_cap_splits_into_three_parts() {
    let (_temp, dir) = temp_output();
    let app = App::new(MockCrossref::with(&[("1234-5678", 5)]));

    let result = app
        .run(&config(january(), dir, 2), &manual("1234-5678"), &RecordingSink::default())
        .unwrap();

    assert_eq!(
        result.files.iter().map(|f| f.rows).collect::<Vec<_>>(),
        vec![2, 2, 1]
    );
    assert_eq!(
        result.files.iter().map(|f| f.part).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[test]
fn inverted_range_halts_before_any_query() {
    let (_temp, dir) = temp_output();
    let app = App::new(MockCrossref::with(&[("1234-5678", 5)]));
    let window = WindowSpec::Range {
        from: parse_date("2025-02-01").unwrap(),
        to: parse_date("2025-01-01").unwrap(),
    };

    let err = app
        .run(&config(window, dir.clone(), 10), &manual("1234-5678"), &RecordingSink::default())
        .unwrap_err();

    assert_matches!(err, HarvestError::InvertedRange { .. });
    assert!(app.client().calls().is_empty());
    assert!(!dir.as_std_path().exists());
}

#[test]
fn empty_identifier_list_halts_before_any_query() {
    let (_temp, dir) = temp_output();
    let app = App::new(MockCrossref::default());

    let err = app
        .run(&config(january(), dir, 10), &manual(" , \n"), &RecordingSink::default())
        .unwrap_err();

    assert_matches!(err, HarvestError::NoIdentifiers);
    assert!(app.client().calls().is_empty());
}

#[test]
fn failed_fetch_counts_as_empty_and_run_continues() {
    let (_temp, dir) = temp_output();
    let mut client = MockCrossref::with(&[("1234-5678", 2), ("2345-6789", 4)]);
    client.failing.push("1234-5678".to_string());
    let app = App::new(client);

    let result = app
        .run(
            &config(january(), dir, 100),
            &manual("1234-5678,2345-6789"),
            &RecordingSink::default(),
        )
        .unwrap();

    assert_eq!(app.client().calls().len(), 2);
    assert_eq!(result.failed_fetches, 1);
    assert_eq!(result.records, 4);
    assert_eq!(result.files[0].rows, 4);
}

#[test]
fn year_run_queries_every_month_and_writes_a_file_set_per_month() {
    let (_temp, dir) = temp_output();
    let app = App::new(MockCrossref::with(&[("1234-5678", 1)]));
    let sink = RecordingSink::default();
    let mut run_config = config(WindowSpec::Year(2024), dir.clone(), 100);
    run_config.rows_per_query = 20;

    let result = app
        .run(&run_config, &manual("1234-5678\n2345-6789"), &sink)
        .unwrap();

    let calls = app.client().calls();
    assert_eq!(calls.len(), 24);
    assert_eq!(calls[0], ("1234-5678".to_string(), "2024-01".to_string(), 20));
    assert_eq!(calls[1], ("2345-6789".to_string(), "2024-01".to_string(), 20));
    assert_eq!(calls[23].1, "2024-12");

    assert_eq!(result.schema, OutputSchema::MonthWise);
    assert_eq!(result.units, 24);
    assert_eq!(result.files.len(), 12);
    assert_eq!(result.files[0].file_name, "issn_articles_2024-01_part1.csv");
    assert_eq!(result.files[11].file_name, "issn_articles_2024-12_part1.csv");
    assert!(result.files.iter().all(|f| f.rows == 1));

    let content = fs::read_to_string(dir.join("issn_articles_2024-02_part1.csv")).unwrap();
    let mut lines = content.lines();
    assert_eq!(
        lines.next().unwrap(),
        "Year,Month,ISSN,DOI,Article Title,Volume,Issue,Page,Journal Title,Publisher"
    );
    assert_eq!(
        lines.next().unwrap(),
        "2024,2024-02,1234-5678,10.1000/1234-5678.0,Article 0,,,,,Example Press"
    );
}

#[test]
fn keep_all_queries_duplicates_again() {
    let (_temp, dir) = temp_output();
    let app = App::new(MockCrossref::with(&[("1234-5678", 1)]));
    let mut run_config = config(january(), dir, 100);
    run_config.dedup = DedupPolicy::KeepAll;

    let result = app
        .run(&run_config, &manual("1234-5678\n1234-5678"), &RecordingSink::default())
        .unwrap();

    assert_eq!(app.client().calls().len(), 2);
    assert_eq!(result.records, 2);
}

#[test]
fn progress_reaches_completion_and_never_exceeds_it() {
    let (_temp, dir) = temp_output();
    let app = App::new(MockCrossref::with(&[("1234-5678", 3)]));
    let sink = RecordingSink::default();

    app.run(
        &config(january(), dir, 2),
        &manual("1234-5678,2345-6789,3456-7890"),
        &sink,
    )
    .unwrap();

    let events = sink.events.lock().unwrap();
    let fractions = events.iter().map(ProgressEvent::fraction).collect::<Vec<_>>();
    assert!(fractions.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));
    assert_eq!(fractions.last().copied(), Some(1.0));
    let finalized = events
        .iter()
        .filter_map(|event| event.file.as_ref())
        .map(|file| (file.part, file.rows))
        .collect::<Vec<_>>();
    assert_eq!(finalized, vec![(1, 2), (2, 1)]);
}

#[test]
fn year_run_without_records_writes_twelve_headered_files() {
    let (_temp, dir) = temp_output();
    let app = App::new(MockCrossref::default());

    let result = app
        .run(
            &config(WindowSpec::Year(2023), dir.clone(), 100),
            &manual("1234-5678"),
            &RecordingSink::default(),
        )
        .unwrap();

    assert_eq!(app.client().calls().len(), 12);
    assert_eq!(result.records, 0);
    assert_eq!(result.files.len(), 12);
    let header = OutputSchema::MonthWise.header().join(",");
    for (month, file) in (1..=12).zip(&result.files) {
        assert_eq!(file.file_name, format!("issn_articles_2023-{month:02}_part1.csv"));
        assert_eq!(file.rows, 0);
        let content = fs::read_to_string(dir.join(&file.file_name)).unwrap();
        assert_eq!(content.trim_end(), header);
    }
}

#[test]
fn run_clears_unfinished_parts_left_in_output_dir() {
    let (_temp, dir) = temp_output();
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(".issn-harvester-partAbC123.csv.tmp"), "ISSN\n").unwrap();
    fs::write(dir.join("notes.txt"), "keep").unwrap();
    let app = App::new(MockCrossref::with(&[("1234-5678", 1)]));

    app.run(&config(january(), dir.clone(), 10), &manual("1234-5678"), &RecordingSink::default())
        .unwrap();

    let mut names = fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    names.sort();
    assert_eq!(
        names,
        vec!["issn_articles_2025-01-01_to_2025-01-31_part1.csv", "notes.txt"]
    );
}

#[test]
fn plan_reports_units_without_querying() {
    let (_temp, dir) = temp_output();
    let app = App::new(MockCrossref::default());

    let plan = app
        .plan(
            &config(WindowSpec::Year(2025), dir, 10),
            &manual("1234-5678, 2345-6789, 1234-5678"),
        )
        .unwrap();

    assert_eq!(plan.identifiers, vec!["1234-5678", "2345-6789"]);
    assert_eq!(plan.windows.len(), 12);
    assert_eq!(plan.units, 24);
    assert!(app.client().calls().is_empty());
}
