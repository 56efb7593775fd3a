use std::fs;

use camino::Utf8Path;

use issn_harvester::domain::{ArticleRecord, Issn, OutputRow, OutputSchema, QueryWindow, parse_date};
use issn_harvester::writer::{PartFile, PartWriter, remove_stale_parts};

fn range() -> QueryWindow {
    QueryWindow::range(
        parse_date("2025-01-01").unwrap(),
        parse_date("2025-01-31").unwrap(),
    )
    .unwrap()
}

fn write_rows(dir: &Utf8Path, window: &QueryWindow, rows: usize, cap: usize) -> Vec<PartFile> {
    let issn: Issn = "1234-5678".parse().unwrap();
    let mut writer = PartWriter::create(dir, window, cap).unwrap();
    for i in 0..rows {
        let record = ArticleRecord {
            doi: Some(format!("10.1000/{i}")),
            ..ArticleRecord::default()
        };
        writer
            .write_row(&OutputRow {
                issn: &issn,
                window,
                record: &record,
            })
            .unwrap();
    }
    writer.finish().unwrap()
}

fn data_rows(path: &str) -> Vec<csv::StringRecord> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader.records().map(|record| record.unwrap()).collect()
}

#[test]
fn split_counts_hold_for_many_shapes() {
    for (rows, cap) in [(0, 3), (1, 1), (3, 3), (4, 3), (7, 2), (10, 5), (11, 4)] {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(temp.path()).unwrap();
        let files = write_rows(dir, &range(), rows, cap);

        let expected_files = if rows == 0 { 1 } else { rows.div_ceil(cap) };
        assert_eq!(files.len(), expected_files, "rows={rows} cap={cap}");
        assert_eq!(files.iter().map(|f| f.rows).sum::<usize>(), rows);
        for (index, file) in files.iter().enumerate() {
            assert_eq!(file.part, index + 1);
            assert!(file.rows <= cap);
            assert!(rows == 0 || file.rows >= 1);
            assert_eq!(data_rows(&file.path).len(), file.rows);
        }
    }
}

#[test]
fn empty_run_still_writes_a_headered_file() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(temp.path()).unwrap();
    let files = write_rows(dir, &range(), 0, 10);

    assert_eq!(files.len(), 1);
    assert_eq!(
        files[0].file_name,
        "issn_articles_2025-01-01_to_2025-01-31_part1.csv"
    );
    let content = fs::read_to_string(&files[0].path).unwrap();
    assert_eq!(
        content.trim_end(),
        OutputSchema::DateRange.header().join(",")
    );
}

#[test]
fn parts_are_numbered_and_only_final_names_remain() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(temp.path()).unwrap();
    let window = QueryWindow::month(2025, 3).unwrap();
    let files = write_rows(dir, &window, 5, 2);

    let names = files.iter().map(|f| f.file_name.as_str()).collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            "issn_articles_2025-03_part1.csv",
            "issn_articles_2025-03_part2.csv",
            "issn_articles_2025-03_part3.csv",
        ]
    );
    assert_eq!(files.iter().map(|f| f.rows).collect::<Vec<_>>(), vec![2, 2, 1]);
    assert!(files.iter().all(|f| f.content_type == "text/csv"));

    let mut on_disk = fs::read_dir(temp.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    on_disk.sort();
    assert_eq!(on_disk, names);

    let mut reader = csv::Reader::from_path(&files[2].path).unwrap();
    let header = reader.headers().unwrap().clone();
    assert_eq!(
        header.iter().collect::<Vec<_>>(),
        OutputSchema::MonthWise.header().to_vec()
    );
    let last = reader.records().next().unwrap().unwrap();
    assert_eq!(&last[0], "2025");
    assert_eq!(&last[1], "2025-03");
    assert_eq!(&last[2], "1234-5678");
    assert_eq!(&last[3], "10.1000/4");
}

#[test]
fn stale_temp_parts_are_removed_and_finished_parts_kept() {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8Path::from_path(temp.path()).unwrap();
    write_rows(dir, &range(), 2, 10);
    fs::write(dir.join(".issn-harvester-partX1y2.csv.tmp"), "ISSN\n").unwrap();
    fs::write(dir.join(".issn-harvester-partZ9.csv.tmp"), "").unwrap();
    fs::write(dir.join("journals.csv.tmp"), "other tool").unwrap();

    assert_eq!(remove_stale_parts(dir).unwrap(), 2);
    assert_eq!(remove_stale_parts(dir).unwrap(), 0);

    let mut on_disk = fs::read_dir(temp.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    on_disk.sort();
    assert_eq!(
        on_disk,
        vec![
            "issn_articles_2025-01-01_to_2025-01-31_part1.csv",
            "journals.csv.tmp",
        ]
    );
}
