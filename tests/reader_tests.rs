//! Tests for Reader
//!
//! These tests verify:
//! - Point lookups (found, not found, decode failure)
//! - Batch lookups (partial results, leniency, parallelism settings)
//! - Construction rules for index sources and paths
//! - Bounded concurrency and cancellation

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use keyline::config::ReaderConfig;
use keyline::{
    CancellationToken, KeylineError, Reader, RecordCodec, Result, Writer,
};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    id: String,
    value: i64,
}

fn item(id: &str, value: i64) -> Item {
    Item {
        id: id.to_string(),
        value,
    }
}

fn key(id: &str) -> String {
    id.to_string()
}

/// Write `records` to items.jsonl / items.index in a fresh temp dir
fn setup_dataset(records: &[Item]) -> (TempDir, PathBuf, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let data = temp_dir.path().join("items.jsonl");
    let index = temp_dir.path().join("items.index");
    Writer::new(|i: &Item| i.id.clone())
        .write(records, &data, &index)
        .unwrap();
    (temp_dir, data, index)
}

fn abc_dataset() -> (TempDir, PathBuf, PathBuf) {
    setup_dataset(&[item("a", 1), item("b", 2), item("c", 3)])
}

fn numbered(count: usize) -> Vec<Item> {
    (0..count)
        .map(|i| item(&format!("key{:05}", i), i as i64))
        .collect()
}

fn open(data: &Path) -> Reader<Item, String> {
    Reader::open(data).unwrap()
}

// =============================================================================
// Point Read Tests
// =============================================================================

#[test]
fn test_read_by_key_scenario() {
    let (_temp, data, _index) = abc_dataset();
    let reader = open(&data);

    assert_eq!(reader.read_by_key(&key("b")).unwrap(), Some(item("b", 2)));
    assert_eq!(reader.read_by_key(&key("z")).unwrap(), None);

    let batch = reader.read_by_keys([key("a"), key("c")], None).unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch["a"].value, 1);
    assert_eq!(batch["c"].value, 3);
}

#[test]
fn test_read_every_key_in_random_order() {
    let records = numbered(300);
    let (_temp, data, _index) = setup_dataset(&records);
    let reader = open(&data);

    for i in [299, 0, 150, 7, 298, 1] {
        let found = reader.read_by_key(&records[i].id).unwrap();
        assert_eq!(found.as_ref(), Some(&records[i]));
    }
}

#[test]
fn test_read_after_duplicate_key_returns_latest() {
    let (_temp, data, _index) = setup_dataset(&[item("a", 1), item("a", 2)]);
    let reader = open(&data);

    assert_eq!(reader.read_by_key(&key("a")).unwrap(), Some(item("a", 2)));
    assert_eq!(reader.len(), 1);
}

/// Data file with a good line, a corrupt line and a blank line, and an
/// index pointing at all three
fn setup_damaged_dataset() -> (TempDir, PathBuf, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let data = temp_dir.path().join("damaged.jsonl");
    let index = temp_dir.path().join("damaged.index");

    let good = r#"{"id":"good","value":1}"#;
    let broken = r#"{"id":"broken","val"#;
    fs::write(&data, format!("{}\n{}\n\n", good, broken)).unwrap();

    let broken_at = good.len() + 1;
    let blank_at = broken_at + broken.len() + 1;
    fs::write(
        &index,
        format!(
            r#"[{{"key":"good","offset":0}},{{"key":"broken","offset":{}}},{{"key":"blank","offset":{}}}]"#,
            broken_at, blank_at
        ),
    )
    .unwrap();
    (temp_dir, data, index)
}

#[test]
fn test_read_by_key_surfaces_decode_error() {
    let (_temp, data, _index) = setup_damaged_dataset();
    let reader = open(&data);

    assert!(reader.read_by_key(&key("good")).unwrap().is_some());
    assert!(matches!(
        reader.read_by_key(&key("broken")),
        Err(KeylineError::Decode { .. })
    ));
    assert!(matches!(
        reader.read_by_key(&key("blank")),
        Err(KeylineError::Decode { .. })
    ));
    assert_eq!(reader.permit_stats().available, reader.config().read_permits);
}

// =============================================================================
// Batch Read Tests
// =============================================================================

#[test]
fn test_batch_partial_result() {
    let (_temp, data, _index) = abc_dataset();
    let reader = open(&data);

    let batch = reader
        .read_by_keys(&[key("a"), key("missing"), key("c")], None)
        .unwrap();

    let expected: HashMap<String, Item> =
        [(key("a"), item("a", 1)), (key("c"), item("c", 3))].into_iter().collect();
    assert_eq!(batch, expected);
}

#[test]
fn test_batch_empty_input() {
    let (_temp, data, _index) = abc_dataset();
    let reader = open(&data);

    let batch = reader.read_by_keys(Vec::<String>::new(), None).unwrap();
    assert!(batch.is_empty());

    let batch = reader.read_by_keys([key("nope")], None).unwrap();
    assert!(batch.is_empty());
    assert_eq!(reader.permit_stats().peak_in_flight, 0);
}

#[test]
fn test_batch_roundtrip_all_parallelism_levels() {
    let records = numbered(1_000);
    let (_temp, data, _index) = setup_dataset(&records);
    let reader = open(&data);
    let keys: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

    for parallelism in [None, Some(1), Some(3), Some(16), Some(5_000)] {
        let batch = reader.read_by_keys(&keys, parallelism).unwrap();
        assert_eq!(batch.len(), records.len(), "parallelism {:?}", parallelism);
        for record in &records {
            assert_eq!(&batch[&record.id], record);
        }
    }
}

#[test]
fn test_batch_duplicate_keys_collapse() {
    let (_temp, data, _index) = abc_dataset();
    let reader = open(&data);

    let batch = reader
        .read_by_keys([key("b"), key("b"), key("a"), key("b")], Some(4))
        .unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch["b"].value, 2);
}

#[test]
fn test_batch_keys_sharing_an_offset() {
    let (_temp, data, index) = abc_dataset();
    fs::write(
        &index,
        r#"[{"key":"a","offset":0},{"key":"alias","offset":0}]"#,
    )
    .unwrap();
    let reader = open(&data);

    assert_eq!(reader.read_by_key(&key("alias")).unwrap(), Some(item("a", 1)));

    for parallelism in [Some(1), Some(4)] {
        let batch = reader
            .read_by_keys([key("a"), key("alias"), key("alias")], parallelism)
            .unwrap();
        assert_eq!(batch.len(), 2, "parallelism {:?}", parallelism);
        assert_eq!(batch["a"], item("a", 1));
        assert_eq!(batch["alias"], item("a", 1));
    }
}

#[test]
fn test_batch_omits_undecodable_lines() {
    let (_temp, data, _index) = setup_damaged_dataset();
    let reader = open(&data);

    for parallelism in [Some(1), Some(4)] {
        let batch = reader
            .read_by_keys([key("good"), key("broken"), key("blank")], parallelism)
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batch.contains_key("good"));
    }
}

#[test]
fn test_batch_zero_parallelism_rejected() {
    let (_temp, data, _index) = abc_dataset();
    let reader = open(&data);

    let result = reader.read_by_keys([key("a")], Some(0));
    assert!(matches!(result, Err(KeylineError::Config(_))));
}

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_open_explicit_index_path() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("items.jsonl");
    let index = temp.path().join("elsewhere.idx");
    Writer::new(|i: &Item| i.id.clone())
        .write(&[item("a", 1)], &data, &index)
        .unwrap();

    // derived path does not exist
    assert!(Reader::<Item, String>::open(&data).is_err());

    let reader: Reader<Item, String> = Reader::builder(&data).index_path(&index).open().unwrap();
    assert_eq!(reader.index_path(), Some(index.as_path()));
    assert_eq!(reader.read_by_key(&key("a")).unwrap(), Some(item("a", 1)));
}

#[test]
fn test_open_with_key_extractor_rebuilds_index() {
    let (_temp, data, index) = abc_dataset();
    fs::remove_file(&index).unwrap();

    let reader: Reader<Item, String> = Reader::builder(&data)
        .key_extractor(|i: &Item| i.id.clone())
        .open()
        .unwrap();

    assert_eq!(reader.index_path(), None);
    assert_eq!(reader.len(), 3);
    assert_eq!(reader.read_by_key(&key("c")).unwrap(), Some(item("c", 3)));
    assert!(!index.exists(), "rebuilding must not write an index file");
}

#[test]
fn test_key_extractor_survives_corrupt_index() {
    let (_temp, data, index) = abc_dataset();
    fs::write(&index, "[{\"key\":").unwrap();

    assert!(matches!(
        Reader::<Item, String>::open(&data),
        Err(KeylineError::MalformedIndex { .. })
    ));

    let reader: Reader<Item, String> = Reader::builder(&data)
        .key_extractor(|i: &Item| i.id.clone())
        .open()
        .unwrap();
    assert_eq!(reader.read_by_key(&key("a")).unwrap(), Some(item("a", 1)));
}

#[test]
fn test_index_path_and_extractor_conflict() {
    let (_temp, data, index) = abc_dataset();

    let result: Result<Reader<Item, String>> = Reader::builder(&data)
        .index_path(&index)
        .key_extractor(|i: &Item| i.id.clone())
        .open();

    assert!(matches!(result, Err(KeylineError::Config(_))));
}

#[test]
fn test_identical_paths_rejected() {
    let (_temp, data, _index) = abc_dataset();

    let result: Result<Reader<Item, String>> = Reader::builder(&data).index_path(&data).open();
    assert!(matches!(result, Err(KeylineError::Config(_))));
}

#[test]
fn test_aliased_index_path_rejected() {
    let (temp, data, _index) = abc_dataset();
    fs::create_dir(temp.path().join("sub")).unwrap();
    let alias = temp.path().join("sub").join("..").join("items.jsonl");

    let result: Result<Reader<Item, String>> = Reader::builder(&data).index_path(&alias).open();
    assert!(matches!(result, Err(KeylineError::Config(_))));
}

#[test]
fn test_missing_data_file() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("nothing.jsonl");
    fs::write(temp.path().join("nothing.index"), "[]").unwrap();

    let result = Reader::<Item, String>::open(&data);
    assert!(matches!(
        result,
        Err(KeylineError::NotFound { what: "Data file", .. })
    ));

    let result: Result<Reader<Item, String>> = Reader::builder(&data)
        .key_extractor(|i: &Item| i.id.clone())
        .open();
    assert!(result.unwrap_err().is_not_found());
}

#[test]
fn test_missing_derived_index_file() {
    let (_temp, data, index) = abc_dataset();
    fs::remove_file(&index).unwrap();

    let result = Reader::<Item, String>::open(&data);
    assert!(matches!(
        result,
        Err(KeylineError::NotFound { what: "Index file", .. })
    ));
}

#[test]
fn test_invalid_reader_config() {
    let (_temp, data, _index) = abc_dataset();
    let config = ReaderConfig::builder().read_permits(0).build();

    let result: Result<Reader<Item, String>> = Reader::builder(&data).config(config).open();
    assert!(matches!(result, Err(KeylineError::Config(_))));
}

// =============================================================================
// Custom Codec Tests
// =============================================================================

/// `id|value` lines
struct PipeCodec;

impl RecordCodec<Item> for PipeCodec {
    fn encode_into(&self, record: &Item, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(format!("{}|{}", record.id, record.value).as_bytes());
        Ok(())
    }

    fn decode(&self, line: &[u8]) -> Result<Item> {
        let text = std::str::from_utf8(line).map_err(|e| KeylineError::Decode {
            offset: 0,
            reason: e.to_string(),
        })?;
        let (id, value) = text.split_once('|').ok_or_else(|| KeylineError::Decode {
            offset: 0,
            reason: "missing separator".to_string(),
        })?;
        let value = value.parse().map_err(|e: std::num::ParseIntError| KeylineError::Decode {
            offset: 0,
            reason: e.to_string(),
        })?;
        Ok(item(id, value))
    }
}

#[test]
fn test_custom_codec_roundtrip() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("items.txt");
    let index = temp.path().join("items.index");

    Writer::with_codec(|i: &Item| i.id.clone(), PipeCodec)
        .write(&[item("x", 10), item("y", 20)], &data, &index)
        .unwrap();
    assert_eq!(fs::read_to_string(&data).unwrap(), "x|10\ny|20\n");

    let reader: Reader<Item, String, PipeCodec> =
        Reader::builder(&data).codec(PipeCodec).open().unwrap();
    assert_eq!(reader.read_by_key(&key("y")).unwrap(), Some(item("y", 20)));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_point_reads_respect_permits() {
    let records = numbered(256);
    let (_temp, data, index) = setup_dataset(&records);

    let config = ReaderConfig::builder().read_permits(2).build();
    let reader: Arc<Reader<Item, String>> = Arc::new(
        Reader::builder(&data)
            .index_path(&index)
            .config(config)
            .open()
            .unwrap(),
    );

    let handles: Vec<_> = (0..16)
        .map(|t| {
            let reader = Arc::clone(&reader);
            let records = records.clone();
            thread::spawn(move || {
                for record in records.iter().skip(t).step_by(16) {
                    let found = reader.read_by_key(&record.id).unwrap();
                    assert_eq!(found.as_ref(), Some(record));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = reader.permit_stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.available, 2);
    assert!(stats.peak_in_flight >= 1 && stats.peak_in_flight <= 2);
}

#[test]
fn test_concurrent_batches_share_permits() {
    let records = numbered(400);
    let (_temp, data, _index) = setup_dataset(&records);

    let config = ReaderConfig::builder().read_permits(3).build();
    let reader: Reader<Item, String> = Reader::builder(&data).config(config).open().unwrap();
    let keys: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

    thread::scope(|scope| {
        for chunk in keys.chunks(100) {
            let reader = &reader;
            scope.spawn(move || {
                let batch = reader.read_by_keys(chunk, Some(8)).unwrap();
                assert_eq!(batch.len(), chunk.len());
            });
        }
    });

    assert!(reader.permit_stats().peak_in_flight <= 3);
    assert_eq!(reader.permit_stats().available, 3);
}

// =============================================================================
// Cancellation Tests
// =============================================================================

#[test]
fn test_cancelled_point_read_is_not_not_found() {
    let (_temp, data, _index) = abc_dataset();
    let reader = open(&data);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = reader.read_by_key_with_cancel(&key("a"), &cancel);
    assert!(matches!(result, Err(KeylineError::Cancelled)));
    assert_eq!(reader.permit_stats().available, reader.config().read_permits);
}

#[test]
fn test_cancelled_batch_propagates() {
    let records = numbered(200);
    let (_temp, data, _index) = setup_dataset(&records);
    let reader = open(&data);
    let keys: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
    let cancel = CancellationToken::new();
    cancel.cancel();

    for parallelism in [Some(1), Some(4)] {
        let result = reader.read_by_keys_with_cancel(&keys, parallelism, &cancel);
        assert!(matches!(result, Err(KeylineError::Cancelled)));
    }
    assert_eq!(reader.permit_stats().available, reader.config().read_permits);
}

#[test]
fn test_expired_deadline_cancels_read() {
    let records = numbered(50);
    let (_temp, data, _index) = setup_dataset(&records);
    let config = ReaderConfig::builder().read_permits(1).build();
    let reader: Reader<Item, String> = Reader::builder(&data).config(config).open().unwrap();

    let cancel = CancellationToken::with_timeout(std::time::Duration::from_millis(0));
    let result = reader.read_by_key_with_cancel(&records[10].id, &cancel);
    assert!(result.unwrap_err().is_cancelled());
}

#[test]
fn test_cancelled_open() {
    let (_temp, data, _index) = abc_dataset();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result: Result<Reader<Item, String>> = Reader::builder(&data)
        .key_extractor(|i: &Item| i.id.clone())
        .cancellation(cancel)
        .open();
    assert!(matches!(result, Err(KeylineError::Cancelled)));
}
