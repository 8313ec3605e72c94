//! Unit tests for the CSV ledger store.

use std::fs;

use session_annotator::ledger::csv_store::CsvLedgerStore;
use session_annotator::ledger::LedgerStore;
use session_annotator::AppError;

fn obligatory() -> Vec<String> {
    ["Block_Nr", "Task_Nr", "Trial_Nr", "transcription"]
        .iter()
        .map(|c| (*c).to_owned())
        .collect()
}

#[test]
fn byte_order_mark_is_stripped_from_the_first_header() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger.csv");
    fs::write(&path, "\u{feff}Block_Nr,Task_Nr,Trial_Nr\n1,2,3\n").expect("write");

    let ledger = CsvLedgerStore::new(obligatory()).load(&path).expect("load");
    assert_eq!(ledger.columns()[0], "Block_Nr");
    assert_eq!(ledger.cell(0, "Block_Nr"), Some("1"));
}

#[test]
fn save_keeps_obligatory_columns_and_quoted_cells() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger.csv");
    fs::write(&path, "Block_Nr,notes\n1,\"a, \"\"quoted\"\" note\"\n").expect("write");

    let store = CsvLedgerStore::new(obligatory());
    let ledger = store.load(&path).expect("load");
    store.save(&ledger, &path).expect("save");

    let reloaded = store.load(&path).expect("reload");
    assert_eq!(
        reloaded.columns(),
        ["Block_Nr", "notes", "Task_Nr", "Trial_Nr", "transcription"]
    );
    assert_eq!(reloaded.cell(0, "notes"), Some("a, \"quoted\" note"));
    assert_eq!(reloaded.cell(0, "transcription"), Some(""));
}

#[test]
fn save_leaves_no_temporary_files_behind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger.csv");
    fs::write(&path, "Block_Nr\n1\n").expect("write");

    let store = CsvLedgerStore::new(obligatory());
    let ledger = store.load(&path).expect("load");
    store.save(&ledger, &path).expect("save");

    let entries: Vec<_> = fs::read_dir(dir.path()).expect("read dir").collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn invalid_utf8_row_is_a_ledger_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger.csv");
    fs::write(&path, b"Block_Nr\n\xff\xfe\n").expect("write");

    let err = CsvLedgerStore::new(obligatory())
        .load(&path)
        .expect_err("must fail");
    assert!(matches!(err, AppError::Ledger(_)));
}

#[test]
fn missing_file_is_a_ledger_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = CsvLedgerStore::new(obligatory())
        .load(&dir.path().join("absent.csv"))
        .expect_err("must fail");
    assert!(matches!(err, AppError::Ledger(_)));
}

#[test]
fn trailing_commas_do_not_break_later_writes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger.csv");
    fs::write(&path, "Block_Nr,Task_Nr,Trial_Nr\n1,1,1\n1,1,2,\n").expect("write");

    let store = CsvLedgerStore::new(obligatory());
    let mut ledger = store.load(&path).expect("load");
    assert_eq!(ledger.columns(), ["Block_Nr", "Task_Nr", "Trial_Nr"]);

    ledger
        .append_to_cell(1, "automatic_transcription", "X ")
        .expect("append");
    store.save(&ledger, &path).expect("save");

    let reloaded = store.load(&path).expect("reload");
    assert_eq!(reloaded.cell(1, "automatic_transcription"), Some("X "));
    assert_eq!(reloaded.cell(0, "automatic_transcription"), Some(""));
}
