//! Destinations for imported records.
//!
//! Each kind of record is its own table. Imports replace a date range of a
//! user's account, rather than adding to it, so re-importing an overlapping
//! export does not duplicate records.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use time::Date;
use tracing::{debug, warn};

use crate::{
    pipeline::{load_table, validate, FileLayout},
    records::{
        render::{record_cells, OwnerCol},
        OwnedRecord, RecordOwner, TableKind,
    },
    util::basic::SError,
};

pub trait RecordStore {
    /// Deletes the records of `kind` owned by (username, account), dated
    /// within [start, end] inclusive. Returns how many were deleted.
    ///
    /// Nothing is deleted when either date is missing (nothing was imported).
    fn delete_range(
        &mut self,
        kind: TableKind,
        username: &str,
        account: &str,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<usize, SError>;

    fn insert(&mut self, record: &OwnedRecord) -> Result<(), SError>;

    /// The stored records of `kind` owned by (username, account),
    /// in insertion order.
    fn query(
        &mut self,
        kind: TableKind,
        username: &str,
        account: &str,
    ) -> Result<Vec<OwnedRecord>, SError>;
}

fn date_range(start: Option<Date>, end: Option<Date>) -> Option<(Date, Date)> {
    match (start, end) {
        (Some(s), Some(e)) => Some((s, e)),
        _ => {
            warn!("delete_range: no date range given ({:?} to {:?}). Nothing deleted", start, end);
            None
        }
    }
}

fn is_owned_by(r: &OwnedRecord, username: &str, account: &str) -> bool {
    r.owner.username == username && r.owner.account == account
}

fn in_range(r: &OwnedRecord, kind: TableKind, username: &str, account: &str, range: (Date, Date)) -> bool {
    let date = r.record.date();
    r.record.kind() == kind && is_owned_by(r, username, account) && range.0 <= date && date <= range.1
}

#[derive(Default)]
pub struct InMemoryRecordStore {
    pub records: Vec<OwnedRecord>,
}

impl InMemoryRecordStore {
    pub fn new() -> InMemoryRecordStore {
        InMemoryRecordStore { records: Vec::new() }
    }
}

impl RecordStore for InMemoryRecordStore {
    fn delete_range(
        &mut self,
        kind: TableKind,
        username: &str,
        account: &str,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<usize, SError> {
        let range = match date_range(start, end) {
            Some(r) => r,
            None => return Ok(0),
        };
        let n_before = self.records.len();
        self.records.retain(|r| !in_range(r, kind, username, account, range));
        Ok(n_before - self.records.len())
    }

    fn insert(&mut self, record: &OwnedRecord) -> Result<(), SError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn query(
        &mut self,
        kind: TableKind,
        username: &str,
        account: &str,
    ) -> Result<Vec<OwnedRecord>, SError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.record.kind() == kind && is_owned_by(r, username, account))
            .cloned()
            .collect())
    }
}

/// Keeps each kind of record in its own csv file ("options.csv", etc.)
/// in a directory. The owner columns come first, then the kind's
/// canonical columns.
pub struct CsvRecordStore {
    dir: PathBuf,
}

impl CsvRecordStore {
    pub fn new(dir: &Path) -> Result<CsvRecordStore, SError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Unable to create store directory {}: {}", dir.display(), e))?;
        Ok(CsvRecordStore { dir: dir.to_path_buf() })
    }

    fn table_path(&self, kind: TableKind) -> PathBuf {
        self.dir.join(format!("{kind}.csv"))
    }

    fn header(kind: TableKind) -> Vec<&'static str> {
        let mut header = OwnerCol::all().to_vec();
        header.extend(kind.required_columns());
        header
    }

    fn read_all(&self, kind: TableKind) -> Result<Vec<OwnedRecord>, SError> {
        let path = self.table_path(kind);
        if !path.exists() {
            return Ok(vec![]);
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("Unable to read {}: {}", path.display(), e))?;
        if text.trim().is_empty() {
            return Ok(vec![]);
        }
        let table = load_table(&text, &FileLayout::new(0, 0))
            .map_err(|e| format!("{}: {}", path.display(), e))?;

        let records = table
            .select(kind.required_columns())
            .and_then(|t| validate(kind, &t))
            .map_err(|e| format!("{}: {}", path.display(), e))?;

        let mut owned = Vec::with_capacity(records.len());
        for (row, record) in table.rows().zip(records) {
            let guild_id = match row.str(OwnerCol::GUILD_ID) {
                "" => None,
                g => Some(g.parse::<u64>().map_err(|e| {
                    format!("{}: row {}: invalid guild id \"{}\": {}", path.display(), row.num(), g, e)
                })?),
            };
            let owner = RecordOwner::new(row.str(OwnerCol::USERNAME))
                .with_account(row.str(OwnerCol::ACCOUNT))
                .with_guild(guild_id);
            owned.push(OwnedRecord { owner, record });
        }
        Ok(owned)
    }

    fn owner_cells(owner: &RecordOwner) -> Vec<String> {
        vec![
            owner.username.clone(),
            owner.guild_id.map(|g| g.to_string()).unwrap_or_default(),
            owner.account.clone(),
        ]
    }

    fn write_record<W: std::io::Write>(
        csv_w: &mut csv::Writer<W>,
        record: &OwnedRecord,
    ) -> Result<(), SError> {
        let mut cells = CsvRecordStore::owner_cells(&record.owner);
        cells.extend(record_cells(&record.record));
        csv_w.write_record(&cells).map_err(|e| e.to_string())
    }

    fn write_all(&self, kind: TableKind, records: &[OwnedRecord]) -> Result<(), SError> {
        let path = self.table_path(kind);
        let file = File::create(&path)
            .map_err(|e| format!("Unable to create {}: {}", path.display(), e))?;
        let mut csv_w = csv::WriterBuilder::new().has_headers(true).from_writer(file);
        csv_w
            .write_record(CsvRecordStore::header(kind))
            .map_err(|e| e.to_string())?;
        for record in records {
            CsvRecordStore::write_record(&mut csv_w, record)?;
        }
        csv_w.flush().map_err(|e| e.to_string())
    }
}

impl RecordStore for CsvRecordStore {
    fn delete_range(
        &mut self,
        kind: TableKind,
        username: &str,
        account: &str,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<usize, SError> {
        let range = match date_range(start, end) {
            Some(r) => r,
            None => return Ok(0),
        };
        let mut records = self.read_all(kind)?;
        let n_before = records.len();
        records.retain(|r| !in_range(r, kind, username, account, range));
        let n_deleted = n_before - records.len();
        if n_deleted > 0 {
            self.write_all(kind, &records)?;
        }
        debug!("Deleted {} from {}", n_deleted, self.table_path(kind).display());
        Ok(n_deleted)
    }

    fn insert(&mut self, record: &OwnedRecord) -> Result<(), SError> {
        let kind = record.record.kind();
        let path = self.table_path(kind);
        let is_new = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| format!("Unable to open {}: {}", path.display(), e))?;
        let mut csv_w = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            csv_w
                .write_record(CsvRecordStore::header(kind))
                .map_err(|e| e.to_string())?;
        }
        CsvRecordStore::write_record(&mut csv_w, record)?;
        csv_w.flush().map_err(|e| e.to_string())
    }

    fn query(
        &mut self,
        kind: TableKind,
        username: &str,
        account: &str,
    ) -> Result<Vec<OwnedRecord>, SError> {
        Ok(self
            .read_all(kind)?
            .into_iter()
            .filter(|r| is_owned_by(r, username, account))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::{
        records::{Dividend, OwnedRecord, RecordOwner, TableKind, TxRecord},
        testlib::assert_vec_eq,
        util::date::pub_testlib::ymd,
    };

    use super::{CsvRecordStore, InMemoryRecordStore, RecordStore};

    fn div(owner: &RecordOwner, day: u8) -> OwnedRecord {
        OwnedRecord {
            owner: owner.clone(),
            record: TxRecord::Dividend(Dividend {
                date: ymd(2025, 5, day),
                symbol: "YMAX".to_string(),
                amount: dec!(15.01),
            }),
        }
    }

    fn exercise_store(store: &mut dyn RecordStore) {
        let sam = RecordOwner::new("sam").with_guild(Some(7));
        let sam_ira = RecordOwner::new("sam").with_account("ira");
        let kim = RecordOwner::new("kim");

        for r in [div(&sam, 1), div(&sam, 10), div(&sam, 20), div(&sam_ira, 10), div(&kim, 10)] {
            store.insert(&r).unwrap();
        }

        // Inclusive on both ends, and limited to the user's account
        let n = store
            .delete_range(TableKind::Dividends, "sam", "default", Some(ymd(2025, 5, 10)), Some(ymd(2025, 5, 20)))
            .unwrap();
        assert_eq!(n, 2);
        assert_vec_eq(
            store.query(TableKind::Dividends, "sam", "default").unwrap(),
            vec![div(&sam, 1)],
        );
        assert_eq!(store.query(TableKind::Dividends, "sam", "ira").unwrap().len(), 1);
        assert_eq!(store.query(TableKind::Dividends, "kim", "default").unwrap().len(), 1);

        // Other kinds are untouched
        let n = store
            .delete_range(TableKind::Options, "kim", "default", Some(ymd(2025, 1, 1)), Some(ymd(2025, 12, 31)))
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(store.query(TableKind::Dividends, "kim", "default").unwrap().len(), 1);

        // No range
        let n = store.delete_range(TableKind::Dividends, "kim", "default", None, None).unwrap();
        assert_eq!(n, 0);
        let n = store
            .delete_range(TableKind::Dividends, "kim", "default", Some(ymd(2025, 5, 10)), None)
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_in_memory_store() {
        let mut store = InMemoryRecordStore::new();
        exercise_store(&mut store);
        assert_eq!(store.records.len(), 3);
    }

    #[test]
    fn test_csv_store() {
        let dir = std::env::temp_dir()
            .join(format!("brokerage-import-store-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let mut store = CsvRecordStore::new(&dir).unwrap();
        exercise_store(&mut store);

        let text = std::fs::read_to_string(dir.join("dividends.csv")).unwrap();
        // Reopening reads back the same records
        let mut reopened = CsvRecordStore::new(&dir).unwrap();
        let records = reopened.query(TableKind::Dividends, "sam", "default").unwrap();
        let _ = std::fs::remove_dir_all(&dir);

        assert_eq!(
            text,
            "Username,Guild ID,Account,Date,Symbol,Amount\n\
             sam,7,default,2025-05-01,YMAX,15.01\n\
             sam,,ira,2025-05-10,YMAX,15.01\n\
             kim,,default,2025-05-10,YMAX,15.01\n"
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].owner.guild_id, Some(7));
    }
}
