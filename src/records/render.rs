use std::io::Write;

use tabled::settings::{object::Rows, Alignment};

use super::{OwnedRecord, TableKind, TxRecord};

pub struct OwnerCol();
impl OwnerCol {
    pub const USERNAME: &'static str = "Username";
    pub const GUILD_ID: &'static str = "Guild ID";
    pub const ACCOUNT: &'static str = "Account";

    pub fn all() -> [&'static str; 3] {
        [OwnerCol::USERNAME, OwnerCol::GUILD_ID, OwnerCol::ACCOUNT]
    }
}

/// A kind-specific table of records, ready for printing.
pub struct RenderTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub notes: Vec<String>,
}

/// The record's values, in the order of kind.required_columns().
pub fn record_cells(record: &TxRecord) -> Vec<String> {
    match record {
        TxRecord::Option(o) => vec![
            o.operation.to_string(),
            o.symbol.clone(),
            o.date.to_string(),
            o.expiration_date.to_string(),
            o.contracts.to_string(),
            o.strike_price.to_string(),
            o.option_type.to_string(),
            o.premium.to_string(),
            o.total.to_string(),
        ],
        TxRecord::Share(s) => vec![
            s.date.to_string(),
            s.action.to_string(),
            s.symbol.clone(),
            s.price.to_string(),
            s.quantity.to_string(),
            s.amount.to_string(),
        ],
        TxRecord::Dividend(d) => {
            vec![d.date.to_string(), d.symbol.clone(), d.amount.to_string()]
        }
        TxRecord::Transfer(t) => {
            vec![t.date.to_string(), t.action.to_string(), t.amount.to_string()]
        }
    }
}

fn kind_header(kind: TableKind) -> Vec<String> {
    kind.required_columns().iter().map(|c| c.to_string()).collect()
}

pub fn render_records(kind: TableKind, records: &[TxRecord]) -> RenderTable {
    let rows = records
        .iter()
        .filter(|r| r.kind() == kind)
        .map(record_cells)
        .collect();
    RenderTable { header: kind_header(kind), rows, notes: vec![] }
}

/// As render_records, with the owner columns first.
pub fn render_owned_records(kind: TableKind, records: &[OwnedRecord]) -> RenderTable {
    let mut header: Vec<String> = OwnerCol::all().iter().map(|c| c.to_string()).collect();
    header.extend(kind_header(kind));
    let rows = records
        .iter()
        .filter(|r| r.record.kind() == kind)
        .map(|r| {
            let mut row = vec![
                r.owner.username.clone(),
                r.owner.guild_id.map(|g| g.to_string()).unwrap_or_default(),
                r.owner.account.clone(),
            ];
            row.extend(record_cells(&r.record));
            row
        })
        .collect();
    RenderTable { header, rows, notes: vec![] }
}

pub fn write_csv<W: Write>(table: &RenderTable, w: W) -> Result<(), String> {
    let mut csv_w = csv::WriterBuilder::new().has_headers(true).from_writer(w);
    csv_w.write_record(&table.header).map_err(|e| e.to_string())?;
    for row in &table.rows {
        csv_w.write_record(row).map_err(|e| e.to_string())?;
    }
    csv_w.flush().map_err(|e| e.to_string())
}

/// Writes `table` as an ASCII-bordered text table, under `title`.
pub fn write_text<W: Write>(title: &str, table: &RenderTable, mut w: W) -> Result<(), String> {
    let map_write_err = |e| format!("{e}");

    writeln!(w, "{}", title).map_err(map_write_err)?;
    if table.rows.is_empty() {
        writeln!(w, "(none)").map_err(map_write_err)?;
    } else {
        let mut table_bldr = tabled::builder::Builder::default();
        table_bldr.push_record(table.header.iter().map(|h| h.to_uppercase()));
        for row in &table.rows {
            table_bldr.push_record(row);
        }
        let mut text_table = table_bldr.build();
        text_table.with(tabled::settings::Style::ascii());
        // Center the header
        text_table.modify(Rows::first(), Alignment::center());
        writeln!(w, "{}", text_table).map_err(map_write_err)?;
    }
    for note in &table.notes {
        writeln!(w, "{}", note).map_err(map_write_err)?;
    }
    Ok(())
}
