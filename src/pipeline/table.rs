use std::fmt::Display;

use rust_decimal::Decimal;
use time::Date;

use super::error::ImportError;

/// A single value of the raw intermediate table.
///
/// Everything is loaded as Text (or Empty). Cleaners may replace text with
/// typed values as they derive canonical columns.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Cell {
    Empty,
    Text(String),
    Num(Decimal),
    Date(Date),
}

static EMPTY_CELL: Cell = Cell::Empty;

impl Cell {
    pub fn text<S: Into<String>>(s: S) -> Cell {
        let s = s.into();
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s)
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Cell::Empty
    }

    /// The text of a Text cell, or "" for any other kind.
    pub fn as_str(&self) -> &str {
        match self {
            Cell::Text(s) => s.as_str(),
            _ => "",
        }
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => write!(f, "{s}"),
            Cell::Num(d) => write!(f, "{d}"),
            Cell::Date(d) => write!(f, "{d}"),
        }
    }
}

#[derive(Clone, Debug)]
struct RowData {
    // 1-based row number, as loaded (after the header)
    num: usize,
    cells: Vec<Cell>,
}

/// A borrowed view of one row, with cells addressed by column name.
pub struct Row<'a> {
    columns: &'a [String],
    num: usize,
    cells: &'a [Cell],
}

impl<'a> Row<'a> {
    pub fn num(&self) -> usize {
        self.num
    }

    /// The named cell. Absent columns read as Empty.
    pub fn get(&self, col: &str) -> &'a Cell {
        self.columns
            .iter()
            .position(|c| c == col)
            .and_then(|i| self.cells.get(i))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn str(&self, col: &str) -> &'a str {
        self.get(col).as_str()
    }

    /// A validation error which points at this row.
    pub fn err<S: Display>(&self, msg: S) -> ImportError {
        ImportError::Validation(format!("Row {}: {}", self.num, msg))
    }
}

/// The working representation of an export between pipeline stages.
/// Rows are always exactly as wide as the column list.
#[derive(Clone, Debug)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<RowData>,
}

impl RawTable {
    /// Rows shorter than the header are padded with Empty,
    /// and longer ones are truncated.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> RawTable {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, mut cells)| {
                cells.resize(width, Cell::Empty);
                RowData { num: i + 1, cells }
            })
            .collect();
        RawTable { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn col_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.col_index(name).is_some()
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|r| Row {
            columns: &self.columns,
            num: r.num,
            cells: &r.cells,
        })
    }

    /// All cells of a column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let i = self.col_index(name)?;
        Some(self.rows.iter().map(|r| &r.cells[i]).collect())
    }

    fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|c| !self.has_column(c))
            .map(|c| c.to_string())
            .collect()
    }

    /// Fails with a Schema error naming every missing column.
    pub fn require_columns(&self, required: &[&str]) -> Result<(), ImportError> {
        let missing = self.missing_columns(required);
        if missing.is_empty() {
            return Ok(());
        }
        let err = ImportError::Schema {
            missing,
            found: self.columns.clone(),
        };
        tracing::error!("{}", err);
        Err(err)
    }

    /// Keeps only the rows matching `pred`
    pub fn retain<F>(&mut self, mut pred: F)
    where
        F: FnMut(&Row) -> bool,
    {
        let columns = &self.columns;
        self.rows.retain(|r| {
            pred(&Row { columns, num: r.num, cells: &r.cells })
        });
    }

    /// Drops rows where any of `cols` is empty.
    pub fn drop_empty(&mut self, cols: &[&str]) {
        self.retain(|row| cols.iter().all(|c| !row.get(c).is_empty()));
    }

    /// Renames a column. A column already named `to` is replaced.
    pub fn rename(&mut self, from: &str, to: &str) {
        if from == to || !self.has_column(from) {
            return;
        }
        self.drop_columns(&[to]);
        if let Some(i) = self.col_index(from) {
            self.columns[i] = to.to_string();
        }
    }

    pub fn drop_columns(&mut self, names: &[&str]) {
        let keep: Vec<bool> =
            self.columns.iter().map(|c| !names.contains(&c.as_str())).collect();
        if keep.iter().all(|k| *k) {
            return;
        }
        fn retain_kept<T>(v: &mut Vec<T>, keep: &[bool]) {
            let mut i = 0;
            v.retain(|_| {
                i += 1;
                keep[i - 1]
            });
        }
        retain_kept(&mut self.columns, &keep);
        for row in &mut self.rows {
            retain_kept(&mut row.cells, &keep);
        }
    }

    /// Sets (adding or replacing) column `name`, computing each row's value
    /// from the current row.
    pub fn derive_column<F>(&mut self, name: &str, mut f: F) -> Result<(), ImportError>
    where
        F: FnMut(&Row) -> Result<Cell, ImportError>,
    {
        let values = self.rows().map(|row| f(&row)).collect::<Result<Vec<Cell>, _>>()?;
        let i = match self.col_index(name) {
            Some(i) => i,
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.cells.push(Cell::Empty);
                }
                self.columns.len() - 1
            }
        };
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.cells[i] = value;
        }
        Ok(())
    }

    /// Replaces every cell of an existing column with `f(cell)`.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> Result<(), ImportError>
    where
        F: FnMut(&Row, &Cell) -> Result<Cell, ImportError>,
    {
        self.require_columns(&[name])?;
        self.derive_column(name, |row| f(row, row.get(name)))
    }

    /// Projects the table onto `names`, in that order.
    pub fn select(&self, names: &[&str]) -> Result<RawTable, ImportError> {
        self.require_columns(names)?;
        let indexes: Vec<usize> =
            names.iter().filter_map(|n| self.col_index(n)).collect();
        Ok(RawTable {
            columns: names.iter().map(|n| n.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| RowData {
                    num: r.num,
                    cells: indexes.iter().map(|i| r.cells[*i].clone()).collect(),
                })
                .collect(),
        })
    }

    /// Strips surrounding whitespace from every text cell.
    /// Whitespace-only text becomes Empty.
    pub fn trim(&mut self) {
        for row in &mut self.rows {
            for cell in &mut row.cells {
                if let Cell::Text(s) = cell {
                    let trimmed = s.trim();
                    if trimmed.len() != s.len() {
                        *cell = Cell::text(trimmed);
                    }
                }
            }
        }
    }

    pub fn write_csv<W: std::io::Write>(&self, w: W) -> Result<(), String> {
        let mut csv_w = csv::WriterBuilder::new().has_headers(true).from_writer(w);
        csv_w.write_record(&self.columns).map_err(|e| e.to_string())?;
        for row in &self.rows {
            csv_w
                .write_record(row.cells.iter().map(|c| c.to_string()))
                .map_err(|e| e.to_string())?;
        }
        csv_w.flush().map_err(|e| e.to_string())
    }
}


#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::pipeline::error::ImportError;
    use crate::util::rw::StringBuffer;

    use super::testlib::text_table;
    use super::Cell;

    #[test]
    fn test_new_pads_and_truncates() {
        let t = text_table(&["A", "B"], &[&["1"], &["1", "2", "3"]]);
        assert_eq!(t.len(), 2);
        let rows: Vec<_> = t.rows().collect();
        assert_eq!(rows[0].get("B"), &Cell::Empty);
        assert_eq!(rows[1].str("B"), "2");
        assert_eq!(rows[1].get("C"), &Cell::Empty);
        assert_eq!(rows[1].num(), 2);
    }

    #[test]
    fn test_require_and_select() {
        let t = text_table(&["Date", "Symbol", "Amount", "Extra"], &[&["d", "s", "1", "x"]]);
        let sel = t.select(&["Amount", "Date"]).unwrap();
        assert_eq!(sel.columns(), &["Amount".to_string(), "Date".to_string()]);
        assert_eq!(sel.rows().next().unwrap().str("Amount"), "1");

        let err = t.select(&["Date", "Price", "Quantity"]).unwrap_err();
        assert_eq!(
            err,
            ImportError::Schema {
                missing: vec!["Price".to_string(), "Quantity".to_string()],
                found: vec!["Date", "Symbol", "Amount", "Extra"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            }
        );
    }

    #[test]
    fn test_retain_and_drop_empty() {
        let mut t = text_table(
            &["Action", "Symbol"],
            &[&["Buy", "AAPL"], &["Sell", ""], &["Hold", "MSFT"]],
        );
        t.drop_empty(&["Symbol"]);
        assert_eq!(t.len(), 2);
        t.retain(|r| r.str("Action") != "Hold");
        assert_eq!(t.len(), 1);
        // Row numbers survive filtering
        assert_eq!(t.rows().next().unwrap().num(), 1);
    }

    #[test]
    fn test_rename_derive_drop() {
        let mut t = text_table(&["Run Date", "Date", "Qty"], &[&["a", "b", "3"]]);
        t.rename("Run Date", "Date");
        assert_eq!(t.columns(), &["Date".to_string(), "Qty".to_string()]);
        assert_eq!(t.rows().next().unwrap().str("Date"), "a");

        t.derive_column("Contracts", |r| {
            let q: rust_decimal::Decimal = r.str("Qty").parse().map_err(|_| r.err("qty"))?;
            Ok(Cell::Num(q * dec!(-1)))
        })
        .unwrap();
        assert_eq!(t.rows().next().unwrap().get("Contracts"), &Cell::Num(dec!(-3)));

        t.map_column("Contracts", |_, c| match c {
            Cell::Num(d) => Ok(Cell::Num(d.abs())),
            _ => Ok(c.clone()),
        })
        .unwrap();
        assert_eq!(t.rows().next().unwrap().get("Contracts"), &Cell::Num(dec!(3)));

        t.drop_columns(&["Qty", "NotThere"]);
        assert_eq!(t.columns(), &["Date".to_string(), "Contracts".to_string()]);
        assert!(t.map_column("Qty", |_, c| Ok(c.clone())).is_err());
    }

    #[test]
    fn test_derive_error_names_row() {
        let mut t = text_table(&["Qty"], &[&["1"], &["x"]]);
        let err = t
            .derive_column("N", |r| {
                r.str("Qty")
                    .parse::<rust_decimal::Decimal>()
                    .map(Cell::Num)
                    .map_err(|_| r.err(format!("bad quantity '{}'", r.str("Qty"))))
            })
            .unwrap_err();
        assert_eq!(err, ImportError::Validation("Row 2: bad quantity 'x'".to_string()));
        assert!(!t.has_column("N"));
    }

    #[test]
    fn test_trim_and_csv() {
        let mut t = text_table(&["A", "B"], &[&["  x ", "   "]]);
        t.trim();
        let row = t.rows().next().unwrap();
        assert_eq!(row.str("A"), "x");
        assert!(row.get("B").is_empty());

        let mut buff = StringBuffer::new();
        t.write_csv(&mut buff).unwrap();
        assert_eq!(buff.as_str(), "A,B\nx,\n");
    }
}
