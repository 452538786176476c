use std::collections::BTreeMap;

use tabled::{settings::Style, Table as TabledTable, Tabled};

use crate::table::Table;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Table")]
    pub label: String,
    #[tabled(rename = "Rows")]
    pub value: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            label: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        TabledTable::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Row counts in schema order, one line per table
pub fn counts_table(counts: &BTreeMap<Table, usize>) -> String {
    let mut builder = TableBuilder::new();
    for table in Table::all() {
        let count = counts.get(table).copied().unwrap_or(0);
        builder.add_row(table.as_str(), &count.to_string());
    }
    builder.build()
}
