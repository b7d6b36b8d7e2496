use tabled::{builder::Builder, settings::Style, Table as Grid, Tabled};
use crate::result::{QueryResult, Table};

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
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
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Grid::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn stats_table(stats: &[(&str, &str)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

/// Grid of a tabular result; header only when there are no rows
pub fn render_table(table: &Table) -> String {
    let mut builder = Builder::default();
    builder.push_record(table.columns.iter().cloned());
    for row in &table.rows {
        builder.push_record(row.iter().map(ToString::to_string));
    }
    builder.build().with(Style::rounded()).to_string()
}

pub fn render_result(result: &QueryResult) -> String {
    match result {
        QueryResult::Tabular(table) => {
            let noun = if table.row_count() == 1 { "row" } else { "rows" };
            format!("{}\n{} {}", render_table(table), table.row_count(), noun)
        }
        QueryResult::Status(status) => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{Status, Value};

    #[test]
    fn test_render_table_contains_cells() {
        let table = Table::new(
            vec!["id".to_string(), "name".to_string()],
            vec![
                vec![Value::Integer(1), Value::Text("Ann".to_string())],
                vec![Value::Integer(2), Value::Null],
            ],
        );
        let out = render_result(&QueryResult::Tabular(table));
        assert!(out.contains("name"));
        assert!(out.contains("Ann"));
        assert!(out.contains("NULL"));
        assert!(out.ends_with("2 rows"));
    }

    #[test]
    fn test_render_status() {
        let out = render_result(&QueryResult::Status(Status::success(0, 1)));
        assert!(out.starts_with("Query executed successfully"));
    }

    #[test]
    fn test_stats_table() {
        assert!(stats_table(&[]).is_empty());
        let out = stats_table(&[("Tables", "3")]);
        assert!(out.contains("Metric"));
        assert!(out.contains("Tables"));
    }
}
