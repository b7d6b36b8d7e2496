use crate::{OutputMode, emit_success};
use anyhow::Context;
use owo_colors::OwoColorize;
use sqlsage::config::{default_config_path, write_config, SqlsageConfig};
use sqlsage::create::DatabaseSpec;
use sqlsage::ui::{self, Icons, Spinner, render_result, render_table, section, stats_table, success, summary_row};
use sqlsage::{ColumnInfo, Placement, QueryResult, Session, Translator, ask, ask_and_explain, create_database};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Default,
    Atomic,
    Each,
}

fn open_session(path: &Path) -> anyhow::Result<Session> {
    Session::from_source(path).with_context(|| format!("failed to open {}", path.display()))
}

fn banner(session: &Session) {
    ui::header(&format!("{}", session.path().display()));
    if session.is_temporary() {
        summary_row("note:", "loaded from a script into a temporary database; use `save` to keep it");
    }
}

pub fn run_init(
    output_mode: OutputMode,
    config_path: Option<&Path>,
    database: Option<std::path::PathBuf>,
    force: bool,
) -> anyhow::Result<()> {
    let path = config_path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    let config = SqlsageConfig {
        database: database.map(|d| d.display().to_string()),
        ..Default::default()
    };
    write_config(&path, &config, force)?;

    if output_mode.is_human() {
        success(&format!("Wrote {}", path.display()));
    } else {
        emit_success(output_mode, "init", serde_json::json!({ "config": path }))?;
    }
    Ok(())
}

/// What `info` shows for one table
struct TableInfo {
    columns: Vec<ColumnInfo>,
    preview: QueryResult,
    row_count: u64,
}

fn table_info(session: &Session, name: &str, limit: usize) -> sqlsage::Result<TableInfo> {
    Ok(TableInfo {
        columns: session.columns_of(name)?,
        preview: session.preview_of(name, limit)?,
        row_count: session.row_count_of(name)?,
    })
}

pub fn run_info(output_mode: OutputMode, db: &Path, limit: usize) -> anyhow::Result<()> {
    let session = open_session(db)?;
    let mut tables = Vec::new();
    if output_mode.is_human() {
        banner(&session);
    }

    for name in session.tables() {
        let info = match table_info(&session, name, limit) {
            Ok(info) => info,
            Err(e) => {
                if output_mode.is_human() {
                    section(&format!(" {} {} ", Icons::TABLE, name));
                    ui::error(&format!("Could not read {}: {}", name, e));
                } else {
                    tables.push(serde_json::json!({ "name": name, "error": e.to_string() }));
                }
                continue;
            }
        };

        if output_mode.is_human() {
            section(&format!(" {} {} ", Icons::TABLE, name));
            let schema: Vec<String> = info
                .columns
                .iter()
                .map(|c| {
                    let key = if c.is_primary_key() { format!(" {}", Icons::KEY) } else { String::new() };
                    format!("{} {}{}", c.name, ui::dim(&c.declared_type), key)
                })
                .collect();
            summary_row("columns:", &schema.join(", "));
            summary_row("rows:", &info.row_count.to_string());
            if let Some(table) = info.preview.as_table() {
                if !table.is_empty() {
                    println!("{}", render_table(table));
                }
            }
        } else {
            tables.push(serde_json::json!({
                "name": name,
                "columns": info.columns,
                "preview": info.preview,
                "row_count": info.row_count,
            }));
        }
    }

    if output_mode.is_human() {
        if session.tables().is_empty() {
            ui::warn("No tables found");
        } else {
            let count = session.tables().len().to_string();
            println!();
            println!("{}", stats_table(&[("Tables", count.as_str())]));
        }
    } else {
        emit_success(output_mode, "info", serde_json::json!({
            "database": session.path(),
            "tables": tables,
        }))?;
    }
    Ok(())
}

pub fn run_schema(output_mode: OutputMode, db: &Path) -> anyhow::Result<()> {
    let session = open_session(db)?;
    let overview = session.schema_overview()?;

    if !output_mode.is_human() {
        return emit_success(output_mode, "schema", serde_json::to_value(&overview)?);
    }

    banner(&session);
    if overview.is_empty() {
        ui::warn("No tables found");
        return Ok(());
    }
    for table in &overview.tables {
        section(&format!(" {} {} ", Icons::TABLE, table.name));
        for column in &table.columns {
            let declared = table.column_types.get(column).map(String::as_str).unwrap_or("");
            let key = if table.primary_key.contains(column) { format!(" {}", Icons::KEY) } else { String::new() };
            summary_row(column, &format!("{}{}", declared, key));
        }
        for fk in &table.foreign_keys {
            println!("  {} {} -> {}", Icons::LINK, fk.column, fk.target());
        }
    }
    Ok(())
}

pub fn run_query(output_mode: OutputMode, db: &Path, sql: &str, mode: QueryMode) -> anyhow::Result<()> {
    let mut session = open_session(db)?;

    if mode == QueryMode::Each {
        let outcomes = session.execute_batch(sql)?;
        if output_mode.is_human() {
            for outcome in &outcomes {
                match &outcome.outcome {
                    Ok(result) => {
                        println!("{} {}", Icons::CHECK, ui::muted(&outcome.statement));
                        println!("{}", render_result(result));
                    }
                    Err(e) => ui::error(&format!("[{}] {}", outcome.index, e)),
                }
            }
            let failed = outcomes.iter().filter(|o| !o.is_success()).count();
            summary_row("statements:", &format!("{} run, {} failed", outcomes.len(), failed));
        } else {
            let data: Vec<serde_json::Value> = outcomes
                .iter()
                .map(|o| match &o.outcome {
                    Ok(result) => serde_json::json!({ "index": o.index, "statement": o.statement, "result": result }),
                    Err(e) => serde_json::json!({ "index": o.index, "statement": o.statement, "error": e.to_string() }),
                })
                .collect();
            emit_success(output_mode, "query", serde_json::json!(data))?;
        }
        return Ok(());
    }

    let outcome = match mode {
        QueryMode::Atomic => session.execute_atomic(sql),
        _ => session.execute(sql),
    };
    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            if err.is_partial_batch() {
                ui::warn("Statements before the failing one were applied and not rolled back");
            }
            return Err(err.into());
        }
    };

    print_result(output_mode, "query", &result)
}

fn print_result(output_mode: OutputMode, command: &str, result: &QueryResult) -> anyhow::Result<()> {
    if output_mode.is_human() {
        match result {
            QueryResult::Status(_) => success(&render_result(result)),
            QueryResult::Tabular(_) => println!("{}", render_result(result)),
        }
        Ok(())
    } else {
        emit_success(output_mode, command, serde_json::to_value(result)?)
    }
}

pub fn run_ask(
    output_mode: OutputMode,
    db: &Path,
    translator: &dyn Translator,
    question: &str,
    explain: bool,
) -> anyhow::Result<()> {
    let mut session = open_session(db)?;

    let spinner = Spinner::new("Generating SQL...");
    let answer = if explain {
        ask_and_explain(&mut session, translator, question)
    } else {
        ask(&mut session, translator, question)
    };
    spinner.finish_and_clear();
    let answer = answer?;

    if !output_mode.is_human() {
        return emit_success(output_mode, "ask", serde_json::to_value(&answer)?);
    }

    println!("{} {}", Icons::BRAIN, answer.sql.style(ui::theme().sql.clone()));
    print_result(output_mode, "ask", &answer.result)?;
    if let Some(explanation) = &answer.explanation {
        section(" Explanation ");
        println!("{}", explanation);
    }
    Ok(())
}

pub fn run_save(output_mode: OutputMode, db: &Path, dest: &Path) -> anyhow::Result<()> {
    let session = open_session(db)?;
    let bytes = session.save_as(dest)?;

    if output_mode.is_human() {
        ui::info("source", &session.path().display().to_string());
        success(&format!("Saved to {} ({})", dest.display(), ui::human_bytes(bytes)));
    } else {
        emit_success(output_mode, "save", serde_json::json!({ "path": dest, "bytes": bytes }))?;
    }
    Ok(())
}

pub fn run_backup(output_mode: OutputMode, db: &Path, to: Option<&Path>) -> anyhow::Result<()> {
    let session = open_session(db)?;
    let path = session.backup(to)?;

    if output_mode.is_human() {
        success(&format!("Backup written to {}", path.display()));
        if session.is_temporary() && to.is_none() {
            ui::warn("The backup sits next to a temporary database and is removed with it; pass --to");
        }
    } else {
        emit_success(output_mode, "backup", serde_json::json!({ "path": path }))?;
    }
    Ok(())
}

pub fn run_export(output_mode: OutputMode, db: &Path, out: Option<&Path>) -> anyhow::Result<()> {
    let session = open_session(db)?;
    let bytes = session.export_bytes()?;
    let digest = blake3::hash(&bytes).to_hex().to_string();

    if let Some(out) = out {
        sqlsage::config::ensure_parent_dir(out)?;
        std::fs::write(out, &bytes).with_context(|| format!("failed to write {}", out.display()))?;
    }

    if output_mode.is_human() {
        let size = ui::human_bytes(bytes.len() as u64);
        let written = out.map(|p| p.display().to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "{}",
            stats_table(&[("Size", size.as_str()), ("BLAKE3", digest.as_str()), ("Written to", written.as_str())])
        );
    } else {
        emit_success(output_mode, "export", serde_json::json!({
            "bytes": bytes.len(),
            "blake3": digest,
            "path": out,
        }))?;
    }
    Ok(())
}

pub fn run_create(output_mode: OutputMode, name: &str, spec: &Path, permanent: bool) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(spec).with_context(|| format!("failed to read {}", spec.display()))?;
    let spec = DatabaseSpec::from_toml(&text).with_context(|| format!("invalid table spec {}", spec.display()))?;
    let placement = if permanent { Placement::Permanent } else { Placement::Temporary };

    let session = create_database(name, &spec.tables, placement)?;

    if output_mode.is_human() {
        success(&format!("Created {}", session.path().display()));
        summary_row("tables:", &session.tables().join(", "));
        if session.is_temporary() {
            ui::warn("Temporary database: it is removed when this command exits (use --permanent)");
        }
    } else {
        emit_success(output_mode, "create", serde_json::json!({
            "path": session.path(),
            "tables": session.tables(),
            "temporary": session.is_temporary(),
        }))?;
    }
    Ok(())
}

pub fn run_version(output_mode: OutputMode) -> anyhow::Result<()> {
    if output_mode.is_human() {
        println!(
            "{} {}",
            "sqlsage".bold().style(ui::theme().info.clone()),
            format!("Version {}", env!("CARGO_PKG_VERSION")).bold()
        );
    } else {
        let data = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
        });
        emit_success(output_mode, "version", data)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const SHOP: &str = "
        CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
        CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER REFERENCES customers(id), total REAL);
        INSERT INTO customers(name) VALUES ('Ann'), ('Bo');
        INSERT INTO orders(customer_id, total) VALUES (1, 9.5);
    ";

    fn shop() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("shop.db");
        Session::open_path(&db).unwrap().execute(SHOP).unwrap();
        (dir, db)
    }

    fn count(db: &Path, table: &str) -> u64 {
        Session::open_path(db).unwrap().row_count_of(table).unwrap()
    }

    #[test]
    fn test_schema_command() {
        let (_dir, db) = shop();
        run_schema(OutputMode::Json, &db).unwrap();
        run_schema(OutputMode::Human, &db).unwrap();
    }

    #[test]
    fn test_info_command() {
        let (_dir, db) = shop();
        run_info(OutputMode::Json, &db, 1).unwrap();
        run_info(OutputMode::Human, &db, 5).unwrap();
    }

    #[test]
    fn test_table_info_failure_is_per_table() {
        let (_dir, db) = shop();
        let session = Session::open_path(&db).unwrap();

        let other = rusqlite::Connection::open(&db).unwrap();
        other.execute_batch("DROP TABLE orders").unwrap();

        assert!(table_info(&session, "orders", 5).is_err());
        let customers = table_info(&session, "customers", 5).unwrap();
        assert_eq!(customers.row_count, 2);
        assert_eq!(customers.columns.len(), 2);
    }

    #[test]
    fn test_query_command_modes() {
        let (_dir, db) = shop();
        run_query(OutputMode::Json, &db, "SELECT * FROM customers", QueryMode::Default).unwrap();
        run_query(OutputMode::Json, &db, "INSERT INTO customers(name) VALUES ('Cy')", QueryMode::Default).unwrap();
        assert_eq!(count(&db, "customers"), 3);

        let err = run_query(
            OutputMode::Json,
            &db,
            "INSERT INTO customers(name) VALUES ('Di'); BAD SQL",
            QueryMode::Atomic,
        );
        assert!(err.is_err());
        assert_eq!(count(&db, "customers"), 3);

        let err = run_query(
            OutputMode::Json,
            &db,
            "INSERT INTO customers(name) VALUES ('Di'); BAD SQL",
            QueryMode::Default,
        );
        assert!(err.is_err());
        assert_eq!(count(&db, "customers"), 4);

        // failures are reported per statement, not raised
        run_query(
            OutputMode::Json,
            &db,
            "BAD SQL; INSERT INTO customers(name) VALUES ('Ed'); SELECT 1",
            QueryMode::Each,
        )
        .unwrap();
        run_query(OutputMode::Human, &db, "SELECT 1; BAD SQL", QueryMode::Each).unwrap();
        assert_eq!(count(&db, "customers"), 5);
    }

    #[test]
    fn test_query_command_on_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("seed.sql");
        std::fs::write(&script, SHOP).unwrap();
        run_query(OutputMode::Human, &script, "SELECT COUNT(*) FROM orders", QueryMode::Default).unwrap();
    }

    #[test]
    fn test_save_command() {
        let (dir, db) = shop();
        let dest = dir.path().join("copies").join("saved.db");
        run_save(OutputMode::Json, &db, &dest).unwrap();
        assert_eq!(count(&dest, "customers"), 2);
    }

    #[test]
    fn test_backup_command() {
        let (dir, db) = shop();
        let explicit = dir.path().join("explicit.db");
        run_backup(OutputMode::Json, &db, Some(&explicit)).unwrap();
        assert_eq!(count(&explicit, "orders"), 1);

        run_backup(OutputMode::Json, &db, None).unwrap();
        let automatic = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("shop_backup_"))
            .count();
        assert_eq!(automatic, 1);
    }

    #[test]
    fn test_export_command() {
        let (dir, db) = shop();
        let out = dir.path().join("export").join("shop.bin");
        run_export(OutputMode::Json, &db, Some(&out)).unwrap();
        let bytes = std::fs::read(&out).unwrap();
        assert!(bytes.starts_with(b"SQLite format 3\0"));

        run_export(OutputMode::Human, &db, None).unwrap();
    }

    #[test]
    fn test_create_command() {
        let dir = tempfile::tempdir().unwrap();
        let spec = dir.path().join("tables.toml");
        std::fs::write(
            &spec,
            "[[table]]\nname = \"notes\"\ncolumns = [{ name = \"id\", type = \"INTEGER\", primary_key = true }, { name = \"body\" }]\n",
        )
        .unwrap();
        run_create(OutputMode::Json, "notes", &spec, false).unwrap();

        std::fs::write(&spec, "").unwrap();
        assert!(run_create(OutputMode::Json, "empty", &spec, false).is_err());
        assert!(run_create(OutputMode::Json, "missing", &dir.path().join("nope.toml"), false).is_err());
    }

    #[test]
    fn test_init_command() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("sqlsage.toml");
        run_init(OutputMode::Json, Some(&config), Some(PathBuf::from("shop.db")), false).unwrap();
        assert!(run_init(OutputMode::Json, Some(&config), None, false).is_err());
        run_init(OutputMode::Json, Some(&config), None, true).unwrap();
    }

    #[test]
    fn test_ask_command() {
        let (_dir, db) = shop();
        let translator = |_: &str, schema: &str| -> sqlsage::Result<String> {
            assert!(schema.contains("Table: orders"));
            Ok("```sql\nSELECT SUM(total) FROM orders\n```".to_string())
        };
        run_ask(OutputMode::Json, &db, &translator, "total sales?", false).unwrap();
        run_ask(OutputMode::Human, &db, &translator, "total sales?", true).unwrap();
    }

    #[test]
    fn test_version_command() {
        run_version(OutputMode::Json).unwrap();
        run_version(OutputMode::Human).unwrap();
    }
}
