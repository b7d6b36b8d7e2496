//! Natural-language questions to SQL
//!
//! The core never talks to a model directly. A [`Translator`] turns a
//! question plus a schema summary into SQL text; [`ask`] cleans that text,
//! runs it through the session and optionally asks for an explanation.

use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use regex::Regex;
use serde::Serialize;
use crate::classify::StatementKind;
use crate::result::{QueryResult, Table};
use crate::session::Session;
use crate::{Error, Result};

/// Rows included when a result is described to the backend
pub const EXPLAIN_MAX_ROWS: usize = 10;

/// A backend that writes SQL for a question
pub trait Translator {
    /// Produce SQL answering `question` against the database described by
    /// `schema`. The returned text may still carry code fences or labels.
    fn translate(&self, question: &str, schema: &str) -> Result<String>;

    /// Describe a result in relation to the question.
    ///
    /// Backends that cannot explain return `Ok(None)`.
    fn explain(&self, _question: &str, _sql: &str, _results: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

impl<F> Translator for F
where
    F: Fn(&str, &str) -> Result<String>,
{
    fn translate(&self, question: &str, schema: &str) -> Result<String> {
        self(question, schema)
    }
}

/// Prompt asking for a single SQLite query
pub fn build_prompt(question: &str, schema: &str) -> String {
    format!(
        "You are an SQL expert. Your task is to convert natural language questions into SQL queries.\n\n\
         Database schema:\n{}\n\
         User question: {}\n\n\
         Generate a valid SQLite SQL query that answers the user's question.\n\
         Only output a single SQL query, nothing else.\n",
        schema.trim_end(),
        question.trim()
    )
}

/// Prompt asking for a short explanation of a result
pub fn build_explain_prompt(question: &str, sql: &str, results: &str) -> String {
    format!(
        "The user asked: {}\n\n\
         The SQL query executed was: {}\n\n\
         The results were:\n{}\n\n\
         Please provide a concise explanation of these results in relation to the user's question.\n",
        question.trim(),
        sql.trim(),
        results.trim_end()
    )
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:[A-Za-z0-9_+-]*[ \t]*\r?\n)?(.*?)```").expect("valid fence regex")
    })
}

fn label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:sql\s*query|sqlquery|sql|query)\s*:\s*").expect("valid label regex")
    })
}

/// Strip Markdown fences and leading labels from generated SQL
pub fn clean_generated_sql(raw: &str) -> String {
    let mut text = match fence_regex().captures(raw) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).to_string(),
        None => raw.to_string(),
    };
    text = label_regex().replace(&text, "").into_owned();
    text.trim().trim_matches('`').trim().to_string()
}

/// Plain-text rendering of the first `max_rows` rows, for prompts
pub fn describe_rows(table: &Table, max_rows: usize) -> String {
    let mut out = table.columns.join(" | ");
    for row in table.rows.iter().take(max_rows) {
        out.push('\n');
        let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
        out.push_str(&cells.join(" | "));
    }
    if table.row_count() > max_rows {
        out.push_str(&format!("\n... {} more rows", table.row_count() - max_rows));
    }
    out
}

/// Translator that runs an external program: the prompt goes to its stdin
/// and SQL is read from its stdout
#[derive(Debug, Clone)]
pub struct CommandTranslator {
    program: String,
    args: Vec<String>,
}

impl CommandTranslator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, prompt: &str) -> Result<String> {
        tracing::debug!("Running translator: {} {:?}", self.program, self.args);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Translation(format!("failed to start {}: {}", self.program, e)))?;

        // the child may answer before it has read the whole prompt
        let writer = child.stdin.take().map(|mut stdin| {
            let bytes = prompt.as_bytes().to_vec();
            std::thread::spawn(move || stdin.write_all(&bytes))
        });

        let output = child.wait_with_output()?;

        if let Some(handle) = writer {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {
                    tracing::debug!("{} stopped reading the prompt early", self.program);
                }
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_) => return Err(Error::Translation("prompt writer thread panicked".to_string())),
            }
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Translation(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(Error::Translation(format!("{} produced no output", self.program)));
        }
        Ok(text)
    }
}

impl Translator for CommandTranslator {
    fn translate(&self, question: &str, schema: &str) -> Result<String> {
        self.run(&build_prompt(question, schema))
    }

    fn explain(&self, question: &str, sql: &str, results: &str) -> Result<Option<String>> {
        self.run(&build_explain_prompt(question, sql, results)).map(Some)
    }
}

/// A question, the SQL generated for it and what that SQL returned
#[derive(Debug, Serialize)]
pub struct Answer {
    pub question: String,
    pub sql: String,
    pub result: QueryResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Translate `question` against the session's schema and execute the SQL.
///
/// The generated SQL runs unvalidated through [`Session::execute`].
pub fn ask(session: &mut Session, translator: &dyn Translator, question: &str) -> Result<Answer> {
    let question = question.trim();
    if question.is_empty() {
        return Err(Error::Translation("question is empty".to_string()));
    }

    let schema = session.schema_overview()?.to_prompt_text();
    let raw = translator.translate(question, &schema)?;
    let sql = clean_generated_sql(&raw);
    if sql.is_empty() {
        return Err(Error::Translation("backend returned no SQL".to_string()));
    }

    if !StatementKind::of(&sql).is_data_returning() {
        tracing::warn!("Generated SQL modifies the database: {}", sql);
    }

    let result = session.execute(&sql)?;
    Ok(Answer {
        question: question.to_string(),
        sql,
        result,
        explanation: None,
    })
}

/// Like [`ask`], then ask the backend to explain a non-empty tabular result.
///
/// An explanation failure is logged and leaves `explanation` empty.
pub fn ask_and_explain(
    session: &mut Session,
    translator: &dyn Translator,
    question: &str,
) -> Result<Answer> {
    let mut answer = ask(session, translator, question)?;
    if let Some(table) = answer.result.as_table().filter(|t| !t.is_empty()) {
        let rows = describe_rows(table, EXPLAIN_MAX_ROWS);
        match translator.explain(&answer.question, &answer.sql, &rows) {
            Ok(explanation) => answer.explanation = explanation,
            Err(e) => tracing::warn!("Could not explain result: {}", e),
        }
    }
    Ok(answer)
}
