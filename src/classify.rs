//! Statement classification
//!
//! Pure text logic used by the session before anything touches the
//! database:
//! - `StatementKind::of` decides data-returning vs. mutating from the
//!   leading keyword
//! - `split_statements` cuts a script into individual statements

use serde::Serialize;

/// Leading keywords whose statements produce rows
pub const DATA_RETURNING_KEYWORDS: &[&str] = &["SELECT", "WITH", "PRAGMA"];

/// How a statement is executed and what it returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// SELECT / WITH / PRAGMA: runs as one statement, yields a table
    DataReturning,
    /// Everything else: split, run in sequence, yields a status
    Mutating,
}

impl StatementKind {
    /// Classify by leading keyword, case-insensitive.
    ///
    /// Leading whitespace, comments and opening parentheses are skipped.
    /// Input without any keyword counts as mutating.
    pub fn of(sql: &str) -> Self {
        match leading_keyword(sql) {
            Some(kw) if DATA_RETURNING_KEYWORDS.contains(&kw.as_str()) => StatementKind::DataReturning,
            _ => StatementKind::Mutating,
        }
    }

    pub fn is_data_returning(self) -> bool {
        self == StatementKind::DataReturning
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::DataReturning => "data-returning",
            StatementKind::Mutating => "mutating",
        }
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// First keyword of the statement, uppercased
pub fn leading_keyword(sql: &str) -> Option<String> {
    let rest = skip_trivia(sql);
    let word: String = rest.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    if word.is_empty() {
        None
    } else {
        Some(word.to_ascii_uppercase())
    }
}

fn skip_trivia(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        let trimmed = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(after) = trimmed.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(i) => &after[i + 1..],
                None => "",
            };
        } else if let Some(after) = trimmed.strip_prefix("/*") {
            rest = match after.find("*/") {
                Some(i) => &after[i + 2..],
                None => "",
            };
        } else {
            return trimmed;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Normal,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Accumulates one statement at a time
#[derive(Default)]
struct Splitter {
    statements: Vec<String>,
    current: String,
    word: String,
    has_content: bool,
    words_seen: usize,
    creates: bool,
    in_trigger: bool,
    block_depth: usize,
}

impl Splitter {
    fn finish_word(&mut self) {
        if self.word.is_empty() {
            return;
        }
        let upper = self.word.to_uppercase();
        self.word.clear();

        if self.words_seen == 0 {
            self.creates = upper == "CREATE";
        }
        // CREATE [TEMP|TEMPORARY] TRIGGER
        if self.creates && self.words_seen <= 2 && upper == "TRIGGER" {
            self.in_trigger = true;
        }
        self.words_seen += 1;

        if self.in_trigger {
            match upper.as_str() {
                "BEGIN" | "CASE" => self.block_depth += 1,
                "END" if self.block_depth > 0 => self.block_depth -= 1,
                _ => {}
            }
        }
    }

    fn flush(&mut self) {
        self.finish_word();
        let text = self.current.trim();
        if self.has_content && !text.is_empty() {
            self.statements.push(text.to_string());
        }
        self.current.clear();
        self.has_content = false;
        self.words_seen = 0;
        self.creates = false;
        self.in_trigger = false;
        self.block_depth = 0;
    }
}

/// Split SQL text into non-empty, trimmed statements.
///
/// Semicolons inside string literals, quoted identifiers, comments and
/// `CREATE TRIGGER ... BEGIN ... END` bodies do not terminate a statement.
/// Fragments made only of whitespace or comments are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut splitter = Splitter::default();
    let mut state = LexState::Normal;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match state {
            LexState::Normal => {
                if c.is_alphanumeric() || c == '_' {
                    splitter.word.push(c);
                    splitter.current.push(c);
                    splitter.has_content = true;
                    i += 1;
                    continue;
                }
                splitter.finish_word();

                match (c, next) {
                    ('\'' | '"' | '`', _) => {
                        state = LexState::Quoted(c);
                        splitter.has_content = true;
                        splitter.current.push(c);
                    }
                    ('[', _) => {
                        state = LexState::Quoted(']');
                        splitter.has_content = true;
                        splitter.current.push(c);
                    }
                    ('-', Some('-')) => {
                        state = LexState::LineComment;
                        splitter.current.push_str("--");
                        i += 1;
                    }
                    ('/', Some('*')) => {
                        state = LexState::BlockComment;
                        splitter.current.push_str("/*");
                        i += 1;
                    }
                    (';', _) if splitter.block_depth == 0 => splitter.flush(),
                    _ => {
                        if !c.is_whitespace() {
                            splitter.has_content = true;
                        }
                        splitter.current.push(c);
                    }
                }
            }
            LexState::Quoted(close) => {
                splitter.current.push(c);
                if c == close {
                    state = LexState::Normal;
                }
            }
            LexState::LineComment => {
                splitter.current.push(c);
                if c == '\n' {
                    state = LexState::Normal;
                }
            }
            LexState::BlockComment => {
                splitter.current.push(c);
                if c == '*' && next == Some('/') {
                    splitter.current.push('/');
                    i += 1;
                    state = LexState::Normal;
                }
            }
        }
        i += 1;
    }

    splitter.flush();
    splitter.statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_returning_keywords() {
        assert_eq!(StatementKind::of("SELECT * FROM t"), StatementKind::DataReturning);
        assert_eq!(StatementKind::of("  select 1"), StatementKind::DataReturning);
        assert_eq!(
            StatementKind::of("WITH x AS (SELECT 1) SELECT * FROM x"),
            StatementKind::DataReturning
        );
        assert_eq!(StatementKind::of("PRAGMA table_info(x)"), StatementKind::DataReturning);
        assert_eq!(
            StatementKind::of("-- comment\n/* block */ (SELECT 1)"),
            StatementKind::DataReturning
        );
    }

    #[test]
    fn test_mutating_keywords() {
        for sql in [
            "INSERT INTO t VALUES (1)",
            "update t set x = 1",
            "DELETE FROM t",
            "CREATE TABLE t(x)",
            "ALTER TABLE t ADD y",
            "DROP TABLE t",
            "",
            "SELECTED",
        ] {
            assert_eq!(StatementKind::of(sql), StatementKind::Mutating, "{sql}");
        }
    }

    #[test]
    fn test_leading_keyword() {
        assert_eq!(leading_keyword("  pragma foreign_keys"), Some("PRAGMA".to_string()));
        assert_eq!(leading_keyword("-- only a comment"), None);
        assert_eq!(leading_keyword(";"), None);
    }

    #[test]
    fn test_split_simple_batch() {
        let stmts = split_statements("CREATE TABLE a(x INT); BAD SQL; CREATE TABLE b(x INT);");
        assert_eq!(stmts, vec!["CREATE TABLE a(x INT)", "BAD SQL", "CREATE TABLE b(x INT)"]);
    }

    #[test]
    fn test_split_ignores_quoted_semicolons() {
        let stmts = split_statements(
            "INSERT INTO t VALUES ('a;b', 'it''s'); INSERT INTO \"we;ird\" VALUES (1); SELECT [x;y] FROM t",
        );
        assert_eq!(stmts.len(), 3);
        assert_eq!(stmts[0], "INSERT INTO t VALUES ('a;b', 'it''s')");
        assert_eq!(stmts[1], "INSERT INTO \"we;ird\" VALUES (1)");
    }

    #[test]
    fn test_split_drops_empty_and_comment_only() {
        assert!(split_statements("  ;; ;\n ").is_empty());
        let stmts = split_statements("-- drop; this\nSELECT 1; /* x; y */");
        assert_eq!(stmts, vec!["-- drop; this\nSELECT 1"]);
    }

    #[test]
    fn test_split_keeps_trigger_body_together() {
        let sql = "CREATE TABLE log(msg TEXT);
CREATE TRIGGER t_ins AFTER INSERT ON items BEGIN
    INSERT INTO log VALUES (CASE WHEN new.x > 0 THEN 'pos' ELSE 'neg' END);
    INSERT INTO log VALUES ('done');
END;
INSERT INTO items VALUES (1);";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 3);
        assert!(stmts[1].starts_with("CREATE TRIGGER"));
        assert!(stmts[1].ends_with("END"));
        assert_eq!(stmts[2], "INSERT INTO items VALUES (1)");
    }

    #[test]
    fn test_trigger_word_in_column_name_does_not_glue_statements() {
        let stmts = split_statements("CREATE TABLE t(trigger TEXT); INSERT INTO t VALUES ('x')");
        assert_eq!(stmts.len(), 2);
    }
}
