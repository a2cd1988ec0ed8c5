use std::{path::PathBuf, sync::LazyLock};

use regex::Regex;

use super::{Parser, SettingParser};

static FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^(.*?)\s*\bFORMAT\s+(\w+|"\w+"|`\w+`)\s*$"#).unwrap()
});
static OUTFILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(.*?)\s*\bINTO\s+OUTFILE\s+'((?:[^'\\]|\\.)+)'\s*$").unwrap()
});
static USE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)^\s*USE\s+(\w+|"\w+"|`\w+`)\s*$"#).unwrap());
static SET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)^\s*SET\s+(.+?)\s*$").unwrap());

/// A statement ready to send, with the client-side clauses taken off.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub query: String,
    pub format: Option<String>,
    pub outfile: Option<PathBuf>,
}

/// Strips a trailing `FORMAT <name>` and `INTO OUTFILE '<path>'` from a
/// statement; the client applies both itself.
pub struct StatementParser;

impl Parser for StatementParser {
    type Output = Statement;

    fn from_str(input: &str) -> Result<Self::Output, &'static str> {
        let mut query = input.trim().to_string();
        let mut format = None;
        let mut outfile = None;

        if let Some(caps) = FORMAT.captures(&query) {
            format = Some(caps[2].trim_matches(|c| c == '"' || c == '`').to_string());
            query = caps[1].to_string();
        }

        if let Some(caps) = OUTFILE.captures(&query) {
            outfile = Some(PathBuf::from(
                caps[2].replace("\\'", "'").replace("\\\\", "\\"),
            ));
            query = caps[1].to_string();
        }

        if query.trim().is_empty() {
            return Err("Empty statement");
        }

        Ok(Statement {
            query,
            format,
            outfile,
        })
    }
}

/// A change to session state made by a statement that succeeded.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionChange {
    Use(String),
    Set(Vec<(String, String)>),
}

impl SessionChange {
    /// `SET GLOBAL` and other forms that are not plain assignments are
    /// not session changes.
    pub fn detect(query: &str) -> Option<SessionChange> {
        if let Some(caps) = USE.captures(query) {
            let database = caps[1].trim_matches(|c| c == '"' || c == '`');
            return Some(SessionChange::Use(database.to_string()));
        }

        let assignments = SET.captures(query)?;
        let settings = split_assignments(&assignments[1])
            .iter()
            .map(|assignment| SettingParser::from_str(assignment))
            .collect::<Result<Vec<_>, _>>()
            .ok()?;

        Some(SessionChange::Set(settings))
    }
}

/// Splits on commas that are not inside single quotes.
fn split_assignments(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;

    for c in input.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '\'' => quoted = !quoted,
            ',' if !quoted => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current);

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Statement {
        StatementParser::from_str(input).unwrap()
    }

    #[test]
    fn plain_statement_is_untouched() {
        let statement = parse("SELECT * FROM numbers(3)");

        assert_eq!(statement.query, "SELECT * FROM numbers(3)");
        assert_eq!(statement.format, None);
        assert_eq!(statement.outfile, None);
    }

    #[test]
    fn trailing_format_is_removed() {
        let statement = parse("SELECT 1 format `JSONEachRow`");

        assert_eq!(statement.query, "SELECT 1");
        assert_eq!(statement.format.as_deref(), Some("JSONEachRow"));
    }

    #[test]
    fn outfile_before_format() {
        let statement = parse("SELECT 1 INTO OUTFILE '/tmp/it\\'s.csv' FORMAT CSV");

        assert_eq!(statement.query, "SELECT 1");
        assert_eq!(statement.format.as_deref(), Some("CSV"));
        assert_eq!(statement.outfile, Some(PathBuf::from("/tmp/it's.csv")));
    }

    #[test]
    fn format_inside_the_query_is_kept() {
        let statement = parse("SELECT formatReadableSize(1)");

        assert_eq!(statement.query, "SELECT formatReadableSize(1)");
        assert_eq!(statement.format, None);
    }

    #[test]
    fn detects_use() {
        assert_eq!(
            SessionChange::detect("use `analytics`"),
            Some(SessionChange::Use("analytics".to_string()))
        );
        assert_eq!(SessionChange::detect("SELECT 1"), None);
    }

    #[test]
    fn detects_set_with_several_assignments() {
        assert_eq!(
            SessionChange::detect("SET max_threads = 2, format_csv_delimiter = ','"),
            Some(SessionChange::Set(vec![
                ("max_threads".to_string(), "2".to_string()),
                ("format_csv_delimiter".to_string(), ",".to_string()),
            ]))
        );
    }

    #[test]
    fn set_global_is_not_a_session_change() {
        assert_eq!(SessionChange::detect("SET GLOBAL max_threads = 2"), None);
    }
}
