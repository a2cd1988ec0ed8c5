use std::sync::LazyLock;

use regex::Regex;

use super::Parser;

static EXIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:(?:exit|quit|logout)\s*;?|q|:q|\\q)$").unwrap());
static HELP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(?:help|\?|\\\?|\\h)$").unwrap());
static PAGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^pager\s+(.+?)\s*;?$").unwrap());
static NOPAGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^nopager\s*;?$").unwrap());

pub const STATUS_QUERY: &str = "SELECT * FROM (
    SELECT name, value FROM system.build_options
    WHERE name IN ('VERSION_FULL', 'VERSION_DESCRIBE', 'SYSTEM')
    UNION ALL
    SELECT 'currentDatabase', currentDatabase()
    UNION ALL
    SELECT 'hostName', hostName()
    UNION ALL
    SELECT 'timezone', timezone()
    UNION ALL
    SELECT 'uptime', toString(uptime())
) ORDER BY name";
pub const DATABASES_QUERY: &str = "SHOW DATABASES";
pub const TABLES_QUERY: &str = "SHOW TABLES";
pub const PROCESSES_QUERY: &str =
    "SELECT query_id, user, address, elapsed, read_rows, memory_usage FROM system.processes";

/// Shell commands that are handled locally instead of being sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Exit,
    Help,
    Pager(String),
    NoPager,
}

pub struct CommandParser;

impl Parser for CommandParser {
    type Output = Command;

    fn from_str(input: &str) -> Result<Self::Output, &'static str> {
        let input = input.trim();

        if EXIT.is_match(input) {
            return Ok(Command::Exit);
        }
        if HELP.is_match(input) {
            return Ok(Command::Help);
        }
        if NOPAGER.is_match(input) {
            return Ok(Command::NoPager);
        }
        if let Some(caps) = PAGER.captures(input) {
            return Ok(Command::Pager(caps[1].to_string()));
        }

        Err("Not a shell command")
    }
}

/// What the shell should do after a line was entered.
#[derive(Debug, Clone, PartialEq)]
pub enum Pending {
    /// Nothing to do; prompt again.
    Skip,
    /// The statement is incomplete; prompt for more.
    Continue,
    Command(Command),
    Execute { query: String, vertical: bool },
}

/// Collects prompt lines into statements.
#[derive(Debug, Default)]
pub struct LineBuffer {
    lines: Vec<String>,
}

impl LineBuffer {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn push(&mut self, line: &str) -> Pending {
        let line = line.trim();

        if line.is_empty() {
            return Pending::Skip;
        }

        // Local commands only start a statement, never continue one.
        if self.lines.is_empty() {
            if let Ok(command) = CommandParser::from_str(line) {
                return Pending::Command(command);
            }
        }

        if line.ends_with("\\c") {
            self.clear();
            return Pending::Skip;
        }

        for (suffix, query) in [
            ("\\s", STATUS_QUERY),
            ("\\l", DATABASES_QUERY),
            ("\\d", TABLES_QUERY),
            ("\\p", PROCESSES_QUERY),
        ] {
            if line.ends_with(suffix) {
                self.clear();
                return Pending::Execute {
                    query: query.to_string(),
                    vertical: false,
                };
            }
        }

        let (rest, vertical) = if let Some(rest) = line.strip_suffix("\\G") {
            (rest, true)
        } else if let Some(rest) = line.strip_suffix("\\g") {
            (rest, false)
        } else if line.ends_with(';') {
            (line.trim_end_matches(';'), false)
        } else {
            self.lines.push(line.to_string());
            return Pending::Continue;
        };

        self.lines.push(rest.to_string());
        let query = self.lines.join("\n").trim().to_string();
        self.clear();

        if query.is_empty() {
            return Pending::Skip;
        }

        Pending::Execute { query, vertical }
    }
}
