use super::Parser;

/// Parses a single `name=value` assignment, as given to `--setting` or
/// found in a `SET` statement. Names may be quoted with backticks or
/// double quotes; a single-quoted value loses its quotes.
pub struct SettingParser;

impl Parser for SettingParser {
    type Output = (String, String);

    fn from_str(input: &str) -> Result<Self::Output, &'static str> {
        let (name, value) = input
            .split_once('=')
            .ok_or("Expected a setting as name=value")?;

        let name = name.trim().trim_matches(|c| c == '"' || c == '`');
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err("Invalid setting name");
        }

        Ok((name.to_string(), unquote(value.trim())))
    }
}

fn unquote(value: &str) -> String {
    match value
        .strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
    {
        Some(inner) => inner.replace("\\'", "'").replace("\\\\", "\\"),
        None => value.to_string(),
    }
}
