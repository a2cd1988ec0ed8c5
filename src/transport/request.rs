use crate::query::{ExecutionContext, QueryError, Settings};

pub const LOG_QUERIES: &str = "log_queries";
pub const QUERY_ID: &str = "query_id";
pub const SESSION_ID: &str = "session_id";
pub const QUERY: &str = "query";
pub const SEND_PROGRESS_IN_HTTP_HEADERS: &str = "send_progress_in_http_headers";
pub const REPLACE_RUNNING_QUERY: &str = "replace_running_query";

/// Where the statement text comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryBody {
    Text(String),
    /// Body streamed from standard input. A literal query, if any, travels
    /// as the `query` parameter and the server prepends it to the body.
    Piped { query: Option<String> },
}

/// Settings for a user query: caller extras first, then the three the
/// client always owns, so extras can never replace them.
pub fn query_settings(ctx: &ExecutionContext, body: &QueryBody) -> Settings {
    let mut settings = ctx.settings.clone();

    if let QueryBody::Piped { query: Some(query) } = body {
        if !query.trim().is_empty() {
            settings.insert(QUERY.to_string(), query.clone());
        }
    }

    settings.insert(LOG_QUERIES.to_string(), "1".to_string());
    settings.insert(QUERY_ID.to_string(), ctx.query_id.clone());
    settings.insert(SESSION_ID.to_string(), ctx.session_id.clone());
    settings
}

/// Settings for internal service queries. They never carry the session
/// id: the session stays locked while the user's query runs.
pub fn service_settings() -> Settings {
    Settings::from([(LOG_QUERIES.to_string(), "0".to_string())])
}

pub fn kill_settings(query_id: &str) -> Settings {
    let mut settings = service_settings();
    settings.insert(REPLACE_RUNNING_QUERY.to_string(), "1".to_string());
    settings.insert(QUERY_ID.to_string(), query_id.to_string());
    settings
}

pub fn validate_settings(settings: &Settings) -> Result<(), QueryError> {
    for key in settings.keys() {
        let valid = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid {
            return Err(QueryError::InvalidSetting(key.clone()));
        }
    }

    Ok(())
}

/// Single-quoted SQL string literal.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn context(extra: &[(&str, &str)]) -> ExecutionContext {
        let settings = extra
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        ExecutionContext::new(
            "session-1",
            "default",
            "TabSeparated",
            settings,
            CancellationToken::new(),
        )
    }

    #[test]
    fn required_settings_are_always_present() {
        let ctx = context(&[("max_threads", "4")]);

        let settings = query_settings(&ctx, &QueryBody::Text("SELECT 1".to_string()));

        assert_eq!(settings[LOG_QUERIES], "1");
        assert_eq!(settings[QUERY_ID], ctx.query_id);
        assert_eq!(settings[SESSION_ID], "session-1");
        assert_eq!(settings["max_threads"], "4");
    }

    #[test]
    fn extras_cannot_override_required_settings() {
        let ctx = context(&[
            ("query_id", "spoofed"),
            ("session_id", "other"),
            ("log_queries", "0"),
        ]);

        let settings = query_settings(&ctx, &QueryBody::Text("SELECT 1".to_string()));

        assert_eq!(settings[QUERY_ID], ctx.query_id);
        assert_eq!(settings[SESSION_ID], "session-1");
        assert_eq!(settings[LOG_QUERIES], "1");
    }

    #[test]
    fn piped_body_moves_literal_query_to_a_parameter() {
        let ctx = context(&[]);

        let with_query = query_settings(
            &ctx,
            &QueryBody::Piped {
                query: Some("INSERT INTO t FORMAT CSV".to_string()),
            },
        );
        let without_query = query_settings(&ctx, &QueryBody::Piped { query: None });

        assert_eq!(with_query[QUERY], "INSERT INTO t FORMAT CSV");
        assert!(!without_query.contains_key(QUERY));
    }

    #[test]
    fn kill_settings_target_the_query() {
        let settings = kill_settings("abc");

        assert_eq!(settings[REPLACE_RUNNING_QUERY], "1");
        assert_eq!(settings[QUERY_ID], "abc");
        assert_eq!(settings[LOG_QUERIES], "0");
        assert!(!settings.contains_key(SESSION_ID));
    }

    #[test]
    fn rejects_setting_names_that_are_not_identifiers() {
        let mut settings = Settings::new();
        settings.insert("max threads".to_string(), "1".to_string());

        assert!(matches!(
            validate_settings(&settings),
            Err(QueryError::InvalidSetting(key)) if key == "max threads"
        ));
        assert!(validate_settings(&kill_settings("id")).is_ok());
    }

    #[test]
    fn quotes_literals() {
        assert_eq!(quote("it's"), "'it\\'s'");
        assert_eq!(quote("a\\b"), "'a\\\\b'");
    }
}
