use std::error::Error;

use rustyline::{error::ReadlineError, DefaultEditor};
use tracing::debug;

use crate::{
    config::ConnectionSettings,
    parsers::{Command, LineBuffer, Parser as _, Pending, StatementParser},
    session::Session,
    transport::HttpTransport,
};

const PROMPT: &str = ":) ";
const CONTINUATION_PROMPT: &str = ":-] ";

const HELP: &str = r#"
Commands:
?, help, \?, \h  - show this help
exit, quit, logout, q, :q, \q - leave (Ctrl-D works too)
pager <command>  - send results through a pager, e.g. "pager less -S -R"
nopager          - print results directly again

Statements end with:
;, \g            - execute
\G               - execute with the Vertical format
\c               - discard the statement

Shortcuts:
\s               - server status
\l               - list databases
\d               - show tables
\p               - list running queries

A trailing FORMAT <name> picks the output format and a trailing
INTO OUTFILE '<path>' writes the result to a new local file.
Ctrl-C cancels a running query or clears the current statement.
"#;

pub async fn shell(
    mut session: Session,
    connection: &ConnectionSettings,
    transport: &HttpTransport,
) -> Result<bool, Box<dyn Error>> {
    println!("houseq {}", env!("CARGO_PKG_VERSION"));
    println!(
        "Connecting to database {} at {} as user {}.",
        connection.database,
        connection.address(),
        connection.user
    );

    let version = transport.server_version().await?;
    println!("Connected to ClickHouse server version {}.\n", version);

    let mut editor = DefaultEditor::new()?;
    let mut buffer = LineBuffer::default();

    loop {
        let prompt = if buffer.is_empty() {
            PROMPT
        } else {
            CONTINUATION_PROMPT
        };

        // The editor blocks on the terminal; keep the runtime's other
        // workers free while it waits.
        let line = match tokio::task::block_in_place(|| editor.readline(prompt)) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        match buffer.push(&line) {
            Pending::Skip | Pending::Continue => {}
            Pending::Command(Command::Exit) => break,
            Pending::Command(Command::Help) => session.output().service_msg(HELP),
            Pending::Command(Command::Pager(command)) => {
                session
                    .output()
                    .service_msg(&format!("Setting pager to: {}\n", command));
                session.output().set_pager(&command);
            }
            Pending::Command(Command::NoPager) => {
                session.output().service_msg("Resetting pager\n");
                session.output().reset_pager();
            }
            Pending::Execute { query, vertical } => {
                if let Err(e) = editor.add_history_entry(query.as_str()) {
                    debug!("Failed to add history entry: {}", e);
                }

                let statement = match StatementParser::from_str(&query) {
                    Ok(statement) => statement,
                    Err(e) => {
                        session.output().service_msg(&format!("{}\n", e));
                        continue;
                    }
                };

                if let Err(e) = session.run_statement(statement, vertical).await {
                    session.output().service_msg(&format!("\n{}\n\n", e));
                }
            }
        }
    }

    println!("Bye.");

    Ok(true)
}
