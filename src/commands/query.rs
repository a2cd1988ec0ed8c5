use std::{
    error::Error,
    io::{self, IsTerminal},
    sync::Arc,
};

use tracing::debug;

use crate::{
    config::Config,
    executor::QueryExecutor,
    output::Output,
    session::{Session, SessionOptions},
    transport::{HttpTransport, QueryBody, TAB_SEPARATED},
};

use super::{shell::shell, QueryArgs};

const PRETTY_COMPACT: &str = "PrettyCompact";

/// Runs the shell when attached to a terminal without `--query`, and a
/// single batch execution otherwise. Returns whether everything ran
/// successfully.
pub async fn query(args: QueryArgs) -> Result<bool, Box<dyn Error>> {
    let config = Config::load_or_default();
    let connection = args.connection(&config)?;
    let progress_mode = args.progress_mode(&config);

    let transport = Arc::new(HttpTransport::new(connection.clone())?);
    let executor = QueryExecutor::new(transport.clone(), progress_mode);

    let interactive =
        io::stdin().is_terminal() && io::stdout().is_terminal() && args.query.is_none();
    debug!(
        "Connecting to {} (interactive: {}, progress: {})",
        connection.address(),
        interactive,
        progress_mode
    );

    let mut output = Output::stdio();
    let default_format = if interactive {
        if let Some(pager) = args.pager.as_ref().or(config.pager.as_ref()) {
            output.set_pager(pager);
        }
        args.format(&config, PRETTY_COMPACT)
    } else {
        args.format(&config, TAB_SEPARATED)
    };

    let options = SessionOptions {
        default_format,
        interactive,
        progress: interactive || args.progress,
        time: interactive || args.time,
        stats: args.stats,
    };
    let session = Session::new(
        executor,
        &connection.database,
        args.settings(),
        output,
        options,
    );

    if interactive {
        return shell(session, &connection, &transport).await;
    }

    batch(session, &args).await
}

async fn batch(mut session: Session, args: &QueryArgs) -> Result<bool, Box<dyn Error>> {
    let body = if !io::stdin().is_terminal() {
        QueryBody::Piped {
            query: args.query.clone(),
        }
    } else {
        match &args.query {
            Some(query) => QueryBody::Text(query.clone()),
            None => return Err("No query given: use --query or pipe one on stdin".into()),
        }
    };

    if args.echo {
        if let Some(query) = &args.query {
            session.output().service_msg(&format!("{}\n", query));
        }
    }

    let format = session.default_format().to_string();
    let outcome = session.execute(body, &format, None).await?;

    Ok(outcome.is_success())
}
