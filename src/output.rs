use std::{
    fs::{File, OpenOptions},
    io::{self, BufWriter, Write},
    path::PathBuf,
    process::{Child, ChildStdin, Command, Stdio},
};

use tracing::{debug, warn};

enum Sink {
    Console,
    Pager { child: Child, stdin: ChildStdin },
    File(BufWriter<File>),
}

/// The single destination for query output, plus the service channel for
/// messages about the query.
///
/// A pager or output file is only acquired by [`setup`] and always given
/// back by [`release`]; mode switches happen between executions.
///
/// [`setup`]: Output::setup
/// [`release`]: Output::release
pub struct Output {
    console: Box<dyn Write + Send>,
    service: Box<dyn Write + Send>,
    pager: Option<String>,
    outfile: Option<PathBuf>,
    sink: Sink,
}

impl Output {
    pub fn stdio() -> Self {
        Self::with_writers(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    pub fn with_writers(console: Box<dyn Write + Send>, service: Box<dyn Write + Send>) -> Self {
        Output {
            console,
            service,
            pager: None,
            outfile: None,
            sink: Sink::Console,
        }
    }

    pub fn pager(&self) -> Option<&str> {
        self.pager.as_deref()
    }

    pub fn set_pager(&mut self, command: &str) {
        let command = command.trim();
        self.pager = (!command.is_empty()).then(|| command.to_string());
    }

    pub fn reset_pager(&mut self) {
        self.pager = None;
    }

    /// Sends the next execution to `path`; the file must not exist yet.
    pub fn set_outfile(&mut self, path: impl Into<PathBuf>) {
        self.outfile = Some(path.into());
    }

    pub fn is_console(&self) -> bool {
        matches!(self.sink, Sink::Console)
    }

    pub fn is_pager(&self) -> bool {
        matches!(self.sink, Sink::Pager { .. })
    }

    /// Activates the configured sink. A pager that cannot start or a file
    /// that cannot be created leaves the console in place; existing files
    /// are never overwritten.
    pub fn setup(&mut self) {
        if let Some(path) = self.outfile.take() {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    debug!("Writing output to {}", path.display());
                    self.sink = Sink::File(BufWriter::new(file));
                    return;
                }
                Err(e) => {
                    self.service_msg(&format!("Unable to write to {}: {}\n", path.display(), e));
                }
            }
        }

        if let Some(command) = self.pager.clone() {
            match spawn_pager(&command) {
                Ok((child, stdin)) => {
                    debug!("Paging output through {:?}", command);
                    self.sink = Sink::Pager { child, stdin };
                    return;
                }
                Err(e) => {
                    warn!("Failed to start pager {:?}: {}", command, e);
                    self.service_msg(&format!("Pager error: {}\n", e));
                }
            }
        }

        self.sink = Sink::Console;
    }

    /// Returns to the console, closing the pager's input and waiting for
    /// it to exit, or flushing and closing the output file.
    pub fn release(&mut self) -> io::Result<()> {
        match std::mem::replace(&mut self.sink, Sink::Console) {
            Sink::Console => self.console.flush(),
            Sink::Pager { mut child, stdin } => {
                drop(stdin);
                child.wait().map(|_| ())
            }
            Sink::File(mut writer) => writer.flush(),
        }
    }

    pub fn data(&mut self) -> &mut dyn Write {
        match &mut self.sink {
            Sink::Console => &mut self.console,
            Sink::Pager { stdin, .. } => stdin,
            Sink::File(writer) => writer,
        }
    }

    pub fn service(&mut self) -> &mut dyn Write {
        &mut self.service
    }

    pub fn service_msg(&mut self, msg: &str) {
        if let Err(e) = self
            .service
            .write_all(msg.as_bytes())
            .and_then(|_| self.service.flush())
        {
            warn!("Failed to write message: {}", e);
        }
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release output: {}", e);
        }
    }
}

fn spawn_pager(command: &str) -> io::Result<(Child, ChildStdin)> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty pager command"))?;

    let mut child = Command::new(program)
        .args(parts)
        .stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "pager has no stdin"))?;

    Ok((child, stdin))
}
