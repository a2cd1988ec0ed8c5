use std::io;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Turns a user interrupt (Ctrl-C) into cancelling one execution.
///
/// The signal listener is registered when the guard is built and removed
/// when it is dropped, so every execution gets exactly one listener.
pub struct InterruptGuard {
    listener: JoinHandle<()>,
}

impl InterruptGuard {
    pub fn install(cancel: CancellationToken) -> io::Result<Self> {
        let mut interrupt = interrupt_stream()?;

        let listener = tokio::spawn(async move {
            tokio::select! {
                received = interrupt.recv() => {
                    if received.is_some() {
                        debug!("Interrupt received, cancelling query");
                        cancel.cancel();
                    }
                }
                _ = cancel.cancelled() => {}
            }
        });

        Ok(InterruptGuard { listener })
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[cfg(unix)]
fn interrupt_stream() -> io::Result<tokio::signal::unix::Signal> {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
}

#[cfg(windows)]
fn interrupt_stream() -> io::Result<tokio::signal::windows::CtrlC> {
    tokio::signal::windows::ctrl_c()
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn listener_stops_when_the_guard_is_dropped() {
        let cancel = CancellationToken::new();
        let guard = InterruptGuard::install(cancel.clone()).unwrap();
        let listener = guard.listener.abort_handle();
        assert!(!listener.is_finished());

        drop(guard);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(listener.is_finished());
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn listener_exits_once_cancelled_elsewhere() {
        let cancel = CancellationToken::new();
        let guard = InterruptGuard::install(cancel.clone()).unwrap();

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(guard.listener.is_finished());
    }
}
