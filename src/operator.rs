//! Operator cancellation sources.
//!
//! Both sources only set the shared [`CancellationToken`]; the controller
//! notices at its next loop boundary.

use std::{
    io,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossterm::{
    event::{self, Event, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tokio_util::sync::CancellationToken;

use crate::{log_error, log_info, log_warn};

const ENABLE_LOGS: bool = true;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Puts the terminal in raw mode and cancels on the first key press.
///
/// In raw mode Ctrl-C arrives as a key press too, so it still stops the run.
/// Dropping the watcher stops the thread and restores the terminal.
pub struct KeypressWatcher {
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl KeypressWatcher {
    pub fn spawn(cancel: CancellationToken) -> io::Result<Self> {
        enable_raw_mode()?;

        let stop = CancellationToken::new();
        let thread_stop = stop.clone();
        let spawned = thread::Builder::new()
            .name("tagsweep-keys".into())
            .spawn(move || watch_keys(cancel, thread_stop));

        match spawned {
            Ok(handle) => Ok(Self {
                stop,
                handle: Some(handle),
            }),
            Err(err) => {
                let _ = disable_raw_mode();
                Err(err)
            }
        }
    }
}

impl Drop for KeypressWatcher {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(join_err) = handle.join() {
                log_error!("Failed to join keypress thread: {join_err:?}");
            }
        }
        if let Err(err) = disable_raw_mode() {
            log_error!("Failed to restore terminal mode: {err}");
        }
    }
}

fn watch_keys(cancel: CancellationToken, stop: CancellationToken) {
    while !stop.is_cancelled() && !cancel.is_cancelled() {
        match event::poll(POLL_INTERVAL) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    log_info!("Key pressed; stopping after the current read");
                    cancel.cancel();
                }
                Ok(_) => {}
                Err(err) => {
                    log_warn!("Keypress watcher stopped: {err}");
                    return;
                }
            },
            Ok(false) => {}
            Err(err) => {
                log_warn!("Keypress watcher stopped: {err}");
                return;
            }
        }
    }
}

/// Cancels on SIGINT. The task ends quietly once `cancel` fires for any
/// other reason.
pub fn watch_ctrl_c(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    log_info!("Interrupt received; stopping after the current read");
                    cancel.cancel();
                }
                Err(err) => log_warn!("Failed to listen for Ctrl-C: {err}"),
            },
            _ = cancel.cancelled() => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ctrl_c_watcher_exits_when_cancelled_elsewhere() {
        let cancel = CancellationToken::new();
        let handle = watch_ctrl_c(cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher should finish")
            .unwrap();
    }
}
