//! Copying secrets to the system clipboard with delayed clearing.
//!
//! Every copy bumps a generation counter. A pending clear only fires if no
//! newer copy happened in the meantime and the clipboard still holds the
//! copied text, so a later copy (ours or the user's) is never wiped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
    #[error("failed to start clipboard timer: {0}")]
    Timer(#[from] std::io::Error),
}

/// Minimal clipboard surface used by [`Clipboard`].
pub trait ClipboardBackend {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError>;
    fn get_text(&mut self) -> Result<String, ClipboardError>;
    fn clear(&mut self) -> Result<(), ClipboardError>;
}

/// The OS clipboard via `arboard`.
pub struct SystemClipboard(arboard::Clipboard);

impl SystemClipboard {
    pub fn new() -> Result<Self, ClipboardError> {
        arboard::Clipboard::new()
            .map(SystemClipboard)
            .map_err(|e| ClipboardError::Unavailable(e.to_string()))
    }
}

impl ClipboardBackend for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.0
            .set_text(text)
            .map_err(|e| ClipboardError::Unavailable(e.to_string()))
    }

    fn get_text(&mut self) -> Result<String, ClipboardError> {
        self.0
            .get_text()
            .map_err(|e| ClipboardError::Unavailable(e.to_string()))
    }

    fn clear(&mut self) -> Result<(), ClipboardError> {
        self.0
            .clear()
            .map_err(|e| ClipboardError::Unavailable(e.to_string()))
    }
}

type OpenBackend = dyn Fn() -> Result<Box<dyn ClipboardBackend>, ClipboardError> + Send + Sync;

/// Clipboard handle. Clones share the generation counter.
///
/// A backend is opened per operation; the clear timer opens its own on
/// its thread, so backends need not be `Send`.
#[derive(Clone)]
pub struct Clipboard {
    open: Arc<OpenBackend>,
    generation: Arc<AtomicU64>,
}

/// A completed copy.
///
/// Holds the backend that set the text. On X11 and Wayland without a
/// clipboard manager the contents vanish with it, so keep this alive for
/// as long as the text should be pasteable.
#[must_use = "the copied text may disappear once this is dropped"]
pub struct Copied {
    _backend: Box<dyn ClipboardBackend>,
    timer: Option<JoinHandle<()>>,
}

impl Copied {
    /// Whether a clear is scheduled.
    pub fn clears(&self) -> bool {
        self.timer.is_some()
    }

    /// Blocks until the scheduled clear has run, then releases the backend.
    pub fn wait(mut self) {
        let Some(timer) = self.timer.take() else {
            return;
        };
        if timer.join().is_err() {
            warn!("clipboard timer panicked");
        }
    }
}

impl Clipboard {
    /// Uses the OS clipboard.
    pub fn system() -> Self {
        Self::with_backend(|| {
            let backend = SystemClipboard::new()?;
            Ok(Box::new(backend) as Box<dyn ClipboardBackend>)
        })
    }

    pub fn with_backend<F>(open: F) -> Self
    where
        F: Fn() -> Result<Box<dyn ClipboardBackend>, ClipboardError> + Send + Sync + 'static,
    {
        Self {
            open: Arc::new(open),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Puts `text` on the clipboard. With `clear_after`, schedules a clear
    /// on a timer thread that [`Copied::wait`] joins.
    pub fn copy(
        &self,
        text: &str,
        clear_after: Option<Duration>,
    ) -> Result<Copied, ClipboardError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut backend = (self.open)()?;
        backend.set_text(text)?;
        debug!(generation, "copied to clipboard");

        let Some(delay) = clear_after else {
            return Ok(Copied {
                _backend: backend,
                timer: None,
            });
        };

        let expected = Zeroizing::new(text.to_string());
        let open = Arc::clone(&self.open);
        let current = Arc::clone(&self.generation);

        let timer = thread::Builder::new()
            .name("passlock-clipboard".to_string())
            .spawn(move || {
                thread::sleep(delay);
                if current.load(Ordering::SeqCst) != generation {
                    return;
                }
                if let Err(e) = clear_if_unchanged(&*open, &expected) {
                    warn!(error = %e, "failed to clear clipboard");
                }
            })?;

        Ok(Copied {
            _backend: backend,
            timer: Some(timer),
        })
    }

    /// Clears immediately and cancels any pending timer.
    pub fn clear_now(&self) -> Result<(), ClipboardError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        (self.open)()?.clear()
    }
}

fn clear_if_unchanged(open: &OpenBackend, expected: &str) -> Result<(), ClipboardError> {
    let mut backend = open()?;
    let current = Zeroizing::new(backend.get_text().unwrap_or_default());
    if current.as_str() == expected {
        backend.clear()?;
        debug!("clipboard cleared");
    }
    Ok(())
}
