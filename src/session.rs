//! Shared vault handle with inactivity auto-lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::Vault;
use crate::error::VaultError;
use crate::store::VaultSettings;

enum Signal {
    Activity,
    Cancel,
}

/// Watchdog thread that runs `on_expire` once no activity has been
/// reported for `timeout`. Dropping it cancels the watchdog.
pub struct AutoLock {
    tx: Sender<Signal>,
}

impl AutoLock {
    pub fn start<F>(timeout: Duration, on_expire: F) -> Result<Self, VaultError>
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("passlock-autolock".to_string())
            .spawn(move || {
                loop {
                    match rx.recv_timeout(timeout) {
                        Ok(Signal::Activity) => continue,
                        Ok(Signal::Cancel) | Err(RecvTimeoutError::Disconnected) => return,
                        Err(RecvTimeoutError::Timeout) => {
                            on_expire();
                            return;
                        }
                    }
                }
            })
            .map_err(VaultError::io("failed to start auto-lock timer"))?;

        Ok(Self { tx })
    }

    /// Restarts the inactivity countdown.
    pub fn touch(&self) {
        let _ = self.tx.send(Signal::Activity);
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(Signal::Cancel);
    }
}

impl Drop for AutoLock {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A [`Vault`] shared between threads that locks itself after a period of
/// inactivity, as configured in its [`VaultSettings`].
///
/// Every operation run through [`Session::with_vault`] counts as activity.
#[derive(Clone)]
pub struct Session {
    vault: Arc<Mutex<Vault>>,
    timer: Arc<Mutex<Option<AutoLock>>>,
    // Bumped on every lock/unlock so a stale watchdog never locks a vault
    // that was unlocked again after it fired.
    epoch: Arc<AtomicU64>,
    lock_timeout: Option<Option<Duration>>,
}

impl Session {
    /// Wraps `vault`; if it is already unlocked the watchdog starts now.
    pub fn new(vault: Vault) -> Result<Self, VaultError> {
        Self::build(vault, None)
    }

    /// Like [`Session::new`] but ignores the vault's own lock settings.
    pub fn with_lock_timeout(vault: Vault, timeout: Option<Duration>) -> Result<Self, VaultError> {
        Self::build(vault, Some(timeout))
    }

    fn build(vault: Vault, lock_timeout: Option<Option<Duration>>) -> Result<Self, VaultError> {
        let unlocked = vault.is_unlocked();
        let session = Self {
            vault: Arc::new(Mutex::new(vault)),
            timer: Arc::new(Mutex::new(None)),
            epoch: Arc::new(AtomicU64::new(0)),
            lock_timeout,
        };
        if unlocked {
            session.arm()?;
        }
        Ok(session)
    }

    pub fn unlock(&self, passphrase: &str) -> Result<(), VaultError> {
        lock_ignoring_poison(&self.vault).unlock(passphrase)?;
        self.arm()
    }

    /// Locks the vault and stops the watchdog.
    pub fn lock(&self) {
        self.disarm();
        lock_ignoring_poison(&self.vault).lock();
    }

    pub fn is_unlocked(&self) -> bool {
        lock_ignoring_poison(&self.vault).is_unlocked()
    }

    /// Runs `f` against the vault and counts it as activity.
    pub fn with_vault<T, F>(&self, f: F) -> Result<T, VaultError>
    where
        F: FnOnce(&mut Vault) -> Result<T, VaultError>,
    {
        let mut vault = lock_ignoring_poison(&self.vault);
        if !vault.is_unlocked() {
            return Err(VaultError::Locked);
        }
        if let Some(timer) = lock_ignoring_poison(&self.timer).as_ref() {
            timer.touch();
        }
        f(&mut vault)
    }

    /// Persists new settings and restarts the watchdog with them.
    pub fn update_settings(&self, settings: VaultSettings) -> Result<(), VaultError> {
        self.with_vault(|vault| vault.update_settings(settings))?;
        self.arm()
    }

    fn timeout(&self) -> Result<Option<Duration>, VaultError> {
        match self.lock_timeout {
            Some(timeout) => Ok(timeout),
            None => Ok(lock_ignoring_poison(&self.vault).settings()?.lock_timeout()),
        }
    }

    fn arm(&self) -> Result<(), VaultError> {
        let timeout = self.timeout()?;
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        let mut timer = lock_ignoring_poison(&self.timer);
        *timer = None;

        let Some(timeout) = timeout else {
            debug!("auto-lock disabled");
            return Ok(());
        };

        let vault = Arc::downgrade(&self.vault);
        let current = Arc::clone(&self.epoch);
        *timer = Some(AutoLock::start(timeout, move || {
            let Some(vault) = vault.upgrade() else {
                return;
            };
            let mut vault = lock_ignoring_poison(&vault);
            if current.load(Ordering::SeqCst) == epoch && vault.is_unlocked() {
                info!(after = ?timeout, "locking vault after inactivity");
                vault.lock();
            }
        })?);
        debug!(timeout = ?timeout, "auto-lock armed");
        Ok(())
    }

    fn disarm(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *lock_ignoring_poison(&self.timer) = None;
    }
}
