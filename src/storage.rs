//! Crash-safe file persistence for the encrypted vault blob.

use std::fs::{self, OpenOptions};
#[cfg(unix)]
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::crypto::aead::secure_random;
use crate::error::VaultError;

/// Location of one vault file.
///
/// Writes never modify the file in place: data goes to a sibling temporary
/// file which then atomically replaces the target, so a failed or
/// interrupted write leaves the previous vault intact.
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole vault file.
    pub fn load(&self) -> Result<Vec<u8>, VaultError> {
        match fs::read(&self.path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(VaultError::Missing(self.path.clone()))
            }
            Err(e) => Err(VaultError::io("failed to read vault file")(e)),
        }
    }

    /// Replaces the vault file with `data`.
    ///
    /// 1. write to `<name>.tmp.<random hex>` next to the target (created
    ///    exclusively, mode 0600 on Unix)
    /// 2. fsync the temporary file
    /// 3. rename it over the target
    /// 4. fsync the parent directory
    ///
    /// Missing parent directories are created.
    pub fn save(&self, data: &[u8]) -> Result<(), VaultError> {
        if let Some(parent) = self.parent() {
            fs::create_dir_all(parent).map_err(VaultError::io("failed to create vault directory"))?;
        }

        let tmp_path = self.random_tmp_path()?;
        debug!(path = %self.path.display(), bytes = data.len(), "writing vault file");

        let written = write_new_file(&tmp_path, data);
        if let Err(e) = written.and_then(|()| self.atomic_replace(&tmp_path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        #[cfg(unix)]
        {
            if let Some(parent) = self.parent() {
                File::open(parent)
                    .and_then(|dir| dir.sync_all())
                    .map_err(VaultError::io("failed to sync vault directory"))?;
            }
        }

        Ok(())
    }

    fn parent(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    fn random_tmp_path(&self) -> Result<PathBuf, VaultError> {
        let mut buf = [0u8; 8];
        secure_random(&mut buf)?;
        let suffix: String = buf.iter().map(|b| format!("{b:02x}")).collect();

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "vault".to_string());

        Ok(self.path.with_file_name(format!("{file_name}.tmp.{suffix}")))
    }

    /// `ReplaceFileW` with write-through; falls back to a rename when the
    /// target does not exist yet.
    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<(), VaultError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        if !self.path.exists() {
            return fs::rename(tmp_path, &self.path)
                .map_err(VaultError::io("failed to move vault file into place"));
        }

        fn wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target = wide(self.path.as_os_str());
        let replacement = wide(tmp_path.as_os_str());

        // SAFETY: both buffers are NUL-terminated UTF-16 and outlive the call;
        // the optional arguments are null.
        let ok = unsafe {
            ReplaceFileW(
                target.as_ptr(),
                replacement.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if ok == 0 {
            return Err(VaultError::io("atomic replace failed")(io::Error::last_os_error()));
        }
        Ok(())
    }

    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<(), VaultError> {
        fs::rename(tmp_path, &self.path)
            .map_err(VaultError::io("failed to move vault file into place"))
    }
}

fn write_new_file(path: &Path, data: &[u8]) -> Result<(), VaultError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .map_err(VaultError::io("failed to create temporary file"))?;
    file.write_all(data)
        .and_then(|()| file.sync_all())
        .map_err(VaultError::io("failed to write temporary file"))
}
