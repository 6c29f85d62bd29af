//! Single active writer handle
//!
//! Narrow integrations, such as a foreign-function boundary that exposes
//! `begin`/`write`/`finish` calls, need one shared writer rather than an
//! owned [`Encryptor`]. [`WriterSession`] holds at most one in-memory
//! writer behind a mutex. Each session gets a fresh output buffer.
//!
//! ```
//! use opentdf_stream::WriterSession;
//!
//! static SESSION: WriterSession = WriterSession::new();
//! assert!(!SESSION.is_active().unwrap());
//! ```

use crate::encryptor::{Encryptor, WriterConfig};
use crate::error::TdfError;
use crate::manifest::{Segment, TdfManifest};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

struct ActiveSession {
    encryptor: Encryptor<Vec<u8>>,
}

/// Mutex-guarded "one writer at a time" adapter
pub struct WriterSession {
    inner: Mutex<Option<ActiveSession>>,
    last_manifest: Mutex<Option<TdfManifest>>,
}

impl WriterSession {
    pub const fn new() -> Self {
        WriterSession {
            inner: Mutex::new(None),
            last_manifest: Mutex::new(None),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<ActiveSession>>, TdfError> {
        self.inner.lock().map_err(|_| TdfError::LockPoisoned)
    }

    pub fn is_active(&self) -> Result<bool, TdfError> {
        Ok(self.lock()?.is_some())
    }

    /// Start a session writing into a new buffer
    pub fn begin(&self, config: WriterConfig) -> Result<(), TdfError> {
        let mut guard = self.lock()?;
        if guard.is_some() {
            return Err(TdfError::SessionBusy);
        }
        let encryptor = Encryptor::open(config, Vec::new())?;
        *guard = Some(ActiveSession { encryptor });
        debug!("writer session started");
        Ok(())
    }

    /// Encrypt one chunk into the active session
    ///
    /// A failed write ends the session.
    pub fn write(&self, chunk: &[u8]) -> Result<Segment, TdfError> {
        let mut guard = self.lock()?;
        let session = guard.as_mut().ok_or(TdfError::NoActiveSession)?;
        match session.encryptor.append_chunk(chunk) {
            Ok(segment) => Ok(segment.clone()),
            Err(e) => {
                *guard = None;
                Err(e)
            }
        }
    }

    /// Finalize the active session and return the container bytes
    pub fn finish(&self) -> Result<Vec<u8>, TdfError> {
        let mut session = self.lock()?.take().ok_or(TdfError::NoActiveSession)?;
        let result = session.encryptor.finalize()?;
        debug!(bytes_written = result.bytes_written, "writer session finished");
        *self
            .last_manifest
            .lock()
            .map_err(|_| TdfError::LockPoisoned)? = Some(result.manifest);
        Ok(result.sink)
    }

    /// Manifest of the most recently finished session
    pub fn last_manifest(&self) -> Result<Option<TdfManifest>, TdfError> {
        Ok(self
            .last_manifest
            .lock()
            .map_err(|_| TdfError::LockPoisoned)?
            .clone())
    }

    /// Drop the active session and its buffered output
    ///
    /// Returns whether a session was active.
    pub fn abort(&self) -> Result<bool, TdfError> {
        let aborted = self.lock()?.take().is_some();
        if aborted {
            debug!("writer session aborted");
        }
        Ok(aborted)
    }
}

impl Default for WriterSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WriterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterSession")
            .field("active", &self.is_active().unwrap_or(false))
            .finish()
    }
}
