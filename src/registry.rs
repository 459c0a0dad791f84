// src/registry.rs — Presence registry: handle → live connection.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{error::SignalError, identity::CredentialVerifier, types::ConnId};

/// Which connection currently answers for each handle.
///
/// Last registration wins; the superseded connection is left alone and simply
/// stops being reachable under that handle.
pub struct PresenceRegistry {
    bindings:           RwLock<HashMap<String, ConnId>>,
    verifier:           Arc<dyn CredentialVerifier>,
    require_credential: bool,
}

impl PresenceRegistry {
    pub fn new(verifier: Arc<dyn CredentialVerifier>, require_credential: bool) -> Self {
        Self { bindings: RwLock::new(HashMap::new()), verifier, require_credential }
    }

    /// Binds `handle` to `conn`, overwriting any previous binding.
    /// Returns the trimmed handle that was bound.
    pub async fn register(
        &self,
        handle: &str,
        conn: &ConnId,
        credential: Option<&str>,
    ) -> Result<String, SignalError> {
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(SignalError::EmptyHandle);
        }

        // Verification may suspend; keep it outside the lock.
        match credential {
            Some(token) => {
                let asserted = self.verifier.verify(token, handle).await.map_err(|e| {
                    warn!("[!] Invalid credential for '{handle}' on {conn}: {e}");
                    SignalError::AuthFailed
                })?;
                if asserted != handle {
                    warn!("[!] {conn} claimed '{handle}' with a token for '{asserted}'");
                    return Err(SignalError::HandleMismatch {
                        claimed: handle.to_owned(),
                        asserted,
                    });
                }
            }
            None if self.require_credential => {
                warn!("[!] {conn} tried to join as '{handle}' without a token");
                return Err(SignalError::AuthFailed);
            }
            None => {}
        }

        let previous = self.bindings.write().await.insert(handle.to_owned(), conn.clone());
        match previous {
            Some(old) if &old != conn => info!("[+] '{handle}' moved {old} → {conn}"),
            _ => info!("[+] '{handle}' online on {conn}"),
        }
        Ok(handle.to_owned())
    }

    pub async fn lookup(&self, handle: &str) -> Option<ConnId> {
        self.bindings.read().await.get(handle.trim()).cloned()
    }

    /// Removes the binding only while it still points at `conn`.
    /// Returns whether anything was removed.
    pub async fn unregister(&self, handle: &str, conn: &ConnId) -> bool {
        let mut map = self.bindings.write().await;
        if map.get(handle) == Some(conn) {
            map.remove(handle);
            info!("[-] '{handle}' offline ({conn})");
            true
        } else {
            false
        }
    }

    pub async fn len(&self) -> usize {
        self.bindings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bindings.read().await.is_empty()
    }
}
