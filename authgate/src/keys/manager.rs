//! Key manager implementation.

use super::{
    errors::{KeyError, KeyResult},
    models::{PublicKeyExport, PublicKeySet, SigningKeyPair},
};
use crate::config::SigningKeyConfig;
use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use std::{collections::HashMap, sync::Arc};

#[derive(Debug, Clone)]
struct LegacyKey {
    key: Arc<SigningKeyPair>,
    demoted_at: DateTime<Utc>,
}

/// Immutable snapshot of the current key and its legacy keys.
#[derive(Debug)]
struct KeyRing {
    current: Arc<SigningKeyPair>,
    /// Most recently demoted first
    legacy: Vec<LegacyKey>,
    index: HashMap<String, Arc<SigningKeyPair>>,
}

impl KeyRing {
    fn build(current: Arc<SigningKeyPair>, legacy: Vec<LegacyKey>) -> KeyResult<Self> {
        if !current.can_sign() {
            return Err(KeyError::NotSigningCapable(current.key_id().to_string()));
        }

        let mut index = HashMap::with_capacity(legacy.len() + 1);
        for key in std::iter::once(&current).chain(legacy.iter().map(|l| &l.key)) {
            if index
                .insert(key.key_id().to_string(), Arc::clone(key))
                .is_some()
            {
                return Err(KeyError::DuplicateKeyId(key.key_id().to_string()));
            }
        }

        Ok(Self {
            current,
            legacy,
            index,
        })
    }

    fn rotated(&self, next: Arc<SigningKeyPair>, now: DateTime<Utc>) -> KeyResult<Self> {
        let mut legacy = Vec::with_capacity(self.legacy.len() + 1);
        legacy.push(LegacyKey {
            key: Arc::clone(&self.current),
            demoted_at: now,
        });
        legacy.extend(self.legacy.iter().cloned());
        Self::build(next, legacy)
    }
}

/// Holds the current signing key and the legacy keys still accepted for
/// verification.
///
/// Readers load an immutable ring snapshot without locking; rotation and
/// reload publish a new ring atomically, so validations in flight finish
/// against the ring they started with.
pub struct KeyManager {
    ring: ArcSwap<KeyRing>,
    legacy_retention: Option<Duration>,
}

impl KeyManager {
    /// Create a key manager from an explicit current key and legacy keys
    ///
    /// # Arguments
    ///
    /// * `current` - Key used for new signatures; must carry private material
    /// * `legacy` - Verification-only keys, most recent first
    ///
    /// # Errors
    ///
    /// * `KeyError::NotSigningCapable` - current key has no private half
    /// * `KeyError::DuplicateKeyId` - two keys derive the same id
    pub fn new(current: SigningKeyPair, legacy: Vec<SigningKeyPair>) -> KeyResult<Self> {
        let ring = Self::ring_from_keys(current, legacy)?;
        log::info!(
            "Key manager loaded: current key {} with {} legacy key(s)",
            ring.current.key_id(),
            ring.legacy.len()
        );
        Ok(Self {
            ring: ArcSwap::from_pointee(ring),
            legacy_retention: None,
        })
    }

    /// Create a key manager from configuration
    ///
    /// # Errors
    ///
    /// Returns a `KeyError` for missing, malformed or duplicate key material.
    /// This is a startup failure: the caller must not serve traffic.
    pub fn from_config(config: &SigningKeyConfig) -> KeyResult<Self> {
        let (current, legacy) = load_keys(config)?;
        Self::new(current, legacy)
    }

    /// Drop legacy keys once they have been demoted for longer than `retention`
    pub fn with_legacy_retention(mut self, retention: Duration) -> Self {
        self.legacy_retention = Some(retention);
        self
    }

    /// Current signing key. Only the token codec signs with it.
    pub(crate) fn signing_key(&self) -> Arc<SigningKeyPair> {
        Arc::clone(&self.ring.load().current)
    }

    /// Id of the current signing key
    pub fn current_key_id(&self) -> String {
        self.ring.load().current.key_id().to_string()
    }

    /// Current key first, then legacy keys most recent first
    pub fn verification_keys(&self) -> Vec<Arc<SigningKeyPair>> {
        let ring = self.ring.load();
        std::iter::once(Arc::clone(&ring.current))
            .chain(ring.legacy.iter().map(|l| Arc::clone(&l.key)))
            .collect()
    }

    /// Look up a verification key by id
    pub fn find_verification_key(&self, key_id: &str) -> Option<Arc<SigningKeyPair>> {
        self.ring.load().index.get(key_id).cloned()
    }

    /// Publishable form of a single key
    ///
    /// # Errors
    ///
    /// * `KeyError::UnknownKeyId` - no such key in the ring
    /// * `KeyError::NotExportable` - the key is symmetric
    pub fn export_public_key(&self, key_id: &str) -> KeyResult<PublicKeyExport> {
        self.find_verification_key(key_id)
            .ok_or_else(|| KeyError::UnknownKeyId(key_id.to_string()))?
            .export()
    }

    /// Every exportable verification key, current first
    pub fn public_keys(&self) -> PublicKeySet {
        PublicKeySet {
            keys: self
                .verification_keys()
                .iter()
                .filter_map(|key| key.export().ok())
                .collect(),
        }
    }

    /// Make `next` the current key and demote the old current key to legacy
    ///
    /// # Errors
    ///
    /// * `KeyError::NotSigningCapable` - `next` has no private half
    /// * `KeyError::DuplicateKeyId` - `next` is already in the ring
    pub fn rotate(&self, next: SigningKeyPair) -> KeyResult<()> {
        let next = Arc::new(next);
        loop {
            let ring = self.ring.load_full();
            let rotated = Arc::new(ring.rotated(Arc::clone(&next), Utc::now())?);
            let previous = self.ring.compare_and_swap(&ring, rotated);
            if Arc::ptr_eq(&*previous, &ring) {
                log::info!(
                    "Rotated signing key: {} is current, {} demoted to legacy",
                    next.key_id(),
                    ring.current.key_id()
                );
                return Ok(());
            }
        }
    }

    /// Rebuild the ring from configuration
    ///
    /// On error the existing ring stays in place.
    ///
    /// # Errors
    ///
    /// Returns a `KeyError` for missing, malformed or duplicate key material
    pub fn reload(&self, config: &SigningKeyConfig) -> KeyResult<()> {
        let (current, legacy) = load_keys(config)?;
        let ring = Self::ring_from_keys(current, legacy)?;
        log::info!(
            "Reloaded signing keys: current key {} with {} legacy key(s)",
            ring.current.key_id(),
            ring.legacy.len()
        );
        self.ring.store(Arc::new(ring));
        Ok(())
    }

    /// Drop legacy keys demoted longer ago than the retention window
    ///
    /// # Returns
    ///
    /// * `usize` - Number of keys dropped
    pub fn prune_legacy(&self, now: DateTime<Utc>) -> usize {
        let Some(retention) = self.legacy_retention else {
            return 0;
        };

        loop {
            let ring = self.ring.load_full();
            let kept: Vec<LegacyKey> = ring
                .legacy
                .iter()
                .filter(|l| now - l.demoted_at <= retention)
                .cloned()
                .collect();
            let dropped = ring.legacy.len() - kept.len();
            if dropped == 0 {
                return 0;
            }

            // A ring that was valid stays valid with fewer legacy keys.
            let Ok(pruned) = KeyRing::build(Arc::clone(&ring.current), kept) else {
                return 0;
            };
            let previous = self.ring.compare_and_swap(&ring, Arc::new(pruned));
            if Arc::ptr_eq(&*previous, &ring) {
                log::info!("Pruned {} expired legacy key(s)", dropped);
                return dropped;
            }
        }
    }

    fn ring_from_keys(current: SigningKeyPair, legacy: Vec<SigningKeyPair>) -> KeyResult<KeyRing> {
        let now = Utc::now();
        let legacy = legacy
            .into_iter()
            .map(|key| LegacyKey {
                key: Arc::new(key),
                demoted_at: now,
            })
            .collect();
        KeyRing::build(Arc::new(current), legacy)
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.ring.load();
        f.debug_struct("KeyManager")
            .field("current", &ring.current.key_id())
            .field("legacy", &ring.legacy.len())
            .field("legacy_retention", &self.legacy_retention)
            .finish()
    }
}

fn load_keys(config: &SigningKeyConfig) -> KeyResult<(SigningKeyPair, Vec<SigningKeyPair>)> {
    match config {
        SigningKeyConfig::Symmetric {
            secret,
            legacy_secrets,
        } => {
            if secret.is_empty() {
                return Err(KeyError::MissingSigningKey);
            }
            let current = SigningKeyPair::symmetric(secret.as_bytes())?;
            let legacy = legacy_secrets
                .iter()
                .map(|s| SigningKeyPair::symmetric(s.as_bytes()))
                .collect::<KeyResult<Vec<_>>>()?;
            Ok((current, legacy))
        }
        SigningKeyConfig::Rsa {
            private_key_pem,
            legacy_key_pems,
        } => {
            if private_key_pem.trim().is_empty() {
                return Err(KeyError::MissingSigningKey);
            }
            let current = SigningKeyPair::rsa_from_private_pem(private_key_pem)?;
            let legacy = legacy_key_pems
                .iter()
                .map(|pem| SigningKeyPair::rsa_from_pem(pem))
                .collect::<KeyResult<Vec<_>>>()?;
            Ok((current, legacy))
        }
    }
}
