//! Signing key data models.

use super::{
    errors::{KeyError, KeyResult},
    kid::derive_key_id,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding},
    traits::PublicKeyParts,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Minimum accepted length of a symmetric signing secret, in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// Signature algorithm family of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    /// HMAC-SHA256 shared secret
    Symmetric,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    AsymmetricRsa,
}

impl KeyAlgorithm {
    /// JWT algorithm used for signatures made with this key
    pub fn jwt_algorithm(self) -> Algorithm {
        match self {
            KeyAlgorithm::Symmetric => Algorithm::HS256,
            KeyAlgorithm::AsymmetricRsa => Algorithm::RS256,
        }
    }

    /// JOSE `alg` name
    pub fn as_str(self) -> &'static str {
        match self {
            KeyAlgorithm::Symmetric => "HS256",
            KeyAlgorithm::AsymmetricRsa => "RS256",
        }
    }
}

enum PublicMaterial {
    /// SHA-256 of the shared secret; the secret itself has no public half
    Fingerprint([u8; 32]),
    Rsa {
        der: Vec<u8>,
        pem: String,
        n: String,
        e: String,
    },
}

/// A signing key with its derived id.
///
/// The private half never leaves the crate: it is only handed to the token
/// codec for signing and is excluded from `Debug` output and exports.
pub struct SigningKeyPair {
    key_id: String,
    algorithm: KeyAlgorithm,
    public: PublicMaterial,
    private: Option<EncodingKey>,
    decoding: DecodingKey,
}

impl SigningKeyPair {
    /// Build an HS256 key from a shared secret.
    ///
    /// # Errors
    ///
    /// * `KeyError::SecretTooShort` - secret shorter than [`MIN_SECRET_LEN`]
    pub fn symmetric(secret: &[u8]) -> KeyResult<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(KeyError::SecretTooShort {
                len: secret.len(),
                min: MIN_SECRET_LEN,
            });
        }

        let fingerprint: [u8; 32] = Sha256::digest(secret).into();
        Ok(Self {
            key_id: derive_key_id(&fingerprint),
            algorithm: KeyAlgorithm::Symmetric,
            public: PublicMaterial::Fingerprint(fingerprint),
            private: Some(EncodingKey::from_secret(secret)),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    /// Build an RS256 key from a PEM document.
    ///
    /// Private keys (PKCS#8 or PKCS#1) produce a signing-capable key; public
    /// keys (SPKI or PKCS#1) produce a verification-only key.
    ///
    /// # Errors
    ///
    /// * `KeyError::MalformedKeyMaterial` - the PEM cannot be parsed
    pub fn rsa_from_pem(pem: &str) -> KeyResult<Self> {
        let pem = pem.trim();
        if pem.contains("PRIVATE KEY-----") {
            Self::rsa_from_private_pem(pem)
        } else {
            Self::rsa_from_public_pem(pem)
        }
    }

    /// Build a signing-capable RS256 key from a private key PEM.
    ///
    /// # Errors
    ///
    /// * `KeyError::MalformedKeyMaterial` - the PEM cannot be parsed
    pub fn rsa_from_private_pem(pem: &str) -> KeyResult<Self> {
        let private_key = decode_private_key(pem)?;
        let encoding = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| KeyError::MalformedKeyMaterial(e.to_string()))?;
        Self::rsa(RsaPublicKey::from(&private_key), Some(encoding))
    }

    /// Build a verification-only RS256 key from a public key PEM.
    ///
    /// # Errors
    ///
    /// * `KeyError::MalformedKeyMaterial` - the PEM cannot be parsed
    pub fn rsa_from_public_pem(pem: &str) -> KeyResult<Self> {
        Self::rsa(decode_public_key(pem)?, None)
    }

    fn rsa(public_key: RsaPublicKey, private: Option<EncodingKey>) -> KeyResult<Self> {
        let der = public_key
            .to_public_key_der()
            .map_err(|e| KeyError::MalformedKeyMaterial(e.to_string()))?
            .as_bytes()
            .to_vec();
        let pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyError::MalformedKeyMaterial(e.to_string()))?;
        let n = Base64UrlUnpadded::encode_string(&public_key.n().to_bytes_be());
        let e = Base64UrlUnpadded::encode_string(&public_key.e().to_bytes_be());
        let decoding = DecodingKey::from_rsa_components(&n, &e)
            .map_err(|err| KeyError::MalformedKeyMaterial(err.to_string()))?;

        Ok(Self {
            key_id: derive_key_id(&der),
            algorithm: KeyAlgorithm::AsymmetricRsa,
            public: PublicMaterial::Rsa { der, pem, n, e },
            private,
            decoding,
        })
    }

    /// Stable key id
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Algorithm family
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// Whether this key carries private material
    pub fn can_sign(&self) -> bool {
        self.private.is_some()
    }

    /// Material the key id is derived from
    pub fn public_material(&self) -> &[u8] {
        match &self.public {
            PublicMaterial::Fingerprint(fingerprint) => fingerprint,
            PublicMaterial::Rsa { der, .. } => der,
        }
    }

    /// SPKI PEM of the public half, if the key has one
    pub fn public_key_pem(&self) -> Option<&str> {
        match &self.public {
            PublicMaterial::Fingerprint(_) => None,
            PublicMaterial::Rsa { pem, .. } => Some(pem),
        }
    }

    /// Publishable form of this key.
    ///
    /// # Errors
    ///
    /// * `KeyError::NotExportable` - symmetric keys have nothing to publish
    pub fn export(&self) -> KeyResult<PublicKeyExport> {
        match &self.public {
            PublicMaterial::Fingerprint(_) => Err(KeyError::NotExportable(self.key_id.clone())),
            PublicMaterial::Rsa { n, e, .. } => Ok(PublicKeyExport {
                kty: "RSA".to_string(),
                alg: self.algorithm.as_str().to_string(),
                key_use: "sig".to_string(),
                kid: self.key_id.clone(),
                n: n.clone(),
                e: e.clone(),
            }),
        }
    }

    pub(crate) fn encoding_key(&self) -> Option<&EncodingKey> {
        self.private.as_ref()
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("can_sign", &self.can_sign())
            .finish_non_exhaustive()
    }
}

/// Public half of a key in JWK form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicKeyExport {
    pub kty: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

/// Verification key set, current key first
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicKeySet {
    pub keys: Vec<PublicKeyExport>,
}

impl PublicKeySet {
    /// Find a key by `kid`.
    pub fn find_by_kid(&self, kid: &str) -> Option<&PublicKeyExport> {
        self.keys.iter().find(|k| k.kid == kid)
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn decode_private_key(pem: &str) -> KeyResult<RsaPrivateKey> {
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    RsaPrivateKey::from_pkcs1_pem(pem)
        .map_err(|_| KeyError::MalformedKeyMaterial("unparseable RSA private key".to_string()))
}

fn decode_public_key(pem: &str) -> KeyResult<RsaPublicKey> {
    if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
        return Ok(key);
    }
    RsaPublicKey::from_pkcs1_pem(pem)
        .map_err(|_| KeyError::MalformedKeyMaterial("unparseable RSA public key".to_string()))
}
