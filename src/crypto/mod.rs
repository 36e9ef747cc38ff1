//! Symmetric sealing of small opaque values and RS256 signing for id tokens.
//!
//! Sealed values are `nonce (12 bytes) || ciphertext`, base64url without padding,
//! so they can travel in cookies and query strings unchanged. Every seal binds a
//! context string as AAD; a value sealed for one purpose does not open for another.

mod jwks;
mod jwt;

pub use jwks::{Jwk, Jwks};
pub use jwt::{IdTokenClaims, JwtHeader};

use base64ct::{Base64UrlUnpadded, Encoding};
use chacha20poly1305::{
    AeadCore, ChaCha20Poly1305, KeyInit, Nonce,
    aead::{Aead, OsRng, Payload},
};
use rsa::{RsaPublicKey, pkcs1v15::SigningKey};
use serde::Serialize;
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

pub const ENCRYPTION_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key must be {ENCRYPTION_KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("failed to parse RSA key")]
    KeyParse,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("invalid base64url encoding")]
    Base64,
    #[error("encryption failure")]
    Seal,
    #[error("decryption failure")]
    Open,
}

#[derive(Clone)]
pub struct CryptoBox {
    cipher: ChaCha20Poly1305,
    signing_key: SigningKey<Sha256>,
    kid: String,
    jwks: Jwks,
}

impl fmt::Debug for CryptoBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoBox")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

impl CryptoBox {
    /// Build from a 32-byte symmetric key and an RSA private key (PEM or DER).
    ///
    /// # Errors
    /// Returns an error if the symmetric key has the wrong length or the RSA key cannot be parsed.
    pub fn new(
        encryption_key: &[u8],
        private_key_pem_or_der: &[u8],
        kid: impl Into<String>,
    ) -> Result<Self, CryptoError> {
        if encryption_key.len() != ENCRYPTION_KEY_LEN {
            return Err(CryptoError::InvalidKeyLength(encryption_key.len()));
        }
        let cipher = ChaCha20Poly1305::new_from_slice(encryption_key)
            .map_err(|_| CryptoError::InvalidKeyLength(encryption_key.len()))?;

        let private_key = jwt::decode_private_key(private_key_pem_or_der)?;
        let kid = kid.into();
        let public_key = RsaPublicKey::from(&private_key);
        let jwks = Jwks {
            keys: vec![Jwk::from_rsa_public_key(&public_key, kid.clone())],
        };

        Ok(Self {
            cipher,
            signing_key: SigningKey::<Sha256>::new(private_key),
            kid,
            jwks,
        })
    }

    /// Encrypt `plaintext` bound to `context`.
    ///
    /// # Errors
    /// Returns an error if encryption fails.
    pub fn seal(&self, context: &str, plaintext: &[u8]) -> Result<String, CryptoError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let aad = construct_aad(context);
        let ciphertext = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| CryptoError::Seal)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        Ok(Base64UrlUnpadded::encode_string(&sealed))
    }

    /// Decrypt a value produced by [`CryptoBox::seal`] with the same `context`.
    ///
    /// # Errors
    /// Returns an error if the value is not base64url, too short, tampered with,
    /// or sealed under a different context or key.
    #[allow(deprecated)]
    pub fn open(&self, context: &str, sealed: &str) -> Result<Vec<u8>, CryptoError> {
        let data = Base64UrlUnpadded::decode_vec(sealed).map_err(|_| CryptoError::Base64)?;
        if data.len() < NONCE_LEN {
            return Err(CryptoError::Open);
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let aad = construct_aad(context);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| CryptoError::Open)
    }

    /// Sign a claim set as an RS256 JWT carrying this box's `kid`.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be serialized.
    pub fn sign_jwt<T: Serialize>(&self, claims: &T) -> Result<String, CryptoError> {
        jwt::sign_rs256(&self.signing_key, &self.kid, claims)
    }

    #[must_use]
    pub fn jwks(&self) -> &Jwks {
        &self.jwks
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }
}

fn construct_aad(context: &str) -> Vec<u8> {
    format!("apigate:v1|{context}").into_bytes()
}
