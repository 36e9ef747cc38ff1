//! TOTP provisioning and verification.
//!
//! Secrets never leave the gateway in the clear after provisioning: they are
//! sealed with the gateway key and stored through the identity backend.

mod recovery;

pub use recovery::RecoveryAnswer;

use serde::Serialize;
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::crypto::CryptoBox;
use crate::error::ApiError;
use crate::identity::{IdentityBackend, TokenCredential, TotpRecord};

const DIGITS: usize = 6;
const STEP_SECONDS: u64 = 30;
pub const DEFAULT_SKEW: u8 = 1;

/// What the user needs to add the secret to an authenticator app.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TotpProvisioning {
    /// Base32 secret for manual entry.
    pub secret: String,
    /// `otpauth://` URI.
    pub uri: String,
    /// PNG QR code as a data URL.
    pub qr: String,
}

pub struct TotpGate {
    identity: Arc<dyn IdentityBackend>,
    crypto: Arc<CryptoBox>,
    issuer: String,
    skew: u8,
}

fn invalid_passcode() -> ApiError {
    ApiError::InputParameter("invalid passcode".to_string())
}

fn seal_context(user_id: &str) -> String {
    format!("totp:{user_id}")
}

// `:` separates issuer and account in the otpauth label.
fn label(value: &str) -> String {
    value.replace(':', "_")
}

impl TotpGate {
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityBackend>,
        crypto: Arc<CryptoBox>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            crypto,
            issuer: issuer.into(),
            skew: DEFAULT_SKEW,
        }
    }

    #[must_use]
    pub fn with_skew(mut self, skew: u8) -> Self {
        self.skew = skew;
        self
    }

    fn totp(&self, secret: Vec<u8>, account: &str) -> Result<TOTP, ApiError> {
        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            self.skew,
            STEP_SECONDS,
            secret,
            Some(label(&self.issuer)),
            label(account),
        )
        .map_err(|e| ApiError::GeneralServer(format!("TOTP init error: {e}")))
    }

    async fn record(&self, user_id: &str) -> Result<Option<TotpRecord>, ApiError> {
        self.identity.get_totp(user_id).await.map_err(|err| {
            error!(user_id, error = %err, "failed to read totp record");
            ApiError::from(err)
        })
    }

    /// True once the first passcode for the current secret was accepted.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    pub async fn is_initialized(&self, user_id: &str) -> Result<bool, ApiError> {
        Ok(self.record(user_id).await?.is_some_and(|r| r.verified))
    }

    /// Issue a fresh secret. Repeatable until the first passcode is verified.
    ///
    /// # Errors
    /// Returns `Conflict` once the secret has been verified.
    pub async fn init(&self, token: &TokenCredential) -> Result<TotpProvisioning, ApiError> {
        if self.is_initialized(&token.user_id).await? {
            return Err(ApiError::Conflict(
                "totp credential already initialized".to_string(),
            ));
        }
        self.provision(token).await
    }

    /// Replace a verified secret after the recovery answers check out.
    ///
    /// # Errors
    /// Returns `Forbidden` when no recovery questions are set and
    /// `InvalidCredential` when the answers do not match.
    pub async fn reset(
        &self,
        token: &TokenCredential,
        answers: &[RecoveryAnswer],
    ) -> Result<TotpProvisioning, ApiError> {
        let stored = self.identity.get_recovery(&token.user_id).await?;
        if stored.is_empty() {
            return Err(ApiError::Forbidden(
                "recovery questions not set".to_string(),
            ));
        }
        if !recovery::answers_match(&token.user_id, &stored, answers) {
            warn!(user_id = %token.user_id, "totp reset with wrong recovery answers");
            return Err(ApiError::InvalidCredential(
                "invalid recovery answers".to_string(),
            ));
        }
        info!(user_id = %token.user_id, "totp secret reset");
        self.provision(token).await
    }

    async fn provision(&self, token: &TokenCredential) -> Result<TotpProvisioning, ApiError> {
        let secret = Secret::generate_secret()
            .to_bytes()
            .map_err(|e| ApiError::GeneralServer(format!("Secret gen error: {e}")))?;
        let sealed_secret = self
            .crypto
            .seal(&seal_context(&token.user_id), &secret)
            .map_err(|e| ApiError::GeneralServer(e.to_string()))?;
        let totp = self.totp(secret, &token.user)?;

        let qr = totp
            .get_qr_base64()
            .map_err(|e| ApiError::GeneralServer(format!("QR gen error: {e}")))?;
        let provisioning = TotpProvisioning {
            secret: totp.get_secret_base32(),
            uri: totp.get_url(),
            qr: format!("data:image/png;base64,{qr}"),
        };

        self.identity
            .put_totp(
                &token.user_id,
                &TotpRecord {
                    sealed_secret,
                    verified: false,
                },
            )
            .await?;
        Ok(provisioning)
    }

    /// Check `passcode` and mark the secret verified.
    ///
    /// # Errors
    /// Returns `InputParameter("invalid passcode")` for every failure that
    /// involves the passcode or the stored secret.
    pub async fn verify(&self, user_id: &str, passcode: &str) -> Result<(), ApiError> {
        let Some(record) = self.record(user_id).await? else {
            return Err(invalid_passcode());
        };
        let secret = self
            .crypto
            .open(&seal_context(user_id), &record.sealed_secret)
            .map_err(|err| {
                error!(user_id, error = %err, "stored totp secret does not open");
                invalid_passcode()
            })?;
        let totp = self.totp(secret, user_id)?;
        if !totp.check_current(passcode.trim()).unwrap_or(false) {
            return Err(invalid_passcode());
        }
        if !record.verified {
            self.identity
                .put_totp(
                    user_id,
                    &TotpRecord {
                        verified: true,
                        ..record
                    },
                )
                .await?;
            info!(user_id, "totp secret verified");
        }
        Ok(())
    }

    /// Question texts only.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read.
    pub async fn list_questions(&self, user_id: &str) -> Result<Vec<String>, ApiError> {
        let stored = self.identity.get_recovery(user_id).await?;
        Ok(stored.into_iter().map(|q| q.question).collect())
    }

    /// # Errors
    /// Returns `InputParameter` when no question is given or one is blank.
    pub async fn set_questions(
        &self,
        user_id: &str,
        answers: &[RecoveryAnswer],
    ) -> Result<(), ApiError> {
        if answers.is_empty() {
            return Err(ApiError::InputParameter(
                "at least one recovery question is required".to_string(),
            ));
        }
        if answers
            .iter()
            .any(|a| a.question.trim().is_empty() || a.answer.trim().is_empty())
        {
            return Err(ApiError::InputParameter(
                "recovery question and answer must not be empty".to_string(),
            ));
        }
        self.identity
            .put_recovery(user_id, &recovery::to_stored(user_id, answers))
            .await?;
        Ok(())
    }
}
