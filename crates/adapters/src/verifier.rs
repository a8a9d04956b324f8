// SPDX-License-Identifier: MIT

//! `ImageVerifier` / `BundleVerifier` capabilities.

use crate::error::VerifyError;
use async_trait::async_trait;
use std::path::PathBuf;

/// Outcome of checking an image's signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub verified: bool,
    pub reason: Option<String>,
}

#[async_trait]
pub trait ImageVerifier: Send + Sync {
    async fn verify(&self, image_ref: &str) -> Result<VerifyOutcome, VerifyError>;
}

#[async_trait]
pub trait BundleVerifier: Send + Sync {
    async fn verify(&self, bundle_ref: &str) -> Result<(), VerifyError>;
}

/// Shells out to an image-signature verification tool (e.g. `cosign
/// verify`) with a bounded timeout.
pub struct ProcessImageVerifier {
    binary: PathBuf,
}

impl ProcessImageVerifier {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl ImageVerifier for ProcessImageVerifier {
    async fn verify(&self, image_ref: &str) -> Result<VerifyOutcome, VerifyError> {
        let out = tokio::process::Command::new(&self.binary)
            .args(["verify", image_ref])
            .output()
            .await
            .map_err(|e| VerifyError::Unavailable(e.to_string()))?;
        if out.status.success() {
            Ok(VerifyOutcome { verified: true, reason: None })
        } else {
            Ok(VerifyOutcome {
                verified: false,
                reason: Some(String::from_utf8_lossy(&out.stderr).trim().to_string()),
            })
        }
    }
}

#[async_trait]
impl BundleVerifier for ProcessImageVerifier {
    async fn verify(&self, bundle_ref: &str) -> Result<(), VerifyError> {
        let out = tokio::process::Command::new(&self.binary)
            .args(["verify-bundle", bundle_ref])
            .output()
            .await
            .map_err(|e| VerifyError::Unavailable(e.to_string()))?;
        if out.status.success() {
            Ok(())
        } else {
            Err(VerifyError::Failed(String::from_utf8_lossy(&out.stderr).trim().to_string()))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct FakeImageVerifier {
        pub outcomes: Mutex<HashMap<String, VerifyOutcome>>,
        pub default_verified: bool,
    }

    impl FakeImageVerifier {
        pub fn always_verified() -> Self {
            Self { outcomes: Mutex::new(HashMap::new()), default_verified: true }
        }

        pub fn always_failing() -> Self {
            Self { outcomes: Mutex::new(HashMap::new()), default_verified: false }
        }

        pub fn with_outcome(self, image_ref: &str, outcome: VerifyOutcome) -> Self {
            self.outcomes.lock().insert(image_ref.to_string(), outcome);
            self
        }
    }

    #[async_trait]
    impl ImageVerifier for FakeImageVerifier {
        async fn verify(&self, image_ref: &str) -> Result<VerifyOutcome, VerifyError> {
            if let Some(outcome) = self.outcomes.lock().get(image_ref) {
                return Ok(outcome.clone());
            }
            Ok(VerifyOutcome {
                verified: self.default_verified,
                reason: if self.default_verified { None } else { Some("unsigned".to_string()) },
            })
        }
    }

    #[async_trait]
    impl BundleVerifier for FakeImageVerifier {
        async fn verify(&self, _bundle_ref: &str) -> Result<(), VerifyError> {
            if self.default_verified {
                Ok(())
            } else {
                Err(VerifyError::Failed("unsigned bundle".to_string()))
            }
        }
    }
}
