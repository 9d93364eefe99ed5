// Sign-in / registration / sign-out glue over the identity service. All
// identity failures collapse to one user-facing message; the structured
// cause only goes to the log.
use std::sync::Arc;

use log::{error, info, warn};

use crate::client::error::ClientError;
use crate::common::models::ProfileUpdate;
use crate::remote::IdentityService;

pub struct AuthFlow {
    identity: Arc<dyn IdentityService>,
}

impl AuthFlow {
    pub fn new(identity: Arc<dyn IdentityService>) -> Self {
        Self { identity }
    }

    pub async fn sign_in(&self, email: &str, secret: &str) -> Result<(), ClientError> {
        if email.trim().is_empty() || secret.is_empty() {
            return Err(ClientError::AuthRejected);
        }
        match self.identity.sign_in(email.trim(), secret).await {
            Ok(()) => {
                info!("[AUTH] sign-in ok");
                Ok(())
            }
            Err(e) => {
                warn!("[AUTH] sign-in failed: {:#}", e);
                Err(ClientError::AuthRejected)
            }
        }
    }

    /// Registers a new account and, when a display name was chosen on the
    /// form, writes it to the fresh profile in the same flow.
    pub async fn register(
        &self,
        email: &str,
        secret: &str,
        display_name: &str,
    ) -> Result<(), ClientError> {
        if email.trim().is_empty() || secret.is_empty() {
            return Err(ClientError::AuthRejected);
        }
        if let Err(e) = self.identity.register_account(email.trim(), secret).await {
            warn!("[AUTH] registration failed: {:#}", e);
            return Err(ClientError::AuthRejected);
        }
        let name = display_name.trim();
        if !name.is_empty() {
            if let Err(e) = self
                .identity
                .update_profile_fields(ProfileUpdate {
                    display_name: Some(name.to_string()),
                    avatar_url: None,
                })
                .await
            {
                warn!("[AUTH] setting display name after registration failed: {:#}", e);
                return Err(ClientError::AuthRejected);
            }
        }
        info!("[AUTH] registration ok");
        Ok(())
    }

    /// Signs out. Failures are logged and swallowed: the identity stream is
    /// the source of truth for whatever state results.
    pub async fn sign_out(&self) {
        if let Err(e) = self.identity.sign_out().await {
            error!("[AUTH] sign-out failed: {:#}", e);
        }
    }
}
