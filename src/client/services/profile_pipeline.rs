// Profile mutations: the avatar pipeline (pick → read → upload → resolve
// URL → bind) and display-name updates. The profile write is always the
// last step, so the record is either fully updated or untouched.
use std::sync::Arc;

use anyhow::Context;
use log::{debug, info};

use crate::common::models::{ProfileUpdate, UserProfile};
use crate::remote::{BlobStore, IdentityService, ImagePicker};

pub struct ProfilePipeline {
    picker: Arc<dyn ImagePicker>,
    blobs: Arc<dyn BlobStore>,
    identity: Arc<dyn IdentityService>,
    avatar_prefix: String,
}

impl ProfilePipeline {
    pub fn new(
        picker: Arc<dyn ImagePicker>,
        blobs: Arc<dyn BlobStore>,
        identity: Arc<dyn IdentityService>,
        avatar_prefix: &str,
    ) -> Self {
        Self {
            picker,
            blobs,
            identity,
            avatar_prefix: avatar_prefix.to_string(),
        }
    }

    /// Runs the full avatar pipeline for the given user. Returns the bound
    /// URL, or `None` when the picker was cancelled (a normal, silent
    /// outcome). The object key is derived from the user id, so repeated
    /// uploads overwrite the same object.
    pub async fn update_avatar(&self, profile: &UserProfile) -> anyhow::Result<Option<String>> {
        let picked = match self.picker.pick_image().await? {
            Some(picked) => picked,
            None => {
                debug!("[PROFILE] image pick cancelled");
                return Ok(None);
            }
        };
        let bytes = self
            .picker
            .read_image(&picked)
            .await
            .context("reading picked image")?;
        let key = format!("{}/{}", self.avatar_prefix, profile.user_id);
        let object = self
            .blobs
            .put_object(&key, bytes)
            .await
            .context("uploading avatar")?;
        let url = self
            .blobs
            .get_public_url(&object)
            .await
            .context("resolving avatar url")?;
        self.identity
            .update_profile_fields(ProfileUpdate {
                display_name: None,
                avatar_url: Some(url.clone()),
            })
            .await
            .context("binding avatar url to profile")?;
        info!("[PROFILE] avatar updated for {}", profile.user_id);
        Ok(Some(url))
    }

    /// Writes a new display name. A blank name is a silent no-op; returns
    /// whether a write happened.
    pub async fn update_display_name(&self, name: &str) -> anyhow::Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(false);
        }
        self.identity
            .update_profile_fields(ProfileUpdate {
                display_name: Some(name.to_string()),
                avatar_url: None,
            })
            .await?;
        info!("[PROFILE] display name updated");
        Ok(true)
    }
}
