//! Off-chain asset publication.
//!
//! Image and metadata go to object storage before any transaction is built.
//! The two uploads have no ordering dependency (keys are deterministic, so the
//! metadata can reference the image URL while both are in flight) and run
//! concurrently. Published assets are never deleted by compensation.

use crate::clients::ObjectStore;
use crate::error::LaunchError;
use crate::types::LaunchRequest;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct PublishedAssets {
    pub image_url: String,
    pub metadata_url: String,
}

pub fn image_key(mint: &Pubkey, extension: &str) -> String {
    format!("images/{mint}.{extension}")
}

pub fn metadata_key(mint: &Pubkey) -> String {
    format!("metadata/{mint}.json")
}

pub struct AssetPublisher {
    objects: Arc<dyn ObjectStore>,
}

impl AssetPublisher {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    #[instrument(skip(self, request), fields(mint = %mint))]
    pub async fn publish(
        &self,
        request: &LaunchRequest,
        mint: &Pubkey,
    ) -> Result<PublishedAssets, LaunchError> {
        let image_key = image_key(mint, &request.image.extension);
        let image_url_for_metadata = self.objects.public_url(&image_key);

        let metadata = json!({
            "name": request.name,
            "symbol": request.symbol,
            "description": request.description,
            "image": image_url_for_metadata,
            "category": request.category,
        });
        let metadata_bytes = metadata.to_string().into_bytes();

        let image_upload = async {
            self.objects
                .put(&image_key, request.image.bytes.clone(), &request.image.content_type)
                .await
                .map_err(|e| LaunchError::Upload {
                    kind: "image",
                    reason: e.to_string(),
                })
        };
        let metadata_upload = async {
            self.objects
                .put(&metadata_key(mint), metadata_bytes, "application/json")
                .await
                .map_err(|e| LaunchError::Upload {
                    kind: "metadata",
                    reason: e.to_string(),
                })
        };

        let (image_url, metadata_url) = tokio::try_join!(image_upload, metadata_upload)?;
        info!(%image_url, %metadata_url, "published launch assets");

        Ok(PublishedAssets {
            image_url,
            metadata_url,
        })
    }
}
