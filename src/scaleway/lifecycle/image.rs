//! Image resolution helpers for the Scaleway provider.
//!
//! Callers may pass either an image UUID or a marketplace label such as
//! `ubuntu_noble`. Labels resolve to the newest available image for the
//! architecture.

use scaleway_rs::{ScalewayImage, ScalewayListInstanceImagesBuilder};
use uuid::Uuid;

use crate::scaleway::IMAGE_ARCH;
use crate::scaleway::types::Zone;

use super::super::{ScalewayProvider, ScalewayProviderError};
use super::{HTTP_CLIENT, SCALEWAY_INSTANCE_API_BASE};

impl ScalewayProvider {
    /// Returns `true` when the image id or label is visible in `zone`.
    pub(in crate::scaleway) async fn lookup_image(
        &self,
        zone: &Zone,
        image: &str,
    ) -> Result<bool, ScalewayProviderError> {
        if Uuid::parse_str(image).is_err() {
            return Ok(!self.list_images_by_label(zone, image).await?.is_empty());
        }

        let url = format!(
            "{SCALEWAY_INSTANCE_API_BASE}/zones/{}/images/{image}",
            zone.as_str()
        );
        match self.send(HTTP_CLIENT.get(&url)).await {
            Ok(_) => Ok(true),
            Err(err) if err.has_status(404) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Resolves an image id or label to an image id.
    pub(in crate::scaleway) async fn resolve_image_id(
        &self,
        zone: &Zone,
        image: &str,
    ) -> Result<String, ScalewayProviderError> {
        if Uuid::parse_str(image).is_ok() {
            return Ok(image.to_owned());
        }
        let candidates = self.list_images_by_label(zone, image).await?;
        select_image_id(candidates).ok_or_else(|| ScalewayProviderError::ImageNotFound {
            label: image.to_owned(),
            arch: IMAGE_ARCH.to_owned(),
            zone: zone.as_str().to_owned(),
        })
    }

    async fn list_images_by_label(
        &self,
        zone: &Zone,
        label: &str,
    ) -> Result<Vec<ScalewayImage>, ScalewayProviderError> {
        let images = ScalewayListInstanceImagesBuilder::new(self.api.clone(), zone.as_str())
            .public(true)
            .name(label)
            .arch(IMAGE_ARCH)
            .run_async()
            .await?;
        Ok(filter_images(images))
    }
}

pub(in crate::scaleway) fn filter_images(images: Vec<ScalewayImage>) -> Vec<ScalewayImage> {
    images
        .into_iter()
        .filter(|image| image.arch == IMAGE_ARCH)
        .filter(|image| image.state == "available")
        .collect()
}

/// Picks the most recently created candidate.
pub(in crate::scaleway) fn select_image_id(candidates: Vec<ScalewayImage>) -> Option<String> {
    candidates
        .into_iter()
        .max_by(|lhs, rhs| lhs.creation_date.cmp(&rhs.creation_date))
        .map(|image| image.id)
}
