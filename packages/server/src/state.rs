use std::sync::Arc;

use common::storage::BlobStore;

use crate::config::AppConfig;
use crate::identity::AdminAllowList;
use crate::metadata::MetadataStore;
use crate::pipeline::{ArchiveBuilder, SoftDelete, UploadCoordinator};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub metadata: Arc<dyn MetadataStore>,
    pub uploads: UploadCoordinator,
    pub deletes: SoftDelete,
    pub archives: ArchiveBuilder,
    pub admins: Arc<AdminAllowList>,
}

impl AppState {
    /// Wire every pipeline component to the given stores.
    pub fn new(
        config: AppConfig,
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            uploads: UploadCoordinator::new(blobs.clone(), metadata.clone(), config.upload.clone()),
            deletes: SoftDelete::new(metadata.clone()),
            archives: ArchiveBuilder::new(blobs),
            admins: Arc::new(AdminAllowList::new(config.auth.admin_emails.iter().cloned())),
            metadata,
            config: Arc::new(config),
        }
    }
}

