// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Service names, image references, commits, and snapshot identifiers.

mod id;
mod image_ref;
mod service_name;
mod snapshot_id;

pub use id::{CommitId, ImageId};
pub use image_ref::{ImageRef, ParseImageRefError, normalize_tag};
pub use service_name::{ServiceName, ServiceNameError};
pub use snapshot_id::{ParseSnapshotIdError, SnapshotId};
