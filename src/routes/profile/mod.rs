mod handler;
mod model;

pub use handler::{AVATAR_BUCKET, get_profile, list_statuses, update_profile, upload_avatar};
pub use model::UpdateProfileRequest;
