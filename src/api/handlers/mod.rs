mod admin;
mod images;

pub use admin::{admin_purge, health, requeue_image};
pub use images::{get_image_matches, get_image_status, list_images, process_image, upload_image};
