//! Storage layout resolution: hot/cold path mapping, device identity, and
//! the shared `active_captures.conf` listing.

mod active_captures;
mod device;
mod layout;

pub use active_captures::get_capture_base_directories;
pub use device::{DeviceInfo, get_device_info_from_capture_folder};
pub use layout::{
    FileClass, StorageLayout, calculate_chunk_location, copy_to_cold_storage,
    get_cold_storage_path, get_thumbnail_path_from_capture,
};
