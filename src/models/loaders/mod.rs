pub mod capture_loader;

pub use capture_loader::{load_capture_file, load_capture_folder, sniff_content_type};
