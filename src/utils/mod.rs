pub mod file_detection;
pub mod test_helpers;
pub mod tokens;
