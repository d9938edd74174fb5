pub mod env_file;
pub mod logging;
pub mod shutdown;
