pub mod cleanup;
pub mod compress;
pub mod dependencies;
pub mod jobs;
pub mod related;
