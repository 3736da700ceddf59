pub mod check;
pub mod config;
pub mod library;
pub mod record;

use anyhow::Context;

use scribecast_common::config::AppConfig;
use scribecast_content_model::ContentLibrary;

/// The configured library seed, or the built-in one.
pub fn load_library(config: &AppConfig) -> anyhow::Result<ContentLibrary> {
    match &config.library_seed {
        Some(path) => ContentLibrary::load(path)
            .with_context(|| format!("loading library seed {}", path.display())),
        None => Ok(ContentLibrary::seeded()),
    }
}
