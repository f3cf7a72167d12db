//! Help page
//!
//! A static websocket console for trying the gateway from a browser.

use actix_files::NamedFile;
use actix_web::{web, Result};
use std::path::PathBuf;
use tracing::debug;

/// Location of the help page file
#[derive(Debug, Clone)]
pub struct HelpPage(PathBuf);

impl HelpPage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }
}

/// Serve the help page; a missing file is a 404
///
/// GET /
pub async fn help_page(page: web::Data<HelpPage>) -> Result<NamedFile> {
    debug!(path = %page.0.display(), "Serving help page");
    Ok(NamedFile::open_async(&page.0).await?)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(help_page));
}
