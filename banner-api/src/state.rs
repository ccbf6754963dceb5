//! Shared handler state

use banner_core::BannerError;
use banner_storage::BannerService;

use crate::config::ApiConfig;
use crate::error::{ApiError, ErrorRenderer};

/// State handed to every banner route.
#[derive(Clone)]
pub struct AppState {
    pub service: BannerService,
    pub renderer: ErrorRenderer,
    /// Listing limit applied when a request gives none. 0 = unlimited.
    pub default_page_limit: u64,
}

impl AppState {
    pub fn new(service: BannerService, config: &ApiConfig) -> Self {
        Self {
            service,
            renderer: ErrorRenderer::new(config.error_verbosity),
            default_page_limit: config.default_page_limit,
        }
    }

    pub fn render(&self, err: BannerError) -> ApiError {
        self.renderer.render(err)
    }
}
