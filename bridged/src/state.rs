use std::sync::Arc;

use crate::host::HttpHost;

#[derive(Clone)]
pub struct AppState {
    pub host: Arc<HttpHost>,
}
