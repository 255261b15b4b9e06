pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;

use std::sync::Arc;

use crate::infra::gateway::PushGateway;
use crate::infra::store::{RecipientDirectory, RecordStore, TokenStore};

#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<dyn TokenStore>,
    pub records: Arc<dyn RecordStore>,
    pub directory: Arc<dyn RecipientDirectory>,
    pub gateway: Arc<dyn PushGateway>,
    pub admin_token: Option<String>,
    pub failure_threshold: i32,
}
