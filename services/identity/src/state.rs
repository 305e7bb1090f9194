//! Application state shared across handlers

use std::sync::Arc;

use crate::roles::RoleRegistry;
use crate::service::IdentityService;
use crate::store::IdentityStore;

#[derive(Clone)]
pub struct AppState {
    pub service: IdentityService,
}

impl AppState {
    pub fn new(store: Arc<dyn IdentityStore>, registry: Arc<RoleRegistry>) -> Self {
        Self {
            service: IdentityService::new(store, registry),
        }
    }

    pub fn with_uniform_login_errors(mut self, uniform: bool) -> Self {
        self.service = self.service.with_uniform_login_errors(uniform);
        self
    }
}
