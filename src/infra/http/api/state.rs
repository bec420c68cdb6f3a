use std::sync::Arc;

use crate::infra::bootstrap::AppServices;

#[derive(Clone)]
pub struct ApiState {
    pub services: Arc<AppServices>,
}

impl ApiState {
    pub fn new(services: AppServices) -> Self {
        Self {
            services: Arc::new(services),
        }
    }
}
