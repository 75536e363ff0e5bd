use std::sync::Arc;

use mcm_kubevirt::MachineDriver;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub driver: Arc<dyn MachineDriver>,
    pub config: AppConfig,
}
