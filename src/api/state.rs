//! Shared state for API handlers.

use crate::learning::LearningCoordinator;

use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ApiState {
    pub coordinator: Arc<LearningCoordinator>,
}

impl ApiState {
    pub fn new(coordinator: Arc<LearningCoordinator>) -> Self {
        Self { coordinator }
    }
}
