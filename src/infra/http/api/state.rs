use std::sync::Arc;

use crate::application::storage::NodeStorage;

#[derive(Clone)]
pub struct ApiState {
    pub storage: Arc<NodeStorage>,
}

impl ApiState {
    pub fn new(storage: NodeStorage) -> Self {
        Self {
            storage: Arc::new(storage),
        }
    }
}
