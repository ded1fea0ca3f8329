use std::sync::Arc;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::services::recognition::Recognizer;
use crate::services::run_lease::RunLease;
use crate::store::GradingStore;
use crate::tasks::analysis::AnalysisDriver;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: Arc<dyn GradingStore>,
    recognizer: Arc<dyn Recognizer>,
    lease: Arc<dyn RunLease>,
    redis: RedisHandle,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        store: Arc<dyn GradingStore>,
        recognizer: Arc<dyn Recognizer>,
        lease: Arc<dyn RunLease>,
        redis: RedisHandle,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, store, recognizer, lease, redis }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &dyn GradingStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    /// A driver sharing this process's recognition client, store and lease.
    pub(crate) fn analysis_driver(&self) -> AnalysisDriver {
        AnalysisDriver::new(
            self.inner.store.clone(),
            self.inner.recognizer.clone(),
            self.inner.lease.clone(),
            self.inner.settings.analysis(),
        )
    }
}
