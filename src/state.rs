use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::llm::ImageSynthesizer;
use crate::studio::{Catalog, StudioSession};

/// Shared bot state. Each chat owns one studio session; the lock is never held
/// across an await.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub synthesizer: Arc<dyn ImageSynthesizer>,
    sessions: Arc<Mutex<HashMap<i64, StudioSession>>>,
}

impl AppState {
    pub fn new(catalog: Arc<Catalog>, synthesizer: Arc<dyn ImageSynthesizer>) -> Self {
        AppState {
            catalog,
            synthesizer,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_session<R>(&self, chat_id: i64, f: impl FnOnce(&mut StudioSession) -> R) -> R {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .entry(chat_id)
            .or_insert_with(|| StudioSession::new(self.catalog.clone()));
        f(session)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}
