// In-process session storage
//
// Useful for tests and single-process deployments. Expired entries are
// removed lazily on read.

use crate::error::SessionResult;
use crate::server_side::SessionStorage;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStorage for MemoryStorage {
    async fn get(&self, key: &str) -> SessionResult<Option<Vec<u8>>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((_, deadline)) if *deadline <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, expires_in: Duration) -> SessionResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), (value, Instant::now() + expires_in));
        Ok(())
    }

    async fn delete(&self, key: &str) -> SessionResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
