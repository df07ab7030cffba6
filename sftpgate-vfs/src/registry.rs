//! Process-wide VFS engine registry.
//!
//! Backends register a factory under a short name at startup, before any
//! session is served; sessions never mutate the registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::{Vfs, VfsError};

/// Builds a backend from its parameter string (e.g. an access token).
pub type VfsFactory = fn(&str) -> Result<Arc<dyn Vfs>, VfsError>;

static ENGINES: Lazy<Mutex<HashMap<String, VfsFactory>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub fn register_engine(name: &str, factory: VfsFactory) {
    debug!(name, "registering vfs engine");
    #[allow(clippy::unwrap_used)]
    ENGINES.lock().unwrap().insert(name.to_owned(), factory);
}

pub fn open_engine(name: &str, params: &str) -> Result<Arc<dyn Vfs>, VfsError> {
    #[allow(clippy::unwrap_used)]
    let factory = ENGINES.lock().unwrap().get(name).copied();
    match factory {
        Some(factory) => factory(params),
        None => Err(VfsError::Other(format!("no vfs engine named '{name}'"))),
    }
}
