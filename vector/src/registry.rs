//! Process-wide refcounted registry of open vector stores (spec §5, §9).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use memnexus_core::Result;

use crate::VectorStore;

struct Entry {
    store: Arc<VectorStore>,
    refcount: usize,
}

type Registry = Mutex<HashMap<PathBuf, Entry>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

pub(crate) fn open(path: &Path, dimension: usize) -> Result<Arc<VectorStore>> {
    let mut reg = registry().lock();
    if let Some(entry) = reg.get_mut(path) {
        entry.refcount += 1;
        return Ok(Arc::clone(&entry.store));
    }
    let store = Arc::new(VectorStore::open_fresh(path, dimension)?);
    reg.insert(
        path.to_path_buf(),
        Entry {
            store: Arc::clone(&store),
            refcount: 1,
        },
    );
    Ok(store)
}

pub(crate) fn remove_session(path: &Path) -> Result<()> {
    let mut reg = registry().lock();
    let Some(entry) = reg.get_mut(path) else {
        return Ok(());
    };
    entry.refcount = entry.refcount.saturating_sub(1);
    if entry.refcount == 0 {
        let entry = reg.remove(path).expect("entry present under lock");
        entry.store.checkpoint()?;
    }
    Ok(())
}
