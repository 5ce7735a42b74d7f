use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::store::Store;
use crate::Result;

/// All stores under one root directory, one file per store, keyed by file
/// stem. Existing stores are discovered at startup; new ones are created
/// lazily on first write.
///
/// Store names are validated upstream by the routing layer, which rejects
/// path separators and other filesystem-unsafe characters.
pub struct Registry {
    root: PathBuf,
    stores: RwLock<HashMap<String, Arc<Store>>>,
}

impl Registry {
    /// Open every store file under `root`, creating the directory first
    /// when absent.
    pub fn open<P: Into<PathBuf>>(root: P) -> Result<Registry> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let mut stores = HashMap::new();
        for entry in fs::read_dir(&root)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            info!("loading store \"{}\" from \"{}\"", name, path.display());
            let store = Store::open(&path)?;
            info!(
                "store \"{}\" holds {} keys (format v{})",
                name,
                store.len(),
                store.version()
            );
            stores.insert(name.to_string(), Arc::new(store));
        }

        Ok(Registry {
            root,
            stores: RwLock::new(stores),
        })
    }

    /// Look up an existing store.
    pub fn get(&self, name: &str) -> Option<Arc<Store>> {
        self.stores.read().get(name).cloned()
    }

    /// Look up a store, creating its file on first use. Creation runs
    /// behind the write lock so two concurrent writers cannot both
    /// initialize the same file.
    pub fn get_or_create(&self, name: &str) -> Result<Arc<Store>> {
        if let Some(store) = self.get(name) {
            return Ok(store);
        }
        let mut stores = self.stores.write();
        if let Some(store) = stores.get(name) {
            return Ok(Arc::clone(store));
        }
        let store = Arc::new(Store::open(self.root.join(name))?);
        info!("created store \"{}\" at \"{}\"", name, store.path().display());
        stores.insert(name.to_string(), Arc::clone(&store));
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
