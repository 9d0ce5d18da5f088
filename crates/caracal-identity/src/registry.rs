use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use caracal_core::persist::{atomic_write_with_backups, read_if_exists, DEFAULT_BACKUP_COUNT};
use caracal_core::retry::RetryPolicy;
use caracal_core::{now_unix, PrincipalId};
use caracal_crypto::KeyPair;

use crate::error::RegistryError;
use crate::types::Principal;

struct Inner {
    principals: HashMap<PrincipalId, Principal>,
    name_index: HashMap<String, PrincipalId>,
}

/// Owns the `principal_id -> principal` map and the secondary `name ->
/// principal_id` index, persisted to a single JSON-array file via the
/// atomic-rename discipline. Grounded on `caracal/core/identity.py`'s
/// `AgentRegistry` for the operation set and persistence algorithm, and on
/// `chronx-state`'s typed-store shape for the in-memory wrapper.
pub struct PrincipalRegistry {
    inner: Mutex<Inner>,
    path: PathBuf,
    backup_count: u32,
}

impl PrincipalRegistry {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        Self::open_with_backups(path, DEFAULT_BACKUP_COUNT)
    }

    pub fn open_with_backups(path: impl Into<PathBuf>, backup_count: u32) -> Result<Self, RegistryError> {
        let path = path.into();
        let principals = load(&path)?;
        let mut name_index = HashMap::with_capacity(principals.len());
        let mut by_id = HashMap::with_capacity(principals.len());
        for p in principals {
            name_index.insert(p.name.clone(), p.id);
            by_id.insert(p.id, p);
        }
        Ok(Self {
            inner: Mutex::new(Inner {
                principals: by_id,
                name_index,
            }),
            path,
            backup_count,
        })
    }

    pub fn register(
        &self,
        name: &str,
        owner: &str,
        parent_id: Option<PrincipalId>,
        generate_keys: bool,
    ) -> Result<Principal, RegistryError> {
        let mut guard = self.inner.lock().unwrap();

        if guard.name_index.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        if let Some(parent) = parent_id {
            if !guard.principals.contains_key(&parent) {
                return Err(RegistryError::PrincipalNotFound(parent.to_string()));
            }
        }

        let mut metadata = std::collections::BTreeMap::new();
        if generate_keys {
            let kp = KeyPair::generate();
            let private_pem = kp
                .private_key_pem()
                .map_err(|e| RegistryError::Core(caracal_core::CoreError::Unknown(e.to_string())))?;
            metadata.insert("public_key_pem".to_string(), kp.public_key_pem);
            metadata.insert("private_key_pem".to_string(), private_pem);
        }

        let principal = Principal {
            id: PrincipalId::new(),
            name: name.to_string(),
            owner: owner.to_string(),
            created_at: now_unix(),
            parent_id,
            metadata,
        };

        guard.name_index.insert(principal.name.clone(), principal.id);
        guard.principals.insert(principal.id, principal.clone());

        self.persist(&guard.principals)?;
        tracing::info!(principal_id = %principal.id, name = %principal.name, "principal registered");
        Ok(principal)
    }

    pub fn get(&self, id: PrincipalId) -> Option<Principal> {
        self.inner.lock().unwrap().principals.get(&id).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<Principal> {
        let guard = self.inner.lock().unwrap();
        guard
            .name_index
            .get(name)
            .and_then(|id| guard.principals.get(id))
            .cloned()
    }

    pub fn list_all(&self) -> Vec<Principal> {
        self.inner.lock().unwrap().principals.values().cloned().collect()
    }

    pub fn children_of(&self, id: PrincipalId) -> Vec<Principal> {
        self.inner
            .lock()
            .unwrap()
            .principals
            .values()
            .filter(|p| p.parent_id == Some(id))
            .cloned()
            .collect()
    }

    /// Transitive descendants via DFS.
    pub fn descendants_of(&self, id: PrincipalId) -> Vec<Principal> {
        let guard = self.inner.lock().unwrap();
        let mut out = Vec::new();
        let mut stack: Vec<PrincipalId> = guard
            .principals
            .values()
            .filter(|p| p.parent_id == Some(id))
            .map(|p| p.id)
            .collect();
        while let Some(current) = stack.pop() {
            if let Some(p) = guard.principals.get(&current) {
                out.push(p.clone());
                stack.extend(
                    guard
                        .principals
                        .values()
                        .filter(|c| c.parent_id == Some(current))
                        .map(|c| c.id),
                );
            }
        }
        out
    }

    /// Reassign `id`'s parent, rejecting self-parenting and any reassignment
    /// that would create a cycle (walking up from `new_parent_id` looking
    /// for `id`).
    pub fn update_parent(
        &self,
        id: PrincipalId,
        new_parent_id: Option<PrincipalId>,
    ) -> Result<(), RegistryError> {
        let mut guard = self.inner.lock().unwrap();

        if !guard.principals.contains_key(&id) {
            return Err(RegistryError::PrincipalNotFound(id.to_string()));
        }

        if let Some(new_parent) = new_parent_id {
            if new_parent == id {
                return Err(RegistryError::Cycle);
            }
            if !guard.principals.contains_key(&new_parent) {
                return Err(RegistryError::PrincipalNotFound(new_parent.to_string()));
            }
            let mut walk = Some(new_parent);
            while let Some(current) = walk {
                if current == id {
                    return Err(RegistryError::Cycle);
                }
                walk = guard.principals.get(&current).and_then(|p| p.parent_id);
            }
        }

        if let Some(p) = guard.principals.get_mut(&id) {
            p.parent_id = new_parent_id;
        }
        self.persist(&guard.principals)?;
        Ok(())
    }

    /// Set or clear a single metadata key on a principal, e.g. `api_key_hash`
    /// after issuing a new API key. Unknown keys are accepted; the bag is
    /// intentionally open (spec §3 Principal `metadata`).
    pub fn set_metadata(&self, id: PrincipalId, key: &str, value: Option<String>) -> Result<(), RegistryError> {
        let mut guard = self.inner.lock().unwrap();
        let principal = guard
            .principals
            .get_mut(&id)
            .ok_or_else(|| RegistryError::PrincipalNotFound(id.to_string()))?;
        match value {
            Some(v) => principal.metadata.insert(key.to_string(), v),
            None => principal.metadata.remove(key),
        };
        self.persist(&guard.principals)?;
        Ok(())
    }

    fn persist(&self, principals: &HashMap<PrincipalId, Principal>) -> Result<(), RegistryError> {
        let list: Vec<&Principal> = principals.values().collect();
        let bytes = serde_json::to_vec_pretty(&list)
            .map_err(|e| RegistryError::Core(caracal_core::CoreError::Serialization(e.to_string())))?;
        atomic_write_with_backups(&self.path, &bytes, self.backup_count, RetryPolicy::default())
            .map_err(RegistryError::Core)
    }
}

fn load(path: &Path) -> Result<Vec<Principal>, RegistryError> {
    match read_if_exists(path).map_err(RegistryError::Core)? {
        None => Ok(Vec::new()),
        Some(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| RegistryError::Core(caracal_core::CoreError::Serialization(e.to_string()))),
    }
}
