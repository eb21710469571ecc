use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::{Error, Result};

/// At most one backup or migration import per user at a time.
#[derive(Clone, Default)]
pub struct ImportLocks {
    active: Arc<Mutex<HashSet<Uuid>>>,
}

/// Held for the duration of an import; releases the user on drop.
pub struct ImportGuard {
    active: Arc<Mutex<HashSet<Uuid>>>,
    user_id: Uuid,
}

impl ImportLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, user_id: Uuid) -> Result<ImportGuard> {
        if !self.active.lock().insert(user_id) {
            return Err(Error::Conflict(
                "another import is already running for this account".to_string(),
            ));
        }
        Ok(ImportGuard {
            active: self.active.clone(),
            user_id,
        })
    }
}

impl Drop for ImportGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_import_conflicts_until_release() {
        let locks = ImportLocks::new();
        let user = Uuid::new_v4();
        let guard = locks.acquire(user).unwrap();
        assert!(matches!(locks.acquire(user), Err(Error::Conflict(_))));
        // Other users are unaffected
        let _other = locks.acquire(Uuid::new_v4()).unwrap();
        drop(guard);
        assert!(locks.acquire(user).is_ok());
    }
}
