//! Typed per-extension session state.
//!
//! Each extension stores one record per session, keyed by the record's type.
//! Lookups hand back the concrete type, so there are no string keys and no
//! unchecked casts.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

type StateSlot = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct ExtensionStates {
    slots: Mutex<HashMap<TypeId, StateSlot>>,
}

impl ExtensionStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|slot| slot.downcast::<T>().ok())
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.contains_key(&TypeId::of::<T>())
    }

    /// Returns the existing record or installs the one built by `init`.
    ///
    /// `init` runs under the session's state lock, so two concurrent callers
    /// cannot both create a record. The flag is `true` when this call created it.
    pub fn get_or_insert_with<T, F>(&self, init: F) -> (Arc<T>, bool)
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = slots
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|slot| slot.downcast::<T>().ok())
        {
            return (existing, false);
        }

        let created = Arc::new(init());
        slots.insert(TypeId::of::<T>(), created.clone());
        (created, true)
    }

    pub fn remove<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .remove(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast::<T>().ok())
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ExtensionStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionStates")
            .field("len", &self.len())
            .finish()
    }
}
