//! Instance registry.

use crate::error::{CoreError, CoreResult};
use crate::instance::{
    AnyInstance, DatabaseInstance, InstanceContext, InstanceFactory, InstanceType, RestoreGate,
};
use argentdb_storage::Driver;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One registered instance.
pub(crate) struct InstanceBinding {
    name: String,
    owner: InstanceType,
    instance: Arc<dyn DatabaseInstance>,
    any: AnyInstance,
    gate: RestoreGate,
    driver_name: &'static str,
}

/// Handle to a registered instance.
///
/// Handles are cheap to clone. Every handle for a name refers to the same
/// binding for the lifetime of the engine; compare with
/// [`ptr_eq`](Self::ptr_eq).
#[derive(Clone)]
pub struct DatabaseHandle {
    binding: Arc<InstanceBinding>,
}

impl DatabaseHandle {
    /// The instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.binding.name
    }

    /// The type the instance was registered as.
    #[must_use]
    pub fn owner_type(&self) -> InstanceType {
        self.binding.owner
    }

    /// Kind of driver the instance owns.
    #[must_use]
    pub fn driver_name(&self) -> &'static str {
        self.binding.driver_name
    }

    /// The instance, through the engine-facing contract.
    #[must_use]
    pub fn instance(&self) -> &Arc<dyn DatabaseInstance> {
        &self.binding.instance
    }

    /// Returns whether a restore is running against the instance.
    #[must_use]
    pub fn is_restoring(&self) -> bool {
        self.binding.gate.is_active()
    }

    /// The concrete instance.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeMismatch`] if the instance is not a `T`.
    pub fn downcast<T: InstanceFactory>(&self) -> CoreResult<Arc<T>> {
        Arc::clone(&self.binding.any)
            .downcast::<T>()
            .map_err(|_| CoreError::type_mismatch(T::TYPE_NAME, self.binding.owner.name()))
    }

    /// Returns whether both handles refer to the same binding.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.binding, &b.binding)
    }

    pub(crate) fn gate(&self) -> &RestoreGate {
        &self.binding.gate
    }
}

impl fmt::Debug for DatabaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseHandle")
            .field("name", &self.binding.name)
            .field("owner", &self.binding.owner.name())
            .field("driver", &self.binding.driver_name)
            .finish()
    }
}

/// Name-keyed map of bindings.
///
/// The write lock is the single serialization point for uniqueness: the
/// name check, instance construction and insertion happen under one guard.
/// Construction opens the driver and loads every persisted table, so lookups
/// (including the lookup step of backups and restores) wait for any
/// registration in progress, disk I/O included.
#[derive(Default)]
pub(crate) struct Registry {
    bindings: RwLock<HashMap<String, Arc<InstanceBinding>>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Constructs and binds a `T` named `name`.
    ///
    /// `context` assembles the instance context from the name, the driver
    /// and the binding's restore gate. `T::create` runs with the write lock
    /// held.
    pub(crate) fn register<T, F>(
        &self,
        name: &str,
        driver: Box<dyn Driver>,
        context: F,
    ) -> CoreResult<DatabaseHandle>
    where
        T: InstanceFactory,
        F: FnOnce(&str, Box<dyn Driver>, RestoreGate) -> InstanceContext,
    {
        let owner = InstanceType::of::<T>();
        let mut bindings = self.bindings.write();

        if bindings.contains_key(name) {
            return Err(CoreError::DuplicateName {
                name: name.to_string(),
            });
        }
        if let Some(clash) = bindings
            .values()
            .find(|b| b.owner.name() == owner.name() && b.owner != owner)
        {
            return Err(CoreError::type_mismatch(
                format!("{} (bound by '{}')", clash.owner.name(), clash.name),
                format!("another type named {}", owner.name()),
            ));
        }

        let driver_name = driver.name();
        let gate = RestoreGate::new(name);
        let instance = Arc::new(T::create(context(name, driver, gate.clone()))?);
        let binding = Arc::new(InstanceBinding {
            name: name.to_string(),
            owner,
            instance: Arc::clone(&instance) as Arc<dyn DatabaseInstance>,
            any: instance,
            gate,
            driver_name,
        });
        bindings.insert(name.to_string(), Arc::clone(&binding));
        Ok(DatabaseHandle { binding })
    }

    pub(crate) fn get(&self, name: &str) -> CoreResult<DatabaseHandle> {
        self.bindings
            .read()
            .get(name)
            .map(|binding| DatabaseHandle {
                binding: Arc::clone(binding),
            })
            .ok_or_else(|| CoreError::InstanceNotFound {
                name: name.to_string(),
            })
    }

    /// All handles, sorted by name.
    pub(crate) fn all(&self) -> Vec<DatabaseHandle> {
        let mut handles: Vec<DatabaseHandle> = self
            .bindings
            .read()
            .values()
            .map(|binding| DatabaseHandle {
                binding: Arc::clone(binding),
            })
            .collect();
        handles.sort_by(|a, b| a.name().cmp(b.name()));
        handles
    }

    /// Handles bound to `owner`, sorted by name.
    pub(crate) fn of_type(&self, owner: InstanceType) -> Vec<DatabaseHandle> {
        let mut handles = self.all();
        handles.retain(|h| h.owner_type() == owner);
        handles
    }

    /// The single handle bound to `owner`.
    pub(crate) fn unique_of_type(&self, owner: InstanceType) -> CoreResult<DatabaseHandle> {
        let mut handles = self.of_type(owner);
        match handles.len() {
            0 => Err(CoreError::NoInstanceForType {
                type_name: owner.name().to_string(),
            }),
            1 => Ok(handles.remove(0)),
            _ => Err(CoreError::AmbiguousType {
                type_name: owner.name().to_string(),
                instances: handles.iter().map(|h| h.name().to_string()).collect(),
            }),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.bindings.read().len()
    }
}

/// Checks an instance name.
///
/// Built-in drivers accept every name that passes; the file driver encodes
/// names that are not safe as directory names.
pub(crate) fn validate_instance_name(name: &str, max_len: usize) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::invalid_name(name, "name is empty"));
    }
    if name.len() > max_len {
        return Err(CoreError::invalid_name(
            name,
            format!("name is longer than {max_len} bytes"),
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(CoreError::invalid_name(name, "name contains control characters"));
    }
    Ok(())
}
