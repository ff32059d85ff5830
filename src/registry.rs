//! Registry of configurable objects, keyed by the address range each one
//! occupies. Lets a container find the parameters that live inside it without
//! every parameter having to be declared to it explicitly.
//!
//! The registry is a plain value: whoever owns the objects creates one and
//! passes it around. Sharing it between threads means wrapping it in a lock.

use std::collections::BTreeMap;

use strum::Display;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Kind {
    Generator,
    GeneratorParam,
    FilterParam,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo<T> {
    /// What queries hand back; need not be the registered object itself
    pub subject: T,
    /// Bytes covered by the instance. Zero when not known yet, in which case
    /// nothing is considered to be inside it.
    pub size: usize,
    pub kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("an instance is already registered at {address:#x}")]
    AlreadyRegistered { address: usize },
    #[error("no instance is registered at {address:#x}")]
    NotRegistered { address: usize },
    #[error("instance at {address:#x} already has size {current}, can't change it to {requested}")]
    SizeMismatch {
        address: usize,
        current: usize,
        requested: usize,
    },
}

#[derive(Debug)]
pub struct InstanceRegistry<T> {
    instances: BTreeMap<usize, InstanceInfo<T>>,
}

impl<T> Default for InstanceRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InstanceRegistry<T> {
    pub fn new() -> Self {
        Self {
            instances: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, address: usize) -> Option<&InstanceInfo<T>> {
        self.instances.get(&address)
    }

    pub fn register(
        &mut self,
        address: usize,
        size: usize,
        kind: Kind,
        subject: T,
    ) -> Result<(), RegistryError> {
        if self.instances.contains_key(&address) {
            return Err(RegistryError::AlreadyRegistered { address });
        }

        self.instances.insert(address, InstanceInfo { subject, size, kind });

        Ok(())
    }

    /// Sets the size of an instance registered before its size was known. The
    /// size can be set once; repeating the same size is allowed.
    pub fn update_instance_size(&mut self, address: usize, size: usize) -> Result<(), RegistryError> {
        let info = self
            .instances
            .get_mut(&address)
            .ok_or(RegistryError::NotRegistered { address })?;

        if info.size != 0 && info.size != size {
            return Err(RegistryError::SizeMismatch {
                address,
                current: info.size,
                requested: size,
            });
        }

        info.size = size;

        Ok(())
    }

    pub fn unregister(&mut self, address: usize) -> Result<InstanceInfo<T>, RegistryError> {
        self.instances
            .remove(&address)
            .ok_or(RegistryError::NotRegistered { address })
    }
}

impl<T: Clone> InstanceRegistry<T> {
    /// Subjects of every instance of `kind` registered directly inside
    /// `[start, start + size)`, in address order. An instance with a known
    /// size that starts strictly inside the range is a container of its own:
    /// it is reported if it matches, but whatever lies inside it is skipped.
    pub fn instances_in_range(&self, start: usize, size: usize, kind: Kind) -> Vec<T> {
        let limit = start.saturating_add(size);
        let mut results = Vec::new();
        let mut cursor = start;

        while let Some((&address, info)) = self.instances.range(cursor..).next() {
            if address >= limit {
                break;
            }

            if info.kind == kind {
                results.push(info.subject.clone());
            }

            cursor = if address > start && info.size != 0 {
                address.saturating_add(info.size)
            } else {
                address + 1
            };
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let mut registry = InstanceRegistry::new();

        registry.register(0x100, 0, Kind::Generator, "gen").unwrap();
        assert_eq!(
            registry.register(0x100, 8, Kind::FilterParam, "dup"),
            Err(RegistryError::AlreadyRegistered { address: 0x100 })
        );

        registry.update_instance_size(0x100, 64).unwrap();
        registry.update_instance_size(0x100, 64).unwrap();
        assert_eq!(registry.get(0x100).map(|info| info.size), Some(64));
        assert_eq!(
            registry.update_instance_size(0x100, 32),
            Err(RegistryError::SizeMismatch {
                address: 0x100,
                current: 64,
                requested: 32
            })
        );

        assert_eq!(registry.unregister(0x100).unwrap().size, 64);
        assert!(registry.is_empty());
        assert_eq!(
            registry.unregister(0x100).unwrap_err().to_string(),
            "no instance is registered at 0x100"
        );
    }

    #[test]
    fn skips_instances_inside_nested_containers() {
        let mut registry = InstanceRegistry::new();

        // A generator at 0x100..0x200 holding a param, a nested generator at
        // 0x140..0x180 holding its own param, and another direct param.
        registry.register(0x100, 0x100, Kind::Generator, "outer").unwrap();
        registry.register(0x108, 0, Kind::GeneratorParam, "p1").unwrap();
        registry.register(0x140, 0x40, Kind::Generator, "inner").unwrap();
        registry.register(0x148, 0, Kind::GeneratorParam, "nested").unwrap();
        registry.register(0x190, 0, Kind::GeneratorParam, "p2").unwrap();
        registry.register(0x200, 0, Kind::GeneratorParam, "outside").unwrap();

        assert_eq!(
            registry.instances_in_range(0x100, 0x100, Kind::GeneratorParam),
            vec!["p1", "p2"]
        );
        assert_eq!(
            registry.instances_in_range(0x100, 0x100, Kind::Generator),
            vec!["outer", "inner"]
        );
        assert_eq!(
            registry.instances_in_range(0x140, 0x40, Kind::GeneratorParam),
            vec!["nested"]
        );
    }
}
