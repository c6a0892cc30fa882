//! Named attribute buffers
//!
//! A shader keeps one buffer per attribute name. Buffers it created are held
//! strongly; buffers borrowed from another shader through
//! [`GlShader::share_attrib`](crate::GlShader::share_attrib) are held as
//! `Weak` references. An alias stays valid only while the source shader keeps
//! the attribute; once the source frees it, the alias reads as absent.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use super::scalar::{AttribLayout, ScalarKind};

/// Version tag meaning "unset / invalidated": always re-upload
pub const VERSION_UNSET: i32 = -1;

/// GPU buffer plus the metadata of its last upload
#[derive(Debug)]
pub struct Buffer<B> {
    pub handle: B,
    pub kind: ScalarKind,
    /// Components per element
    pub dim: usize,
    /// Total number of components
    pub len: usize,
    pub version: i32,
}

impl<B> Buffer<B> {
    pub fn new(handle: B, layout: AttribLayout, version: i32) -> Self {
        Self {
            handle,
            kind: layout.kind,
            dim: layout.dim,
            len: layout.len,
            version,
        }
    }

    pub fn layout(&self) -> AttribLayout {
        AttribLayout::new(self.len, self.dim, self.kind)
    }

    pub fn byte_size(&self) -> usize {
        self.len * self.kind.size()
    }
}

pub(crate) type SharedBuffer<B> = Rc<RefCell<Buffer<B>>>;

enum Slot<B> {
    Owned(SharedBuffer<B>),
    Alias(Weak<RefCell<Buffer<B>>>),
}

/// Buffer removed from a registry
pub(crate) enum Removed<B> {
    /// The caller must delete the GPU storage
    Owned(B),
    Alias,
}

/// Attribute name -> buffer map of one shader
pub(crate) struct BufferRegistry<B> {
    slots: HashMap<String, Slot<B>>,
}

impl<B: Copy> BufferRegistry<B> {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    /// Live buffer registered under `name` (dead aliases read as absent)
    pub fn get(&self, name: &str) -> Option<SharedBuffer<B>> {
        match self.slots.get(name)? {
            Slot::Owned(buffer) => Some(Rc::clone(buffer)),
            Slot::Alias(weak) => weak.upgrade(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn insert_owned(&mut self, name: &str, buffer: Buffer<B>) -> SharedBuffer<B> {
        let buffer = Rc::new(RefCell::new(buffer));
        self.slots
            .insert(name.to_string(), Slot::Owned(Rc::clone(&buffer)));
        buffer
    }

    pub fn insert_alias(&mut self, name: &str, source: &SharedBuffer<B>) -> Option<Removed<B>> {
        self.slots
            .insert(name.to_string(), Slot::Alias(Rc::downgrade(source)))
            .map(Self::removed)
    }

    pub fn remove(&mut self, name: &str) -> Option<Removed<B>> {
        self.slots.remove(name).map(Self::removed)
    }

    /// Empty the registry, returning owned handles for deletion
    pub fn drain_owned(&mut self) -> Vec<B> {
        self.slots
            .drain()
            .filter_map(|(_, slot)| match Self::removed(slot) {
                Removed::Owned(handle) => Some(handle),
                Removed::Alias => None,
            })
            .collect()
    }

    /// Every live buffer with its name (dead aliases are skipped)
    pub fn live(&self) -> Vec<(String, SharedBuffer<B>)> {
        self.slots
            .keys()
            .filter_map(|name| self.get(name).map(|buffer| (name.clone(), buffer)))
            .collect()
    }

    /// Mark every live buffer for re-upload
    pub fn invalidate_all(&self) {
        for (_, buffer) in self.live() {
            buffer.borrow_mut().version = VERSION_UNSET;
        }
    }

    /// Bytes of every live slot, aliases included
    pub fn live_bytes(&self) -> usize {
        self.live()
            .iter()
            .map(|(_, buffer)| buffer.borrow().byte_size())
            .sum()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    fn removed(slot: Slot<B>) -> Removed<B> {
        match slot {
            Slot::Owned(buffer) => {
                let handle = buffer.borrow().handle;
                Removed::Owned(handle)
            }
            Slot::Alias(_) => Removed::Alias,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(len: usize, dim: usize) -> AttribLayout {
        AttribLayout::new(len, dim, ScalarKind::F32)
    }

    #[test]
    fn test_owned_and_alias_lookup() {
        let mut source = BufferRegistry::new();
        let shared = source.insert_owned("pos", Buffer::new(7u32, layout(12, 3), 1));

        let mut registry = BufferRegistry::new();
        assert!(registry.insert_alias("p", &shared).is_none());

        assert!(registry.contains("p"));
        assert_eq!(registry.get("p").unwrap().borrow().handle, 7);

        // Updates through the source are visible through the alias
        shared.borrow_mut().version = 5;
        assert_eq!(registry.get("p").unwrap().borrow().version, 5);
    }

    #[test]
    fn test_alias_dies_with_source() {
        let mut source = BufferRegistry::new();
        let shared = source.insert_owned("pos", Buffer::new(1u32, layout(3, 3), 1));
        let mut registry = BufferRegistry::new();
        registry.insert_alias("pos", &shared);
        drop(shared);

        assert!(matches!(source.remove("pos"), Some(Removed::Owned(1))));
        assert!(!registry.contains("pos"));
        assert!(registry.get("pos").is_none());
    }

    #[test]
    fn test_live_bytes_counts_live_aliases() {
        let mut source = BufferRegistry::new();
        let shared = source.insert_owned("pos", Buffer::new(1u32, layout(12, 3), 1));
        source.insert_owned(
            "idx",
            Buffer::new(2u32, AttribLayout::new(6, 3, ScalarKind::U16), 1),
        );

        let mut registry = BufferRegistry::new();
        registry.insert_alias("pos", &shared);

        assert_eq!(source.live_bytes(), 12 * 4 + 6 * 2);
        assert_eq!(registry.live_bytes(), 12 * 4);

        // A dead alias counts as freed
        drop(shared);
        source.remove("pos");
        assert_eq!(registry.live_bytes(), 0);
        assert!(registry.live().is_empty());
    }

    #[test]
    fn test_invalidate_and_drain() {
        let mut registry = BufferRegistry::new();
        registry.insert_owned("a", Buffer::new(1u32, layout(3, 3), 4));
        registry.insert_owned("b", Buffer::new(2u32, layout(3, 3), 9));

        registry.invalidate_all();
        assert_eq!(registry.get("a").unwrap().borrow().version, VERSION_UNSET);
        assert_eq!(registry.get("b").unwrap().borrow().version, VERSION_UNSET);

        let mut handles = registry.drain_owned();
        handles.sort();
        assert_eq!(handles, vec![1, 2]);
        assert_eq!(registry.len(), 0);
    }
}
