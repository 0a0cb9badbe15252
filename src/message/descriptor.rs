//! Runtime symbol tables for controller message fields
//!
//! Every button, absolute axis and relative axis a controller or modifier
//! touches gets a small dense id, assigned in first-use order. Lookups are
//! case-insensitive, so user remap strings can address any registered name.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use thiserror::Error;

/// Which of the three namespaces a symbol lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Key,
    Abs,
    Rel,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKind::Key => write!(f, "key"),
            SymbolKind::Abs => write!(f, "abs"),
            SymbolKind::Rel => write!(f, "rel"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("not a valid {kind} name: {name}")]
    UnknownName { kind: SymbolKind, name: String },

    #[error("{kind} name cannot be empty")]
    EmptyName { kind: SymbolKind },
}

/// Id types stored in a [`SymbolTable`]
pub trait SymbolId: Copy + Eq + fmt::Debug {
    const KIND: SymbolKind;
    /// Range a symbol gets when registered without an explicit one
    const DEFAULT_RANGE: (i32, i32);

    fn from_index(index: usize) -> Self;
    fn index(self) -> usize;
}

macro_rules! symbol_id {
    ($(#[$meta:meta])* $name:ident, $kind:expr, $range:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u16);

        impl SymbolId for $name {
            const KIND: SymbolKind = $kind;
            const DEFAULT_RANGE: (i32, i32) = $range;

            fn from_index(index: usize) -> Self {
                $name(index as u16)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

symbol_id!(
    /// Button id
    KeyId,
    SymbolKind::Key,
    (0, 1)
);
symbol_id!(
    /// Absolute axis id
    AbsId,
    SymbolKind::Abs,
    (-32768, 32767)
);
symbol_id!(
    /// Relative axis id
    RelId,
    SymbolKind::Rel,
    (i32::MIN, i32::MAX)
);

/// One namespace: case-insensitive name to dense id, plus a declared range
#[derive(Debug, Clone)]
pub struct SymbolTable<I> {
    names: Vec<String>,
    ranges: Vec<(i32, i32)>,
    lookup: HashMap<String, usize>,
    _id: PhantomData<I>,
}

impl<I: SymbolId> Default for SymbolTable<I> {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            ranges: Vec::new(),
            lookup: HashMap::new(),
            _id: PhantomData,
        }
    }
}

impl<I: SymbolId> SymbolTable<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` or return the id it already has
    pub fn put(&mut self, name: &str) -> I {
        self.put_range(name, I::DEFAULT_RANGE.0, I::DEFAULT_RANGE.1)
    }

    /// Like [`put`](Self::put), declaring the range on first registration.
    ///
    /// The range of an existing symbol is never changed.
    pub fn put_range(&mut self, name: &str, min: i32, max: i32) -> I {
        let key = name.to_ascii_lowercase();
        if let Some(&index) = self.lookup.get(&key) {
            return I::from_index(index);
        }

        let index = self.names.len();
        self.names.push(name.to_string());
        self.ranges.push((min, max));
        self.lookup.insert(key, index);
        I::from_index(index)
    }

    /// Resolve a name that must already exist
    pub fn get(&self, name: &str) -> Result<I, DescriptorError> {
        if name.is_empty() {
            return Err(DescriptorError::EmptyName { kind: I::KIND });
        }
        self.lookup
            .get(&name.to_ascii_lowercase())
            .map(|&index| I::from_index(index))
            .ok_or_else(|| DescriptorError::UnknownName {
                kind: I::KIND,
                name: name.to_string(),
            })
    }

    /// Add an alternative spelling for an existing id
    pub fn alias(&mut self, name: &str, id: I) {
        self.lookup.insert(name.to_ascii_lowercase(), id.index());
    }

    /// Canonical spelling of an id
    pub fn name(&self, id: I) -> &str {
        self.names.get(id.index()).map(String::as_str).unwrap_or("?")
    }

    /// Declared `[min, max]` of an id
    pub fn range(&self, id: I) -> (i32, i32) {
        self.ranges.get(id.index()).copied().unwrap_or(I::DEFAULT_RANGE)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// All ids in registration order
    pub fn ids(&self) -> impl Iterator<Item = I> + '_ {
        (0..self.names.len()).map(I::from_index)
    }
}

/// The three symbol tables shared by one controller and its configs
#[derive(Debug, Clone, Default)]
pub struct MessageDescriptor {
    pub key: SymbolTable<KeyId>,
    pub abs: SymbolTable<AbsId>,
    pub rel: SymbolTable<RelId>,
}

impl MessageDescriptor {
    pub fn new() -> Self {
        Self::default()
    }
}
