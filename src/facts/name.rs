// SPDX-License-Identifier: BSD-3-Clause
//! Interned handles for program entities
//!
//! Every entity named by the input facts is assigned a small integer handle
//! at load time. Relations are sets of handle tuples, so equality and hashing
//! are trivial and recursive structures (recursive calls, cyclic heaps) never
//! need references between entities.

use std::fmt::Display;
use std::hash::Hash;

use rustc_hash::FxHashMap;

use super::error::FactError;

pub trait Handle: Copy + Eq + Hash + Ord {
    const KIND: &'static str;

    fn from_index(i: u32) -> Self;

    fn index(self) -> usize;
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Serialize)]
        pub struct $name(u32);

        impl Handle for $name {
            const KIND: &'static str = $kind;

            #[inline]
            fn from_index(i: u32) -> Self {
                $name(i)
            }

            #[inline]
            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", $kind, self.0)
            }
        }
    };
}

handle!(
    /// A method, identified by its unique signature
    MethodId,
    "method"
);
handle!(
    /// A local, parameter, `this` or return slot, scoped to one method
    VarId,
    "var"
);
handle!(
    /// An allocation site, the abstract heap object for everything allocated
    /// there
    HeapId,
    "heap"
);
handle!(
    /// A field, by name only
    FieldId,
    "field"
);
handle!(
    /// A call location inside some method
    InvokeId,
    "invoke"
);
handle!(TypeId, "type");
handle!(
    /// A simple method name such as `toString`, used for virtual dispatch
    NameId,
    "name"
);

/// Bidirectional map between keys and dense handles.
#[derive(Debug)]
pub struct Interner<K, H> {
    ids: FxHashMap<K, H>,
    keys: Vec<K>,
}

impl<K, H> Default for Interner<K, H> {
    fn default() -> Self {
        Interner {
            ids: FxHashMap::default(),
            keys: Vec::new(),
        }
    }
}

impl<K: Clone + Eq + Hash, H: Handle> Interner<K, H> {
    pub fn intern(&mut self, key: K) -> Result<H, FactError> {
        if let Some(h) = self.ids.get(&key) {
            return Ok(*h);
        }
        let i = u32::try_from(self.keys.len()).map_err(|_| FactError::TooMany(H::KIND))?;
        let h = H::from_index(i);
        self.ids.insert(key.clone(), h);
        self.keys.push(key);
        Ok(h)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<H>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.ids.get(key).copied()
    }

    /// Panics if the handle came from a different interner.
    #[inline]
    pub fn key(&self, h: H) -> &K {
        &self.keys[h.index()]
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = H> + '_ {
        (0..self.keys.len()).map(|i| H::from_index(i as u32))
    }
}
