// SPDX-License-Identifier: BSD-3-Clause
//! Virtual dispatch resolution
//!
//! The facts carry no class hierarchy, so a virtual call on an object of
//! type `T` resolves to the methods named `n` that `T` itself declares. When
//! `T` declares several methods with that name (overloads), each of them is
//! a possible target.

use rustc_hash::FxHashMap;

use crate::facts::{MethodId, NameId, TypeId};

#[derive(Debug, Default)]
pub struct Dispatch {
    targets: FxHashMap<(TypeId, NameId), Vec<MethodId>>,
}

impl Dispatch {
    pub fn new(methods: impl IntoIterator<Item = (TypeId, NameId, MethodId)>) -> Self {
        let mut targets: FxHashMap<(TypeId, NameId), Vec<MethodId>> = FxHashMap::default();
        for (ty, name, method) in methods {
            let ms = targets.entry((ty, name)).or_default();
            if !ms.contains(&method) {
                ms.push(method);
            }
        }
        for ms in targets.values_mut() {
            ms.sort();
        }
        Dispatch { targets }
    }

    /// Methods named `name` visible from `ty`. Empty if there are none, which
    /// is not an error.
    #[inline]
    pub fn resolve(&self, ty: TypeId, name: NameId) -> &[MethodId] {
        self.targets
            .get(&(ty, name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.targets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
