// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Generational slot arena backing controller and router handles.

/// Typed handle into an [`Arena`].
pub(crate) trait ArenaKey: Copy {
    fn from_parts(idx: u32, generation: u32) -> Self;
    fn parts(self) -> (u32, u32);
}

macro_rules! arena_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub struct $name(u32, u32);

        impl $crate::arena::ArenaKey for $name {
            fn from_parts(idx: u32, generation: u32) -> Self {
                Self(idx, generation)
            }

            fn parts(self) -> (u32, u32) {
                (self.0, self.1)
            }
        }
    };
}

arena_key! {
    /// Generational handle of a controller owned by a [`LifecycleHandler`](crate::LifecycleHandler).
    ///
    /// Handles become stale once the controller is destroyed and reaped; stale handles
    /// never alias a newer controller.
    ControllerId
}

arena_key! {
    /// Generational handle of a router owned by a [`LifecycleHandler`](crate::LifecycleHandler).
    RouterId
}

/// Slots plus a generation per slot; freed slots are reused with a bumped generation.
#[derive(Debug)]
pub(crate) struct Arena<K, T> {
    slots: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: Vec<usize>,
    _key: core::marker::PhantomData<K>,
}

impl<K: ArenaKey, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            _key: core::marker::PhantomData,
        }
    }
}

impl<K: ArenaKey, T> Arena<K, T> {
    pub(crate) fn insert(&mut self, value: T) -> K {
        self.insert_with(|_| value)
    }

    /// Insert a value that needs to know its own key.
    pub(crate) fn insert_with(&mut self, make: impl FnOnce(K) -> T) -> K {
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            (idx, self.generations[idx].saturating_add(1))
        } else {
            self.slots.push(None);
            self.generations.push(0);
            (self.slots.len() - 1, 1)
        };
        #[allow(
            clippy::cast_possible_truncation,
            reason = "Handles use 32-bit indices by design."
        )]
        let key = K::from_parts(idx as u32, generation);
        self.generations[idx] = generation;
        self.slots[idx] = Some(make(key));
        key
    }

    pub(crate) fn remove(&mut self, key: K) -> Option<T> {
        if !self.contains(key) {
            return None;
        }
        let idx = key.parts().0 as usize;
        self.free_list.push(idx);
        self.slots[idx].take()
    }

    pub(crate) fn contains(&self, key: K) -> bool {
        let (idx, generation) = key.parts();
        let idx = idx as usize;
        self.generations.get(idx) == Some(&generation)
            && self.slots.get(idx).is_some_and(Option::is_some)
    }

    pub(crate) fn get(&self, key: K) -> Option<&T> {
        if !self.contains(key) {
            return None;
        }
        self.slots[key.parts().0 as usize].as_ref()
    }

    pub(crate) fn get_mut(&mut self, key: K) -> Option<&mut T> {
        if !self.contains(key) {
            return None;
        }
        self.slots[key.parts().0 as usize].as_mut()
    }

    pub(crate) fn keys(&self) -> Vec<K> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| {
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "Handles use 32-bit indices by design."
                )]
                let idx = i as u32;
                K::from_parts(idx, self.generations[i])
            })
            .collect()
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(Option::as_ref)
    }
}
