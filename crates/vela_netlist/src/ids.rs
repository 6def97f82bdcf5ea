//! Opaque ID newtypes for objects inside a netlist module.

use crate::arena::ArenaId;
use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl ArenaId for $name {
            fn from_raw(index: u32) -> Self {
                Self(index)
            }

            fn as_raw(self) -> u32 {
                self.0
            }
        }
    };
}

define_id!(
    /// A wire within a module.
    WireId
);

define_id!(
    /// A cell within a module.
    CellId
);

define_id!(
    /// A memory within a module.
    MemoryId
);

define_id!(
    /// A process within a module.
    ProcessId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn distinct_ids_hash_differently() {
        let set: HashSet<WireId> = [WireId::from_raw(0), WireId::from_raw(1), WireId::from_raw(0)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
        assert_eq!(CellId::from_raw(7).as_raw(), 7);
    }
}
