//! Machine-level computation graphs for the opal stub compiler.
//!
//! A [`Graph`] is a set of basic blocks filled with machine-level nodes
//! (constants, arithmetic, memory accesses, calls, control transfers).
//! [`GraphBuilder`] appends nodes one block at a time and records, for every
//! block, the order in which incoming control-flow edges were emitted; phi
//! nodes rely on that order to associate inputs with predecessors. The
//! higher-level stub assembler drives this crate and never manipulates node
//! storage directly.

#[macro_export]
macro_rules! entity_ref {
    {
        $(#[$attr:meta])*
        pub struct $ident:ident;
    } => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
        #[repr(transparent)]
        $(#[$attr])*
        pub struct $ident(u32);

        impl ::cranelift_entity::EntityRef for $ident {
            fn new(i: usize) -> Self {
                if i >= u32::MAX as usize {
                    // u32::MAX is a reserved value
                    panic!(concat!("too many entity refs of type ", stringify!($ident)));
                }
                Self(i as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl ::cranelift_entity::packed_option::ReservedValue for $ident {
            fn is_reserved_value(&self) -> bool {
                self.0 == u32::MAX
            }

            fn reserved_value() -> Self {
                Self(u32::MAX)
            }
        }
    };
}

#[macro_export]
macro_rules! entity_ref_16bit {
    {
        $(#[$attr:meta])*
        pub struct $ident:ident;
    } => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
        #[repr(transparent)]
        $(#[$attr])*
        pub struct $ident(u16);

        impl ::cranelift_entity::EntityRef for $ident {
            fn new(i: usize) -> Self {
                if i >= u16::MAX as usize {
                    // u16::MAX is a reserved value
                    panic!(concat!("too many entity refs of type ", stringify!($ident)));
                }
                Self(i as u16)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl ::cranelift_entity::packed_option::ReservedValue for $ident {
            fn is_reserved_value(&self) -> bool {
                self.0 == u16::MAX
            }

            fn reserved_value() -> Self {
                Self(u16::MAX)
            }
        }
    };
}

pub mod builder;
pub mod eval;
pub mod graph;
pub mod node;
pub mod schedule;

pub use builder::GraphBuilder;
pub use graph::{BasicBlock, BlockData, Graph, PointerWidth};
pub use node::{
    BinOp, CallDescriptor, ExternalRef, HeapRef, MachineRep, MachineType, Node, NodeData, UnOp,
    WriteBarrier,
};
pub use schedule::Schedule;
