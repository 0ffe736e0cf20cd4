// Module naming follows project convention (Core = shared substrate, Bus = message lifecycle)
pub mod error;

pub use error::{Error, Result};

#[allow(non_snake_case)]
pub mod Core {
    pub mod SharedMemory;
    pub use SharedMemory::{
        create_shared_memory, HeapMemory, RawHandle, SharedMemoryBackend,
    };
    pub mod alloc;
    pub use alloc::{Pool, PoolSlice};
    pub mod fdtable;
    pub mod handle;
    pub mod quota;
}

#[allow(non_snake_case)]
pub mod Bus {
    pub mod builder;
    pub mod peer;
    pub use builder::PeerBuilder;
    pub use peer::{Peer, PeerInfo};

    pub mod Msg {
        pub mod layout;
        pub mod Msg;
        pub mod Msg_impl;
        pub use Msg::{Binding, Message}; // re-export for stable path
    }
    pub mod Structs {
        pub mod Message_Structs;
        pub use Message_Structs::{MessageData, QueueNode, QueueNodeKind, TransactionLink}; // re-export for stable path
    }
}

#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}
