pub mod proto {
    #[allow(clippy::all)]
    pub mod chromeos_update_engine {
        include!("proto_gen/chromeos_update_engine.rs");
    }

    #[allow(clippy::all)]
    pub mod puffin {
        include!("proto_gen/puffin.rs");
    }
}

pub mod cmd;
pub mod codec;
pub mod error;
pub mod extent;
pub mod extract;
pub mod manifest;
pub mod patch;
pub mod payload;
pub mod progress;

pub use crate::error::{Error, Result};
pub use crate::extract::{ExtractOptions, Extractor, PartitionReport};
pub use crate::manifest::Manifest;
pub use crate::payload::Payload;
