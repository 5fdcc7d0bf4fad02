//! Binary diff-patch application for delta payloads.

mod bspatch;
mod puffpatch;

pub use bspatch::bspatch;
pub use puffpatch::puffpatch;
