// @generated
// Generated from src/protos/puffin/puffin.proto
// (prost output, checked in because the build environment has no `protoc`).
/// A bit-addressed extent (deflate streams are not byte aligned).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BitExtent {
    #[prost(uint64, tag = "1")]
    pub offset: u64,
    #[prost(uint64, tag = "2")]
    pub length: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PatchHeader {
    #[prost(int32, tag = "1")]
    pub version: i32,
    /// Locations of deflate streams in the source and destination that are
    /// re-expanded ("puffed") before diffing.
    #[prost(message, repeated, tag = "2")]
    pub src_deflates: ::prost::alloc::vec::Vec<BitExtent>,
    #[prost(message, repeated, tag = "3")]
    pub dst_deflates: ::prost::alloc::vec::Vec<BitExtent>,
    /// Locations of the corresponding puffed streams.
    #[prost(message, repeated, tag = "4")]
    pub src_puffs: ::prost::alloc::vec::Vec<BitExtent>,
    #[prost(message, repeated, tag = "5")]
    pub dst_puffs: ::prost::alloc::vec::Vec<BitExtent>,
    #[prost(uint64, tag = "6")]
    pub src_puff_size: u64,
    #[prost(uint64, tag = "7")]
    pub dst_puff_size: u64,
    #[prost(enumeration = "patch_header::PatchType", tag = "8")]
    pub r#type: i32,
}
/// Nested message and enum types in `PatchHeader`.
pub mod patch_header {
    #[derive(
        Clone,
        Copy,
        Debug,
        PartialEq,
        Eq,
        Hash,
        PartialOrd,
        Ord,
        ::prost::Enumeration
    )]
    #[repr(i32)]
    pub enum PatchType {
        Bsdiff = 0,
        Zucchini = 1,
    }
    impl PatchType {
        /// String value of the enum field names used in the ProtoBuf definition.
        pub fn as_str_name(&self) -> &'static str {
            match self {
                Self::Bsdiff => "BSDIFF",
                Self::Zucchini => "ZUCCHINI",
            }
        }
        /// Creates an enum from field names used in the ProtoBuf definition.
        pub fn from_str_name(value: &str) -> ::core::option::Option<Self> {
            match value {
                "BSDIFF" => Some(Self::Bsdiff),
                "ZUCCHINI" => Some(Self::Zucchini),
                _ => None,
            }
        }
    }
}
