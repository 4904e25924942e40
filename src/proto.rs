// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Protobuf messages persisted in data file footers.

/// Location of one column chunk inside a data file.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ChunkLocation {
    #[prost(uint64, tag = "1")]
    pub offset: u64,
    #[prost(uint32, tag = "2")]
    pub length: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ColumnSchema {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(enumeration = "ColumnKind", tag = "2")]
    pub kind: i32,
    #[prost(enumeration = "DataType", tag = "3")]
    pub data_type: i32,
    /// Byte width of each dimension value, `0` for variable-length values.
    #[prost(uint32, tag = "4")]
    pub value_width: u32,
    #[prost(enumeration = "Encoding", repeated, tag = "5")]
    pub encodings: ::prost::alloc::vec::Vec<i32>,
    #[prost(uint32, tag = "6")]
    pub cardinality: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockletInfo {
    #[prost(uint32, tag = "1")]
    pub row_count: u32,
    #[prost(message, repeated, tag = "2")]
    pub dimension_chunks: ::prost::alloc::vec::Vec<ChunkLocation>,
    #[prost(message, repeated, tag = "3")]
    pub measure_chunks: ::prost::alloc::vec::Vec<ChunkLocation>,
    /// Min value of each dimension column in this blocklet.
    #[prost(bytes = "vec", repeated, tag = "4")]
    pub min_values: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    /// Max value of each dimension column in this blocklet.
    #[prost(bytes = "vec", repeated, tag = "5")]
    pub max_values: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataFileFooter {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(uint64, tag = "2")]
    pub num_rows: u64,
    #[prost(message, repeated, tag = "3")]
    pub columns: ::prost::alloc::vec::Vec<ColumnSchema>,
    #[prost(message, repeated, tag = "4")]
    pub blocklets: ::prost::alloc::vec::Vec<BlockletInfo>,
    /// Path of the data file. Not persisted by writers; filled in when the footer is read.
    #[prost(string, tag = "5")]
    pub file_path: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ColumnKind {
    Dimension = 0,
    Measure = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum DataType {
    Bytes = 0,
    Int32 = 1,
    Int64 = 2,
    Float64 = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Encoding {
    Dictionary = 0,
    DirectDictionary = 1,
    InvertedIndex = 2,
    Rle = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ChecksumType {
    None = 0,
    Crc32 = 1,
}
