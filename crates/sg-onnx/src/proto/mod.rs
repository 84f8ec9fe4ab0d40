//! Hand-written reader for the ONNX protobuf schema.

pub mod model;
pub mod tensor;
pub mod wire;

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use tracing::info;

use crate::error::Result;
use crate::graph::Model;

impl Model {
    /// Open and decode an ONNX model file.
    ///
    /// The file is memory-mapped and decoded in place; tensor payloads are
    /// copied into owned storage, so the mapping is released on return.
    pub fn open(path: impl AsRef<Path>) -> Result<Model> {
        let path = path.as_ref();
        let file = File::open(path)?;
        info!(path = %path.display(), "loading model");
        if file.metadata()?.len() == 0 {
            return Model::from_bytes(&[]);
        }
        // The mapping is read-only and dropped before this function returns.
        let mmap = unsafe { Mmap::map(&file)? };
        Model::from_bytes(&mmap)
    }

    /// Decode a serialized `ModelProto`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Model> {
        model::decode_model(bytes)
    }
}
