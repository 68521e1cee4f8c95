//! Building blocks of the streaming loop that do not depend on the transport:
//! the blob cache that holds encoded frames, the pose adapter wrapping the
//! inference backend, and the frame sources feeding it.
#![allow(missing_docs)]

pub mod blob;
pub mod encode;
pub mod error;
pub mod pose;
pub mod source;

pub use blob::{BlobStore, MemoryBlobStore, RedisBlobStore};
pub use encode::encode_png;
pub use error::{BlobError, PoseError, SourceError};
pub use pose::{
    EstimatorFactory, ModelDirFactory, PoseAdapter, PoseEstimator, RawHuman,
    RawKeypoint,
};
pub use source::{
    DefaultSourceOpener, Frame, FrameSource, ImageSource, SourceOpener,
    open_source,
};
