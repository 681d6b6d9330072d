pub mod chunk_reader;
pub mod naming;
pub mod reader_service;
pub mod splitters;

pub use chunk_reader::{ChunkReader, ReadOutcome};
pub use naming::{NumberSuffixStrategy, RotationNamingStrategy};
pub use reader_service::{
    FileReaderService, ReaderHandle, ReaderServiceError, ReaderStats, ServiceState,
};
pub use splitters::{ChunkSplitter, NewlineChunkSplitter};
