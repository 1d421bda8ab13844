pub mod decoder;
pub mod source;

pub use decoder::{decode, decode_with, DecodeOptions};
pub use source::{LineCodec, LineSource, SerialOpener, SourceOpener};
