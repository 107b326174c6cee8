/// Image preparation for the remote model: decode, letterbox to a square canvas, encode.

pub mod decode;
pub mod encode;
pub mod letterbox;

pub use decode::{decode_image, DecodedImage};
pub use letterbox::{compute_placement, letterbox, preprocess, LetterboxMetadata, Placement, PreprocessedImage};
