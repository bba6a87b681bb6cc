//! Lossless image encoding for the frames handed to the decision service.
//!
//! | Module    | Purpose                                            |
//! |-----------|----------------------------------------------------|
//! | `png`     | PNG container: signature, IHDR/IDAT/IEND, CRC-32   |
//! | `deflate` | zlib stream with LZ77 + fixed-Huffman compression  |

pub mod deflate;
pub mod png;

pub use png::{PngEncoder, encode_png};
