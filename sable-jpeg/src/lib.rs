/*!
A memory-safe, pure-Rust baseline JPEG decoder.

`sable-jpeg` decodes baseline sequential JPEG/JFIF images (ITU-T T.81) into
interleaved 8-bit RGB. Grayscale images are expanded to RGB with equal
channels. Progressive and hierarchical frames are recognized and rejected.

# Example
```rust,no_run
let data = std::fs::read("image.jpg").unwrap();
let image = sable_jpeg::decode(&data).unwrap();

println!("{}x{} image", image.width, image.height);
```

# Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]

mod error;

mod bitstream;
mod color;
mod huffman;
mod idct;
mod marker;
mod scan;

pub use error::{
    DecodeError, ErrorKind, FormatError, MarkerError, Result, ScanError, TableError,
};

use crate::color::Plane;
use crate::error::bail;

/// A decoded JPEG image.
#[derive(Debug, Clone)]
pub struct Image {
    /// The width of the image in pixels.
    pub width: u32,
    /// The height of the image in pixels.
    pub height: u32,
    /// Interleaved 8-bit RGB pixel data of length `width * height * 3`.
    pub data: Vec<u8>,
}

/// Decode a baseline JPEG image from the given data.
pub fn decode(data: &[u8]) -> Result<Image> {
    let parsed = marker::parse(data)?;
    let frame = &parsed.frame;

    let mut planes = Vec::with_capacity(frame.components.len());

    for (idx, component) in frame.components.iter().enumerate() {
        let Some(quant) = &parsed.tables.quant[component.quant_idx as usize] else {
            bail!(TableError::MissingQuantTable, 0);
        };

        let blocks_per_row = frame.blocks_per_row(idx);
        let block_rows = frame.block_rows(idx);
        let plane_width = blocks_per_row * 8;

        let mut plane = Plane {
            width: plane_width,
            data: vec![0; plane_width * block_rows * 8],
        };

        for (block_idx, block) in parsed.blocks[idx].iter().enumerate() {
            let gx = block_idx % blocks_per_row;
            let gy = block_idx / blocks_per_row;

            let pixels = idct::dequantize_and_idct(block, quant);

            for row in 0..8 {
                let dst = (gy * 8 + row) * plane_width + gx * 8;
                plane.data[dst..dst + 8].copy_from_slice(&pixels[row * 8..row * 8 + 8]);
            }
        }

        planes.push(plane);
    }

    let data = color::planes_to_rgb(frame, &planes);

    Ok(Image {
        width: frame.width as u32,
        height: frame.height as u32,
        data,
    })
}
