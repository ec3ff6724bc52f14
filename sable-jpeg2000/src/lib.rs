/*!
A memory-safe, pure-Rust JPEG 2000 decoder.

`sable-jpeg2000` decodes both raw JPEG 2000 codestreams (`.j2c`) and images
wrapped inside the JP2 container format, covering the core coding system of
ISO/IEC 15444-1: tag-tree based packet parsing, MQ-coded EBCOT code-blocks,
scalar dequantization, the reversible 5/3 and irreversible 9/7 inverse
wavelet transforms and the reversible/irreversible component transforms.

The decoder yields 8-bit greyscale or RGB samples; sYCC-tagged images are
converted to RGB.

# Example
```rust,no_run
use sable_jpeg2000::Image;

let data = std::fs::read("image.jp2").unwrap();
let image = Image::new(&data).unwrap();

println!("{}x{} image", image.width(), image.height());

let pixels = image.decode().unwrap();
```

# Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]

mod error;

mod boxes;
mod codestream;
mod decode;
mod dwt;
mod mct;
mod packet;
mod progression;
mod t1;
mod tag_tree;
mod tile;

pub use error::{
    DecodeError, DecodingError, ErrorKind, FormatError, MarkerError, Result, ValidationError,
};

use crate::boxes::ColorSpecification;
use crate::codestream::{Header, TileData};

/// The colour interpretation of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    /// A single-channel greyscale image.
    Gray,
    /// A three-channel RGB image.
    Rgb,
    /// An image with a channel count this decoder does not interpret.
    Unknown {
        /// The number of channels.
        num_channels: u8,
    },
}

impl ColorSpace {
    /// The number of channels in the decoded output.
    pub fn num_channels(&self) -> u8 {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
            Self::Unknown { num_channels } => *num_channels,
        }
    }
}

/// A parsed JPEG 2000 image, ready to decode.
pub struct Image {
    header: Header,
    tiles: Vec<TileData>,
    color_space: ColorSpace,
    sycc: bool,
}

impl Image {
    /// Parse a JP2 file or raw codestream.
    pub fn new(data: &[u8]) -> Result<Self> {
        const CODESTREAM_MAGIC: &[u8] = b"\xFF\x4F\xFF\x51";

        let (codestream, color) = if boxes::is_jp2(data) {
            let file = boxes::parse(data)?;
            (file.codestream, file.color)
        } else if data.starts_with(CODESTREAM_MAGIC) {
            (data, ColorSpecification::Unknown)
        } else {
            return Err(DecodeError::new(FormatError::BadMagic, 0));
        };

        let (header, tiles) = codestream::parse(codestream)?;

        let num_components = header.size.components.len();
        let sycc = color == ColorSpecification::Sycc && num_components >= 3;

        let color_space = match (color, num_components) {
            (ColorSpecification::Greyscale, _) | (ColorSpecification::Unknown, 1) => {
                ColorSpace::Gray
            }
            (ColorSpecification::Srgb | ColorSpecification::Sycc, _)
            | (ColorSpecification::Unknown, 3) => ColorSpace::Rgb,
            (_, n) => ColorSpace::Unknown {
                num_channels: n.min(255) as u8,
            },
        };

        Ok(Self {
            header,
            tiles,
            color_space,
            sycc,
        })
    }

    /// The width of the image in pixels.
    pub fn width(&self) -> u32 {
        self.header.size.image_width()
    }

    /// The height of the image in pixels.
    pub fn height(&self) -> u32 {
        self.header.size.image_height()
    }

    /// The colour space of the decoded output.
    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    /// Decode the image into interleaved 8-bit samples of length
    /// `width * height * num_channels`.
    pub fn decode(&self) -> Result<Vec<u8>> {
        let size = &self.header.size;
        let num_components = size.components.len();

        // Per-component full-image planes.
        let mut component_planes: Vec<Vec<f32>> = (0..num_components)
            .map(|c| {
                let (w, h) = size.component_size(c);
                vec![0.0; w as usize * h as usize]
            })
            .collect();

        for (tile_idx, tile) in self.tiles.iter().enumerate() {
            let mut planes = decode::decode_tile(&self.header, tile_idx as u32, &tile.data, 0)?;

            // The component transform applies to components 0..3 when they
            // share a wavelet kernel.
            if self.header.global.mct && num_components >= 3 {
                mct::inverse_mct(&mut planes, self.header.coding[0].kernel);
            }

            mct::level_shift(&mut planes, &self.header);

            if self.sycc && !self.header.global.mct {
                mct::sycc_to_rgb(&mut planes, &self.header);
            }

            // Copy the tile-component planes into the image planes.
            for (comp_idx, plane) in planes.iter().enumerate() {
                let component = &size.components[comp_idx];
                let (comp_w, comp_h) = size.component_size(comp_idx);

                // The component plane's origin on the component grid.
                let origin_x = size.grid_x_offset.div_ceil(component.dx as u32);
                let origin_y = size.grid_y_offset.div_ceil(component.dy as u32);

                let rect = plane.rect;
                let width = rect.width() as usize;

                if width == 0 {
                    continue;
                }

                for (row, samples) in plane.samples.chunks_exact(width).enumerate() {
                    let y = rect.y0 + row as u32;

                    if y < origin_y || y - origin_y >= comp_h || rect.x0 < origin_x {
                        continue;
                    }

                    let dst_y = (y - origin_y) as usize;
                    let dst_x = (rect.x0 - origin_x) as usize;
                    let dst = dst_y * comp_w as usize + dst_x;
                    let copy_len = width.min(comp_w as usize - dst_x);

                    component_planes[comp_idx][dst..dst + copy_len]
                        .copy_from_slice(&samples[..copy_len]);
                }
            }
        }

        Ok(self.interleave(&component_planes))
    }

    /// Interleave the component planes into 8-bit output, replicating
    /// sub-sampled components and rescaling non-8-bit depths.
    fn interleave(&self, component_planes: &[Vec<f32>]) -> Vec<u8> {
        let size = &self.header.size;
        let width = self.width() as usize;
        let height = self.height() as usize;
        let num_components = component_planes.len();

        let mut out = vec![0_u8; width * height * num_components];

        for (comp_idx, plane) in component_planes.iter().enumerate() {
            let component = &size.components[comp_idx];
            let (comp_w, comp_h) = size.component_size(comp_idx);
            let (comp_w, comp_h) = (comp_w as usize, comp_h as usize);

            let max = ((1_u64 << component.precision) - 1) as f32;
            let rescale = component.precision != 8;

            for y in 0..height {
                let sy = (y * comp_h / height).min(comp_h.saturating_sub(1));

                for x in 0..width {
                    let sx = (x * comp_w / width).min(comp_w.saturating_sub(1));
                    let mut value = plane[sy * comp_w + sx];

                    if rescale {
                        value = value / max * 255.0;
                    }

                    out[(y * width + x) * num_components + comp_idx] =
                        value.round().clamp(0.0, 255.0) as u8;
                }
            }
        }

        out
    }
}
