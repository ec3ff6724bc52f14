/*!
A memory-safe, pure-Rust JBIG2 decoder.

`sable-jbig2` decodes bi-level images coded per ITU-T T.88 (ISO/IEC 14492):
generic regions (arithmetic and MMR coded), symbol dictionaries and text
regions, pattern dictionaries and halftone regions, and generic refinement
regions, composed onto a page bitmap.

Both standalone file organizations are supported, as well as the embedded
organization used by PDF streams (optionally with a separate globals
stream). Files with several pages decode their first page.

# Example
```rust,no_run
let data = std::fs::read("image.jb2").unwrap();
let image = sable_jbig2::decode(&data).unwrap();

println!("{}x{} image", image.width, image.height);
```

# Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]

mod error;

mod bitmap;
mod dict;
mod file;
mod grayscale;
mod huffman;
mod int;
mod mmr;
mod page;
mod reader;
mod region;
mod segment;

pub use error::{
    DecodeError, ErrorKind, FormatError, HuffmanError, RegionError, Result, SegmentError,
    SymbolError,
};

use crate::bitmap::{Bitmap, CombinationOperator};
use crate::dict::pattern::PatternDictionary;
use crate::dict::symbol::SymbolDictionary;
use crate::huffman::HuffmanTable;
use crate::reader::Reader;
use crate::region::RegionInfo;
use crate::region::generic::Region;
use crate::segment::{Segment, SegmentType};

/// A decoded JBIG2 page.
#[derive(Debug, Clone)]
pub struct Image {
    /// The width of the page in pixels.
    pub width: u32,
    /// The height of the page in pixels.
    pub height: u32,
    /// One value per pixel, row-major; `true` is black.
    pub data: Vec<bool>,
}

/// Resource bounds applied while decoding.
///
/// Malicious streams can declare enormous dictionaries and pages in a few
/// bytes; decoding fails with [`ErrorKind::ResourceExceeded`] when any bound
/// is hit.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum total symbols in one dictionary (imported + new).
    pub max_symbols: usize,
    /// Maximum page width or height in pixels.
    pub max_page_dimension: u32,
    /// Maximum pixel count of any single bitmap.
    pub max_bitmap_bytes: usize,
    /// Maximum number of segments processed.
    pub max_segments: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_symbols: 1 << 16,
            max_page_dimension: 1 << 16,
            max_bitmap_bytes: 1 << 30,
            max_segments: 1 << 14,
        }
    }
}

/// Decode a standalone JBIG2 file with default limits.
pub fn decode(data: &[u8]) -> Result<Image> {
    decode_with_limits(data, &Limits::default())
}

/// Decode a standalone JBIG2 file.
pub fn decode_with_limits(data: &[u8], limits: &Limits) -> Result<Image> {
    let file = file::parse_file(data)?;
    decode_segments(&file.segments, limits)
}

/// Decode an embedded JBIG2 stream (no file header), optionally preceded by
/// a globals stream, as found in PDF documents.
pub fn decode_embedded(
    globals: Option<&[u8]>,
    data: &[u8],
    limits: &Limits,
) -> Result<Image> {
    let file = file::parse_embedded(globals, data)?;
    decode_segments(&file.segments, limits)
}

/// The per-page decoding state: the page bitmap plus every decoded artifact
/// that later segments may refer to.
struct PageContext {
    info: page::PageInfo,
    bitmap: Bitmap,
}

#[derive(Default)]
struct Store {
    regions: Vec<(u32, Region)>,
    symbol_dicts: Vec<(u32, SymbolDictionary)>,
    pattern_dicts: Vec<(u32, PatternDictionary)>,
    tables: Vec<(u32, HuffmanTable)>,
}

impl Store {
    fn region(&self, number: u32) -> Option<&Region> {
        self.regions
            .iter()
            .find(|(n, _)| *n == number)
            .map(|(_, r)| r)
    }

    fn pattern_dict(&self, number: u32) -> Option<&PatternDictionary> {
        self.pattern_dicts
            .iter()
            .find(|(n, _)| *n == number)
            .map(|(_, d)| d)
    }

    /// All symbols exported by the referred dictionaries, in reference
    /// order (6.5.5 step 1).
    fn referred_symbols(&self, referred: &[u32]) -> Vec<&Bitmap> {
        referred
            .iter()
            .filter_map(|&n| {
                self.symbol_dicts
                    .iter()
                    .find(|(num, _)| *num == n)
                    .map(|(_, d)| d)
            })
            .flat_map(|dict| dict.symbols.iter())
            .collect()
    }

    fn referred_tables(&self, referred: &[u32]) -> Vec<&HuffmanTable> {
        referred
            .iter()
            .filter_map(|&n| {
                self.tables
                    .iter()
                    .find(|(num, _)| *num == n)
                    .map(|(_, t)| t)
            })
            .collect()
    }
}

fn decode_segments(segments: &[Segment<'_>], limits: &Limits) -> Result<Image> {
    if segments.len() > limits.max_segments {
        return Err(DecodeError::new(
            ErrorKind::ResourceExceeded("segment count"),
            0,
        ));
    }

    // Striped pages with unknown height take it from the end-of-stripe
    // segments (7.4.8.2).
    let stripe_height = scan_stripe_height(segments);

    let mut page: Option<PageContext> = None;
    let mut store = Store::default();

    for seg in segments {
        let mut reader = Reader::new(seg.data);
        let base = seg.data_offset;

        match seg.header.segment_type {
            SegmentType::PageInformation => {
                // Only the first page is rendered.
                if page.is_some() {
                    break;
                }

                let info = page::parse(&mut reader).map_err(|e| e.rebase(base))?;

                let height = if info.height == 0xFFFF_FFFF {
                    stripe_height.ok_or(DecodeError::new(
                        FormatError::UnknownPageHeight,
                        base,
                    ))?
                } else {
                    info.height
                };

                if info.width > limits.max_page_dimension
                    || height > limits.max_page_dimension
                {
                    return Err(DecodeError::new(
                        ErrorKind::ResourceExceeded("page dimensions"),
                        base,
                    ));
                }

                let bitmap = Bitmap::filled(info.width, height, info.default_pixel);
                page = Some(PageContext { info, bitmap });
            }
            SegmentType::EndOfPage | SegmentType::EndOfFile => break,
            SegmentType::EndOfStripe => {}
            SegmentType::ImmediateGenericRegion
            | SegmentType::ImmediateLosslessGenericRegion
            | SegmentType::IntermediateGenericRegion => {
                let unknown_length = seg.header.data_length.is_none();
                let region = region::generic::decode(&mut reader, unknown_length)
                    .map_err(|e| e.rebase(base))?;

                place_or_store(&mut page, &mut store, seg, region, limits, base)?;
            }
            SegmentType::ImmediateTextRegion
            | SegmentType::ImmediateLosslessTextRegion
            | SegmentType::IntermediateTextRegion => {
                let symbols = store.referred_symbols(&seg.header.referred);
                let tables = store.referred_tables(&seg.header.referred);

                let region = region::text::decode(&mut reader, &symbols, &tables)
                    .map_err(|e| e.rebase(base))?;

                place_or_store(&mut page, &mut store, seg, region, limits, base)?;
            }
            SegmentType::ImmediateHalftoneRegion
            | SegmentType::ImmediateLosslessHalftoneRegion
            | SegmentType::IntermediateHalftoneRegion => {
                let patterns = seg
                    .header
                    .referred
                    .iter()
                    .find_map(|&n| store.pattern_dict(n))
                    .ok_or(DecodeError::new(SegmentError::MissingReferred, base))?;

                let region = region::halftone::decode(&mut reader, patterns)
                    .map_err(|e| e.rebase(base))?;

                place_or_store(&mut page, &mut store, seg, region, limits, base)?;
            }
            SegmentType::ImmediateGenericRefinementRegion
            | SegmentType::ImmediateLosslessGenericRefinementRegion
            | SegmentType::IntermediateGenericRefinementRegion => {
                // The reference is the referred intermediate region, or the
                // page bitmap itself (7.4.7.5).
                let reference = seg
                    .header
                    .referred
                    .iter()
                    .find_map(|&n| store.region(n))
                    .cloned()
                    .or_else(|| {
                        page.as_ref().map(|ctx| Region {
                            info: RegionInfo {
                                width: ctx.bitmap.width,
                                height: ctx.bitmap.height,
                                x: 0,
                                y: 0,
                                operator: CombinationOperator::Replace,
                            },
                            bitmap: ctx.bitmap.clone(),
                        })
                    })
                    .ok_or(DecodeError::new(FormatError::MissingPageInfo, base))?;

                let region = region::refinement::decode(&mut reader, &reference)
                    .map_err(|e| e.rebase(base))?;

                place_or_store(&mut page, &mut store, seg, region, limits, base)?;
            }
            SegmentType::SymbolDictionary => {
                let symbols = store.referred_symbols(&seg.header.referred);
                let tables = store.referred_tables(&seg.header.referred);

                let dict = dict::symbol::decode(&mut reader, &symbols, &tables, limits)
                    .map_err(|e| e.rebase(base))?;

                store.symbol_dicts.push((seg.header.number, dict));
            }
            SegmentType::PatternDictionary => {
                let dict = dict::pattern::decode(&mut reader, limits)
                    .map_err(|e| e.rebase(base))?;
                store.pattern_dicts.push((seg.header.number, dict));
            }
            SegmentType::Tables => {
                let table = HuffmanTable::from_custom(&mut reader)
                    .map_err(|e| e.rebase(base))?;
                store.tables.push((seg.header.number, table));
            }
            // Non-critical segments carry no image data.
            SegmentType::Profiles | SegmentType::ColourPalette | SegmentType::Extension => {}
        }
    }

    let page = page.ok_or(DecodeError::new(FormatError::MissingPageInfo, 0))?;

    Ok(Image {
        width: page.bitmap.width,
        height: page.bitmap.height,
        data: page.bitmap.data,
    })
}

/// Compose an immediate region onto the page, or store an intermediate one
/// for later reference.
fn place_or_store(
    page: &mut Option<PageContext>,
    store: &mut Store,
    seg: &Segment<'_>,
    region: Region,
    limits: &Limits,
    base: usize,
) -> Result<()> {
    if !seg.header.segment_type.is_immediate_region() {
        store.regions.push((seg.header.number, region));
        return Ok(());
    }

    let ctx = page
        .as_mut()
        .ok_or(DecodeError::new(FormatError::MissingPageInfo, base))?;

    // A striped page may grow as stripes arrive.
    let bottom = region.info.y.saturating_add(region.info.height);

    if ctx.info.striped && bottom > ctx.bitmap.height {
        if bottom > limits.max_page_dimension {
            return Err(DecodeError::new(
                ErrorKind::ResourceExceeded("page dimensions"),
                base,
            ));
        }

        ctx.bitmap.grow_height(bottom, ctx.info.default_pixel);
    }

    ctx.bitmap.combine(
        &region.bitmap,
        region.info.x as i32,
        region.info.y as i32,
        region.info.operator,
    );

    Ok(())
}

/// Find the page height implied by end-of-stripe segments: the largest end
/// row plus one (7.4.10).
fn scan_stripe_height(segments: &[Segment<'_>]) -> Option<u32> {
    let mut max: Option<u32> = None;

    for seg in segments {
        if seg.header.segment_type == SegmentType::EndOfStripe {
            let height = u32::from_be_bytes(seg.data.get(..4)?.try_into().ok()?)
                .checked_add(1)?;
            max = Some(max.map_or(height, |m| m.max(height)));
        }
    }

    max
}
