// BEGIN - Embark standard lints v0.4
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_on_vec_items,
    clippy::match_same_arms,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::mismatched_target_os,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v0.4

//! `resynthesizer` fills a region of an image, the target, with texture
//! copied pixel by pixel from another region, the corpus, so that every
//! synthesized pixel's neighborhood resembles some neighborhood of the corpus.
//!
//! The engine works on plain data: `PixelMap`s of 8-bit channels, paired with
//! `Mask`s that say which pixels take part. Selected target pixels are
//! synthesized, unselected ones keep their colors and, by default, serve as
//! context for the selected ones. Only selected corpus pixels are ever copied.
//!
//! ## Features
//!
//! 1. Filling and healing selections from a texture sample
//! 2. Seamless tiling, horizontally and/or vertically
//! 3. Guided synthesis through a pair of guidance maps
//! 4. Reproducible output for a given seed, regardless of thread count
//!
//! ## Usage
//!
//! ```no_run
//! use resynthesizer::{Mask, PixelMap, Session};
//!
//! let corpus = PixelMap::from_fn(64, 64, 3, |x, y, px| {
//!     px.copy_from_slice(&[(x * 4) as u8, (y * 4) as u8, 128]);
//! });
//! let target = PixelMap::new(32, 32, 3);
//!
//! let synthesized = Session::builder()
//!     .target(&target)
//!     .corpus(&corpus)
//!     .corpus_mask(&Mask::all(64, 64))
//!     .seed(10)
//!     .tiling(true, true)
//!     .build()
//!     .expect("failed to build session")
//!     .run(None)
//!     .expect("failed to synthesize");
//!
//! let image: PixelMap = synthesized.into_pixel_map();
//! ```
mod corpus;
mod errors;
mod matching;
mod pixel_map;
mod scheduler;
pub mod session;
mod template;
pub mod utils;

pub use image;

pub use errors::{Error, InvalidRange, SizeMismatch};
pub use pixel_map::{EdgeMode, Edges, Mask, PixelMap};
pub use session::{CancelToken, GeneratorProgress, ProgressStat, ProgressUpdate};
pub use session::{Session, SessionBuilder};

/// The largest neighbor template a run may use, larger requests are clamped
pub const MAX_NEIGHBORS: u32 = 100;

/// Simple dimensions struct
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Dims {
    pub width: u32,
    pub height: u32,
}

impl Dims {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A pair of maps that steer which corpus regions are copied where.
///
/// A corpus pixel is preferred for a target pixel when the `input` map at the
/// corpus pixel resembles the `output` map at the target pixel. The maps are
/// never copied themselves, so they may have any number of channels, as long
/// as both have the same.
#[derive(Copy, Clone, Debug)]
pub struct GuidanceMaps<'a> {
    pub(crate) input: &'a PixelMap,
    pub(crate) output: &'a PixelMap,
}

impl<'a> GuidanceMaps<'a> {
    /// `input` pairs with the corpus and must have its size, `output` pairs
    /// with the target and must have its size.
    pub fn new(input: &'a PixelMap, output: &'a PixelMap) -> Self {
        Self { input, output }
    }
}

/// Parameters of a single run. They can be set directly, or through the
/// chained setters of `SessionBuilder`.
#[derive(Clone, Debug)]
pub struct Parameters {
    /// How many already valued neighbors each pixel is compared with (bigger
    /// number -> larger structures are captured, at a higher cost).
    pub neighbours: u32,
    /// How many random corpus locations are probed for each pixel, apart from
    /// the locations proposed by its neighbors.
    pub trials: u32,
    /// Makes the output seamlessly tileable from left to right
    pub horizontal_tiling: bool,
    /// Makes the output seamlessly tileable from top to bottom
    pub vertical_tiling: bool,
    /// Whether unselected target pixels are matched against as context
    pub use_border: bool,
    /// Weight of the guidance maps against the texture itself. Range [0,1].
    pub map_weight: f32,
    /// The dispersion of the distance metric. Small values only tolerate
    /// nearly identical colors, larger values are more forgiving. Range (0,1].
    pub cauchy_dispersion: f32,
    /// The maximum number of passes, the first of which is the seeding pass
    pub max_passes: u32,
    /// Stops early once a pass improves less than this fraction of the pixels
    pub min_improvement: f32,
    /// random seed
    pub seed: u64,
    pub max_thread_count: Option<usize>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            neighbours: 30,
            trials: 200,
            horizontal_tiling: false,
            vertical_tiling: false,
            use_border: true,
            map_weight: 0.5,
            cauchy_dispersion: 0.117,
            max_passes: 4,
            min_improvement: 0.01,
            seed: 0,
            max_thread_count: None,
        }
    }
}

/// The result of a `Session::run()`
#[derive(Clone, Debug)]
pub struct Synthesized {
    pub(crate) image: PixelMap,
    pub(crate) sources: Vec<Option<(u32, u32)>>,
    pub(crate) scores: Vec<Option<f32>>,
    pub(crate) passes: u32,
    pub(crate) cancelled: bool,
}

impl Synthesized {
    /// The synthesized image, same size and channel count as the target.
    pub fn image(&self) -> &PixelMap {
        &self.image
    }

    pub fn into_pixel_map(self) -> PixelMap {
        self.image
    }

    /// For every target pixel, row-major, the corpus position its color was
    /// copied from, or `None` for unselected pixels.
    pub fn sources(&self) -> &[Option<(u32, u32)>] {
        &self.sources
    }

    /// For every target pixel, row-major, the match score of its source.
    /// Lower is better, and infinity means the source was picked at random.
    pub fn scores(&self) -> &[Option<f32>] {
        &self.scores
    }

    /// The number of passes that ran, including the seeding pass.
    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Whether the run stopped early because it was cancelled.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// A single channel map indicating how "uncertain" the engine was of each
    /// pixel, from 0 for a perfect match to 255 for a poor or random one.
    pub fn uncertainty_map(&self) -> PixelMap {
        let dims = self.image.dims();
        let mut map = PixelMap::new(dims.width, dims.height, 1);

        for (i, score) in self.scores.iter().enumerate() {
            if let Some(score) = score {
                let x = (i % dims.width as usize) as u32;
                let y = (i / dims.width as usize) as u32;
                map.set(x, y, &[(score.min(1.0) * 255.0) as u8]);
            }
        }

        map
    }

    /// Copies pixels from `map` using the same source positions that produced
    /// this result, eg. to carry a normal map along with a synthesized color
    /// map. Unselected target pixels are taken from `fallback`.
    ///
    /// `map` must be corpus sized, `fallback` target sized, and both must have
    /// the same number of channels.
    pub fn transfer(&self, map: &PixelMap, fallback: &PixelMap) -> Result<PixelMap, Error> {
        let dims = self.image.dims();
        if fallback.dims() != dims {
            return Err(Error::SizeMismatch(SizeMismatch {
                name: "fallback map",
                expected: (dims.width, dims.height),
                actual: (fallback.width(), fallback.height()),
            }));
        }
        if map.channels() != fallback.channels() {
            return Err(Error::ChannelMismatch(map.channels() as u32, fallback.channels() as u32));
        }

        let mut out = fallback.clone();
        for (i, source) in self.sources.iter().enumerate() {
            if let Some((sx, sy)) = *source {
                if sx >= map.width() || sy >= map.height() {
                    return Err(Error::SizeMismatch(SizeMismatch {
                        name: "transferred map",
                        expected: (sx + 1, sy + 1),
                        actual: (map.width(), map.height()),
                    }));
                }

                let x = (i % dims.width as usize) as u32;
                let y = (i / dims.width as usize) as u32;
                out.set(x, y, map.get(sx, sy));
            }
        }

        Ok(out)
    }
}

/// Synthesizes the selected part of `target` from the selected part of
/// `corpus`, returning a new map of the target's size.
///
/// This is a shorthand for building a `Session` with the same inputs and
/// running it without progress reporting.
///
/// ```
/// use resynthesizer::{synthesize, Mask, Parameters, PixelMap};
///
/// let corpus = PixelMap::from_fn(8, 8, 1, |x, y, px| px[0] = ((x + y) % 2 * 255) as u8);
/// let target = PixelMap::new(4, 4, 1);
///
/// let params = Parameters {
///     neighbours: 4,
///     max_thread_count: Some(1),
///     ..Parameters::default()
/// };
///
/// let out = synthesize(
///     &target,
///     &Mask::all(4, 4),
///     &corpus,
///     &Mask::all(8, 8),
///     None,
///     &params,
/// )
/// .unwrap();
/// assert_eq!(out.dims(), target.dims());
/// ```
pub fn synthesize(
    target: &PixelMap,
    target_mask: &Mask,
    corpus: &PixelMap,
    corpus_mask: &Mask,
    guidance: Option<GuidanceMaps<'_>>,
    params: &Parameters,
) -> Result<PixelMap, Error> {
    let mut builder = Session::builder()
        .target(target)
        .target_mask(target_mask)
        .corpus(corpus)
        .corpus_mask(corpus_mask)
        .parameters(params.clone());

    if let Some(maps) = guidance {
        builder = builder.guidance(maps);
    }

    Ok(builder.build()?.run(None)?.into_pixel_map())
}
