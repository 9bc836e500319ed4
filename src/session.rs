use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::scheduler::{Generator, Inputs};
use crate::*;

/// Texture synthesis session.
///
/// Calling `run()` will synthesize the selected part of the target and return
/// it, consuming the session in the process. You can provide a
/// `GeneratorProgress` implementation to periodically get updates with the
/// current image and the number of pixels that have been resolved both in the
/// current pass and globally.
///
/// # Example
/// ```no_run
/// # use resynthesizer::{Mask, PixelMap};
/// # let (target, corpus) = (PixelMap::new(8, 8, 3), PixelMap::new(8, 8, 3));
/// let mask = Mask::all(8, 8);
/// let session = resynthesizer::Session::builder()
///     .target(&target)
///     .target_mask(&mask)
///     .corpus(&corpus)
///     .seed(10)
///     .build()
///     .expect("failed to build session");
///
/// let synthesized = session.run(None).expect("failed to synthesize");
/// ```
pub struct Session<'a> {
    target: &'a PixelMap,
    target_mask: Cow<'a, Mask>,
    corpus: &'a PixelMap,
    corpus_mask: Cow<'a, Mask>,
    guidance: Option<GuidanceMaps<'a>>,
    cancel_token: Option<CancelToken>,
    params: Parameters,
}

impl<'a> Session<'a> {
    /// Creates a new session with default parameters.
    pub fn builder() -> SessionBuilder<'a> {
        SessionBuilder::default()
    }

    /// Runs the generator and outputs the synthesized image.
    ///
    /// Fails with `Error::EmptyCorpus` or `Error::EmptyTarget` if either mask
    /// selects nothing, and with `Error::Cancelled` if the cancel token was
    /// set before the first pass completed.
    pub fn run(
        self,
        progress: Option<Box<dyn GeneratorProgress + 'a>>,
    ) -> Result<Synthesized, Error> {
        let generator = Generator::new(
            Inputs {
                target: self.target,
                target_mask: &self.target_mask,
                corpus: self.corpus,
                corpus_mask: &self.corpus_mask,
                guidance: self.guidance,
            },
            &self.params,
        )?;

        log::info!(
            "synthesizing a {}x{} target from a {}x{} corpus (seed {}, {} neighbours, {} trials)",
            self.target.width(),
            self.target.height(),
            self.corpus.width(),
            self.corpus.height(),
            self.params.seed,
            self.params.neighbours,
            self.params.trials,
        );

        generator.resolve(&self.params, progress, self.cancel_token.as_ref())
    }
}

/// Builds a session by setting parameters and adding input images, calling
/// `build` will check all of the provided inputs to verify that synthesis
/// can run on them
#[derive(Default)]
pub struct SessionBuilder<'a> {
    target: Option<&'a PixelMap>,
    target_mask: Option<&'a Mask>,
    corpus: Option<&'a PixelMap>,
    corpus_mask: Option<&'a Mask>,
    guidance: Option<GuidanceMaps<'a>>,
    cancel_token: Option<CancelToken>,
    params: Parameters,
}

impl<'a> SessionBuilder<'a> {
    /// Creates a new `SessionBuilder`, can also be created via
    /// `Session::builder()`
    pub fn new() -> Self {
        Self::default()
    }

    /// The image being synthesized. Its unselected pixels are left untouched.
    pub fn target(mut self, target: &'a PixelMap) -> Self {
        self.target = Some(target);
        self
    }

    /// Selects which target pixels are synthesized.
    ///
    /// Default: every target pixel.
    pub fn target_mask(mut self, mask: &'a Mask) -> Self {
        self.target_mask = Some(mask);
        self
    }

    /// The image texture is copied from.
    pub fn corpus(mut self, corpus: &'a PixelMap) -> Self {
        self.corpus = Some(corpus);
        self
    }

    /// Selects which corpus pixels may be copied.
    ///
    /// Default: every corpus pixel.
    pub fn corpus_mask(mut self, mask: &'a Mask) -> Self {
        self.corpus_mask = Some(mask);
        self
    }

    /// Steers synthesis with a pair of guidance maps, see `GuidanceMaps`.
    pub fn guidance(mut self, maps: GuidanceMaps<'a>) -> Self {
        self.guidance = Some(maps);
        self
    }

    /// Replaces every parameter at once.
    pub fn parameters(mut self, params: Parameters) -> Self {
        self.params = params;
        self
    }

    /// How many neighboring pixels each pixel is compared with.
    ///
    /// A larger number means larger structures are captured. Values above
    /// `MAX_NEIGHBORS` are clamped.
    ///
    /// Default: 30
    pub fn neighbours(mut self, count: u32) -> Self {
        self.params.neighbours = count;
        self
    }

    /// The number of random corpus locations that will be considered during
    /// a pixel resolution apart from those its neighbors propose.
    ///
    /// Default: 200
    pub fn trials(mut self, count: u32) -> Self {
        self.params.trials = count;
        self
    }

    /// Makes the output tile seamlessly, on either axis.
    ///
    /// Default: false, false
    pub fn tiling(mut self, horizontal: bool, vertical: bool) -> Self {
        self.params.horizontal_tiling = horizontal;
        self.params.vertical_tiling = vertical;
        self
    }

    /// Whether the unselected target pixels around the selection are matched
    /// against. Turning this off synthesizes the selection as if it stood
    /// alone.
    ///
    /// Default: true
    pub fn use_border(mut self, use_border: bool) -> Self {
        self.params.use_border = use_border;
        self
    }

    /// Controls the trade-off between the guidance maps and the texture.
    /// Range [0,1].
    ///
    /// Default: 0.5
    pub fn map_weight(mut self, value: f32) -> Self {
        self.params.map_weight = value;
        self
    }

    /// The distribution dispersion used for comparing colors (controls
    /// the distribution 'tail flatness'). Range (0,1].
    ///
    /// Values close to 0.0 only tolerate nearly identical colors, which
    /// produces 'harsh' borders between copied patches. Values closer to 1.0
    /// are more forgiving of small differences.
    ///
    /// Default: 0.117
    pub fn cauchy_dispersion(mut self, value: f32) -> Self {
        self.params.cauchy_dispersion = value;
        self
    }

    /// The maximum number of passes over the selection, the first of which
    /// seeds every pixel and the rest of which refine them.
    ///
    /// Default: 4
    pub fn max_passes(mut self, passes: u32) -> Self {
        self.params.max_passes = passes;
        self
    }

    /// Stops refining once a pass improves less than this fraction of the
    /// selected pixels. Range [0,1].
    ///
    /// Default: 0.01
    pub fn min_improvement(mut self, value: f32) -> Self {
        self.params.min_improvement = value;
        self
    }

    /// Changes the seed.
    ///
    /// The same seed and inputs always produce the same output, regardless of
    /// the number of threads used.
    pub fn seed(mut self, value: u64) -> Self {
        self.params.seed = value;
        self
    }

    /// Controls the maximum number of threads that will be spawned at any one
    /// time in parallel.
    ///
    /// This number is allowed to exceed the number of logical cores on the
    /// system, but it should generally be kept at or below that number.
    ///
    /// Default: The number of logical cores on this system.
    pub fn max_thread_count(mut self, count: usize) -> Self {
        self.params.max_thread_count = Some(count);
        self
    }

    /// Lets another thread stop the run, see `CancelToken`.
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Creates a `Session`, or returns an error if invalid parameters or input
    /// images were specified.
    pub fn build(mut self) -> Result<Session<'a>, Error> {
        self.check_parameters_validity()?;

        let target = self.target.ok_or(Error::MissingInput("target"))?;
        let corpus = self.corpus.ok_or(Error::MissingInput("corpus"))?;

        let target_mask = match self.target_mask {
            Some(mask) => Cow::Borrowed(mask),
            None => Cow::Owned(Mask::all(target.width(), target.height())),
        };
        let corpus_mask = match self.corpus_mask {
            Some(mask) => Cow::Borrowed(mask),
            None => Cow::Owned(Mask::all(corpus.width(), corpus.height())),
        };

        check_size("target mask", target.dims(), target_mask.dims())?;
        check_size("corpus mask", corpus.dims(), corpus_mask.dims())?;

        if target.channels() != corpus.channels() {
            return Err(Error::ChannelMismatch(target.channels() as u32, corpus.channels() as u32));
        }

        if let Some(ref maps) = self.guidance {
            check_size("input guidance map", corpus.dims(), maps.input.dims())?;
            check_size("output guidance map", target.dims(), maps.output.dims())?;

            if maps.input.channels() != maps.output.channels() {
                return Err(Error::ChannelMismatch(
                    maps.input.channels() as u32,
                    maps.output.channels() as u32,
                ));
            }
        }

        Ok(Session {
            target,
            target_mask,
            corpus,
            corpus_mask,
            guidance: self.guidance,
            cancel_token: self.cancel_token,
            params: self.params,
        })
    }

    fn check_parameters_validity(&mut self) -> Result<(), Error> {
        if self.params.neighbours == 0 {
            return Err(Error::InvalidRange(InvalidRange {
                min: 1.0,
                max: MAX_NEIGHBORS as f32,
                value: 0.0,
                name: "neighbours",
            }));
        }

        if self.params.neighbours > MAX_NEIGHBORS {
            log::warn!(
                "neighbours {} is above the maximum of {}, clamping",
                self.params.neighbours,
                MAX_NEIGHBORS
            );
            self.params.neighbours = MAX_NEIGHBORS;
        }

        if self.params.trials == 0 {
            return Err(Error::InvalidRange(InvalidRange {
                min: 1.0,
                max: u32::MAX as f32,
                value: 0.0,
                name: "trials",
            }));
        }

        // NaN fails every comparison, so ranges are checked for membership
        if !(self.params.cauchy_dispersion > 0.0 && self.params.cauchy_dispersion <= 1.0) {
            return Err(Error::InvalidRange(InvalidRange {
                min: 0.0,
                max: 1.0,
                value: self.params.cauchy_dispersion,
                name: "cauchy-dispersion",
            }));
        }

        if !(self.params.map_weight >= 0.0 && self.params.map_weight <= 1.0) {
            return Err(Error::InvalidRange(InvalidRange {
                min: 0.0,
                max: 1.0,
                value: self.params.map_weight,
                name: "map-weight",
            }));
        }

        if self.params.max_passes == 0 {
            return Err(Error::InvalidRange(InvalidRange {
                min: 1.0,
                max: u32::MAX as f32,
                value: 0.0,
                name: "max-passes",
            }));
        }

        if !(self.params.min_improvement >= 0.0 && self.params.min_improvement <= 1.0) {
            return Err(Error::InvalidRange(InvalidRange {
                min: 0.0,
                max: 1.0,
                value: self.params.min_improvement,
                name: "min-improvement",
            }));
        }

        if let Some(max_count) = self.params.max_thread_count {
            if max_count == 0 {
                return Err(Error::InvalidRange(InvalidRange {
                    min: 1.0,
                    max: 1024.0,
                    value: max_count as f32,
                    name: "max-thread-count",
                }));
            }
        }

        Ok(())
    }
}

fn check_size(name: &'static str, expected: Dims, actual: Dims) -> Result<(), Error> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::SizeMismatch(SizeMismatch {
            name,
            expected: (expected.width, expected.height),
            actual: (actual.width, actual.height),
        }))
    }
}

/// A handle that stops a running session from another thread.
///
/// The generator checks the token between passes. If it is set before the
/// seeding pass completes, `run` fails with `Error::Cancelled`, otherwise it
/// returns the best result so far with `Synthesized::was_cancelled` set.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Helper struct for passing progress information to external callers
pub struct ProgressStat {
    /// The current amount of work that has been done
    pub current: usize,
    /// The total amount of work to do
    pub total: usize,
}

/// The current state of the image generator
pub struct ProgressUpdate<'a> {
    /// The currenty resolved image
    pub image: &'a PixelMap,
    /// The pass being run, starting at 1 for the seeding pass
    pub pass: u32,
    /// The total progress, assuming every pass runs
    pub total: ProgressStat,
    /// The progress for the current pass
    pub stage: ProgressStat,
}

/// Allows the generator to update external callers with the current
/// progress of the synthesis
pub trait GeneratorProgress {
    fn update(&mut self, info: ProgressUpdate<'_>);
}

impl<G> GeneratorProgress for G
where
    G: FnMut(ProgressUpdate<'_>) + Send,
{
    fn update(&mut self, info: ProgressUpdate<'_>) {
        self(info)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn flat(width: u32, height: u32, channels: usize) -> PixelMap {
        PixelMap::new(width, height, channels)
    }

    #[test]
    fn missing_inputs() {
        let corpus = flat(4, 4, 3);
        assert!(matches!(
            Session::builder().corpus(&corpus).build(),
            Err(Error::MissingInput("target"))
        ));
        assert!(matches!(
            Session::builder().target(&corpus).build(),
            Err(Error::MissingInput("corpus"))
        ));
    }

    #[test]
    fn invalid_ranges() {
        let img = flat(4, 4, 1);
        let builder = || Session::builder().target(&img).corpus(&img);

        let name = |res: Result<Session<'_>, Error>| match res {
            Err(Error::InvalidRange(ir)) => ir.name,
            _ => panic!("expected an invalid range"),
        };

        assert_eq!(name(builder().neighbours(0).build()), "neighbours");
        assert_eq!(name(builder().trials(0).build()), "trials");
        assert_eq!(name(builder().cauchy_dispersion(0.0).build()), "cauchy-dispersion");
        assert_eq!(name(builder().cauchy_dispersion(1.5).build()), "cauchy-dispersion");
        assert_eq!(name(builder().map_weight(-0.1).build()), "map-weight");
        assert_eq!(name(builder().map_weight(f32::NAN).build()), "map-weight");
        assert_eq!(name(builder().max_passes(0).build()), "max-passes");
        assert_eq!(name(builder().min_improvement(2.0).build()), "min-improvement");
        assert_eq!(name(builder().max_thread_count(0).build()), "max-thread-count");

        assert!(builder().cauchy_dispersion(1.0).map_weight(0.0).build().is_ok());
    }

    #[test]
    fn clamps_neighbours() {
        let img = flat(4, 4, 1);
        let session = Session::builder()
            .target(&img)
            .corpus(&img)
            .neighbours(MAX_NEIGHBORS + 50)
            .build()
            .unwrap();

        assert_eq!(session.params.neighbours, MAX_NEIGHBORS);
    }

    #[test]
    fn mismatched_inputs() {
        let target = flat(4, 4, 3);
        let corpus = flat(6, 6, 3);
        let gray = flat(6, 6, 1);
        let small_mask = Mask::all(3, 4);

        match Session::builder()
            .target(&target)
            .target_mask(&small_mask)
            .corpus(&corpus)
            .build()
        {
            Err(Error::SizeMismatch(sm)) => {
                assert_eq!(sm.name, "target mask");
                assert_eq!(sm.expected, (4, 4));
                assert_eq!(sm.actual, (3, 4));
            }
            _ => panic!("expected a size mismatch"),
        }

        assert!(matches!(
            Session::builder().target(&target).corpus(&gray).build(),
            Err(Error::ChannelMismatch(3, 1))
        ));

        let input = flat(6, 6, 2);
        let output = flat(4, 4, 1);
        assert!(matches!(
            Session::builder()
                .target(&target)
                .corpus(&corpus)
                .guidance(GuidanceMaps::new(&input, &output))
                .build(),
            Err(Error::ChannelMismatch(2, 1))
        ));

        // The maps are swapped, so neither matches its image
        assert!(matches!(
            Session::builder()
                .target(&target)
                .corpus(&corpus)
                .guidance(GuidanceMaps::new(&output, &input))
                .build(),
            Err(Error::SizeMismatch(_))
        ));
    }

    #[test]
    fn default_masks_select_everything() {
        let target = flat(3, 2, 1);
        let corpus = flat(5, 5, 1);
        let session = Session::builder()
            .target(&target)
            .corpus(&corpus)
            .build()
            .unwrap();

        assert_eq!(session.target_mask.count_in(), 6);
        assert_eq!(session.corpus_mask.count_in(), 25);
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn progress_closure() {
        let img = PixelMap::from_fn(8, 8, 1, |x, y, px| px[0] = ((x ^ y) * 30) as u8);
        let mut updates = Vec::new();

        {
            let progress = |p: ProgressUpdate<'_>| {
                assert_eq!(p.image.dims(), Dims::new(8, 8));
                updates.push((p.pass, p.stage.current, p.stage.total));
            };

            Session::builder()
                .target(&img)
                .target_mask(&Mask::from_fn(8, 8, |x, _| if x < 4 { 255 } else { 0 }))
                .corpus(&img)
                .neighbours(4)
                .trials(8)
                .max_passes(2)
                .min_improvement(0.0)
                .max_thread_count(1)
                .build()
                .unwrap()
                .run(Some(Box::new(progress)))
                .unwrap();
        }

        assert!(!updates.is_empty());
        assert_eq!(updates[0].0, 1);
        assert!(updates.iter().all(|u| u.2 == 32 && u.1 <= u.2));

        // Every pass ends with its stage complete
        let last = updates.last().unwrap();
        assert_eq!(last.1, last.2);
    }
}
