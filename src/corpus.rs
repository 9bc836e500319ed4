//! The set of corpus pixels that may be copied into the target.

use rand::Rng;

use crate::pixel_map::{Coord, Mask, PixelMap, SignedCoord};
use crate::{Dims, Error};

/// Index over every corpus position with a positive mask weight.
///
/// Built once per run and shared read-only between all workers and passes.
pub(crate) struct CorpusIndex {
    dims: Dims,
    /// Eligible positions in row-major order
    points: Vec<Coord>,
    /// Row-major eligibility lookup, one entry per corpus pixel
    eligible: Vec<bool>,
}

impl CorpusIndex {
    pub(crate) fn new(corpus: &PixelMap, mask: &Mask) -> Result<Self, Error> {
        assert_eq!(
            corpus.dims(),
            mask.dims(),
            "corpus mask must match the corpus dimensions"
        );

        let dims = corpus.dims();
        let mut points = Vec::new();
        let mut eligible = Vec::with_capacity(dims.width as usize * dims.height as usize);

        for y in 0..dims.height {
            for x in 0..dims.width {
                let is_in = mask.is_in(x, y);
                if is_in {
                    points.push(Coord::new(x, y));
                }
                eligible.push(is_in);
            }
        }

        if points.is_empty() {
            return Err(Error::EmptyCorpus);
        }

        Ok(Self {
            dims,
            points,
            eligible,
        })
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether a (possibly out of bounds) position may be used as a source.
    #[inline]
    pub(crate) fn is_eligible(&self, coord: SignedCoord) -> bool {
        coord.x >= 0
            && coord.y >= 0
            && coord.x < self.dims.width as i32
            && coord.y < self.dims.height as i32
            && self.eligible[coord.y as usize * self.dims.width as usize + coord.x as usize]
    }

    /// Draws a uniformly distributed eligible position.
    #[inline]
    pub(crate) fn random_probe<R: Rng>(&self, rng: &mut R) -> Coord {
        self.points[rng.gen_range(0..self.points.len())]
    }
}
