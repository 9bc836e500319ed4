//! Scoring corpus positions against the neighborhood of a target pixel.

use rand::SeedableRng;
use rand_pcg::Pcg32;

use crate::corpus::CorpusIndex;
use crate::pixel_map::{Coord, Edges, PixelMap, SignedCoord};
use crate::template::NeighborTemplate;
use crate::GuidanceMaps;

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub(crate) struct Score(pub(crate) f32);

impl Score {
    /// The score of a source that was picked without anything to compare
    pub(crate) const UNKNOWN: Self = Self(f32::INFINITY);
}

/// What a candidate has to beat to replace a pixel's source.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Baseline {
    /// A fixed score, eg. `Score::UNKNOWN` for a pixel without a source
    Score(Score),
    /// The pixel's current source, scored again under the current template
    Source(Coord),
}

/// The winning candidate for a target pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Match {
    pub(crate) source: Coord,
    pub(crate) score: Score,
}

#[inline]
fn metric_cauchy(a: u8, b: u8, sig2: f32) -> f32 {
    let mut x2 = (f32::from(a) - f32::from(b)) / 255.0; //normalize the colors to be between 0-1
    x2 = x2 * x2;
    (1.0 + x2 / sig2).ln()
}

#[inline]
fn metric_l2(a: u8, b: u8) -> f32 {
    let x = (f32::from(a) - f32::from(b)) / 255.0;
    x * x
}

pub(crate) struct PrerenderedU8Function {
    data: Vec<f32>,
}

impl PrerenderedU8Function {
    pub fn new<F: Fn(u8, u8) -> f32>(function: F) -> Self {
        let mut data = vec![0f32; 65536];

        for a in 0..=255u8 {
            for b in 0..=255u8 {
                data[a as usize * 256usize + b as usize] = function(a, b);
            }
        }

        Self { data }
    }

    #[inline]
    pub fn get(&self, a: u8, b: u8) -> f32 {
        self.data[a as usize * 256usize + b as usize]
    }
}

/// Precomputed per-channel distances used by every match in a run.
pub(crate) struct Costs {
    color: PrerenderedU8Function,
    map: PrerenderedU8Function,
    map_weight: f32,
    /// What a single corpus neighbor that can't be compared costs
    missing_neighbor: f32,
}

impl Costs {
    pub(crate) fn new(cauchy_dispersion: f32, map_weight: f32, channels: usize) -> Self {
        let sig2 = cauchy_dispersion * cauchy_dispersion;
        let color = PrerenderedU8Function::new(|a, b| metric_cauchy(a, b, sig2));
        let missing_neighbor = color.get(0, 255) * channels as f32;

        Self {
            color,
            map: PrerenderedU8Function::new(metric_l2),
            map_weight,
            missing_neighbor,
        }
    }

    #[inline]
    fn color_distance(&self, a: &[u8], b: &[u8]) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(&a, &b)| self.color.get(a, b))
            .sum()
    }

    #[inline]
    fn map_distance(&self, a: &[u8], b: &[u8]) -> f32 {
        self.map_weight
            * a.iter()
                .zip(b.iter())
                .map(|(&a, &b)| self.map.get(a, b))
                .sum::<f32>()
    }
}

/// Scratch buffers reused between pixels by a single worker.
#[derive(Default)]
pub(crate) struct Scratch {
    pub(crate) template: NeighborTemplate,
    /// Colors of the target neighbors, in template order
    pattern: Vec<u8>,
    candidates: Vec<SignedCoord>,
}

/// Everything needed to find the best source of a target pixel, frozen for the
/// duration of a batch.
pub(crate) struct Matcher<'a> {
    pub(crate) target: &'a PixelMap,
    pub(crate) sources: &'a [Option<Coord>],
    pub(crate) corpus: &'a PixelMap,
    pub(crate) index: &'a CorpusIndex,
    pub(crate) guidance: Option<GuidanceMaps<'a>>,
    pub(crate) costs: &'a Costs,
    pub(crate) edges: Edges,
    pub(crate) trials: u32,
}

impl<'a> Matcher<'a> {
    /// Finds the candidate with the lowest score for `target_pos`, considering
    /// only candidates strictly better than `baseline`.
    ///
    /// Candidates are probed in a fixed order, first the propagation
    /// candidates of every template neighbor, then `trials` random corpus
    /// positions drawn from `seed`. Ties go to the first candidate probed.
    pub(crate) fn best_match(
        &self,
        target_pos: Coord,
        scratch: &mut Scratch,
        baseline: Baseline,
        seed: u64,
    ) -> Option<Match> {
        let Scratch {
            template,
            pattern,
            candidates,
        } = scratch;

        let dims = self.target.dims();
        let center = target_pos.to_signed();
        let channels = self.target.channels();

        pattern.clear();
        candidates.clear();

        for o in template.offsets() {
            let n = center.offset(o.x, o.y);
            let (nx, ny) = self.edges.resolve(n.x, n.y, dims);
            pattern.extend_from_slice(self.target.get(nx, ny));

            // Propagation, the neighbor's source shifted back by the same offset
            if let Some(source) = self.sources[Coord::new(nx, ny).to_flat(dims)] {
                let candidate = source.to_signed().offset(-o.x, -o.y);
                if self.index.is_eligible(candidate) {
                    candidates.push(candidate);
                }
            }
        }

        let mut rng = Pcg32::seed_from_u64(seed);
        for _ in 0..self.trials {
            candidates.push(self.index.random_probe(&mut rng).to_signed());
        }

        let inv_total_weight = if template.is_empty() {
            0.0
        } else {
            1.0 / template.total_weight()
        };

        // The template may have grown since the current source was picked, so
        // its old score says little about how well it fits now
        let mut lowest = match baseline {
            Baseline::Score(score) => score.0,
            Baseline::Source(source) => self
                .score(
                    target_pos,
                    source.to_signed(),
                    &*template,
                    &pattern[..],
                    channels,
                    inv_total_weight,
                    f32::INFINITY,
                )
                .unwrap_or(f32::INFINITY),
        };
        let mut best: Option<Match> = None;

        for candidate in candidates.iter() {
            if let Some(score) = self.score(
                target_pos,
                *candidate,
                &*template,
                &pattern[..],
                channels,
                inv_total_weight,
                lowest,
            ) {
                lowest = score;
                best = Some(Match {
                    source: Coord::new(candidate.x as u32, candidate.y as u32),
                    score: Score(score),
                });
            }
        }

        best
    }

    /// Scores a single candidate, bailing out as soon as it can no longer beat
    /// `current_best`.
    #[allow(clippy::too_many_arguments)]
    fn score(
        &self,
        target_pos: Coord,
        candidate: SignedCoord,
        template: &NeighborTemplate,
        pattern: &[u8],
        channels: usize,
        inv_total_weight: f32,
        current_best: f32,
    ) -> Option<f32> {
        let mut score = match self.guidance {
            Some(ref maps) => self.costs.map_distance(
                maps.output.get(target_pos.x, target_pos.y),
                maps.input.get(candidate.x as u32, candidate.y as u32),
            ),
            None => 0.0,
        };

        if score >= current_best {
            return None;
        }

        let mut patch = 0.0;
        for (i, (o, w)) in template
            .offsets()
            .iter()
            .zip(template.weights())
            .enumerate()
        {
            let n = candidate.offset(o.x, o.y);
            let cost = if self.index.is_eligible(n) {
                self.costs.color_distance(
                    &pattern[i * channels..(i + 1) * channels],
                    self.corpus.get(n.x as u32, n.y as u32),
                )
            } else {
                self.costs.missing_neighbor
            };

            patch += cost * w;
            if score + patch * inv_total_weight >= current_best {
                return None;
            }
        }

        score += patch * inv_total_weight;
        Some(score)
    }
}
