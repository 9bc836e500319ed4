use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::corpus::CorpusIndex;
use crate::matching::{Baseline, Costs, Match, Matcher, Score, Scratch};
use crate::pixel_map::{Coord, Edges, Mask, PixelMap};
use crate::session::{CancelToken, GeneratorProgress, ProgressStat, ProgressUpdate};
use crate::template::NeighborSearch;
use crate::{Error, GuidanceMaps, Parameters, Synthesized};

/// Improvement passes are cut into batches of this many pixels
const IMPROVE_BATCH: usize = 256;
/// The upper bound on the size of a seeding pass batch
const MAX_SEED_BATCH: usize = 1024;
/// A seeding batch may grow the number of valued pixels by at most
/// `1 / SEED_BATCH_DIVISOR`, so that most pixels still see the pixels
/// synthesized just before them
const SEED_BATCH_DIVISOR: usize = 8;
/// Batches smaller than this are never split between threads
const MIN_PARALLEL_BATCH: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Status {
    /// Unselected, keeps its color and is used as a neighbor
    Context,
    /// Unselected, keeps its color but is invisible to matching
    Excluded,
    Unsynthesized,
    Synthesized { pass: u32 },
}

impl Status {
    #[inline]
    fn has_value(self) -> bool {
        matches!(self, Self::Context | Self::Synthesized { .. })
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct PointState {
    pub(crate) status: Status,
    pub(crate) score: Score,
}

/// The inputs of a single run, all borrowed from the caller.
pub(crate) struct Inputs<'a> {
    pub(crate) target: &'a PixelMap,
    pub(crate) target_mask: &'a Mask,
    pub(crate) corpus: &'a PixelMap,
    pub(crate) corpus_mask: &'a Mask,
    pub(crate) guidance: Option<GuidanceMaps<'a>>,
}

pub(crate) struct Generator<'a> {
    inputs: Inputs<'a>,
    /// The working copy of the target, holding the current best colors
    image: PixelMap,
    states: Vec<PointState>,
    sources: Vec<Option<Coord>>,
    /// Every selected target pixel, row-major
    targets: Vec<Coord>,
    search: NeighborSearch,
    index: CorpusIndex,
    edges: Edges,
}

impl<'a> Generator<'a> {
    /// Prepares a run, failing before any pixel is touched if there is
    /// nothing to copy from, or nothing to synthesize.
    pub(crate) fn new(inputs: Inputs<'a>, params: &Parameters) -> Result<Self, Error> {
        let dims = inputs.target.dims();
        assert_eq!(dims, inputs.target_mask.dims());
        assert_eq!(inputs.target.channels(), inputs.corpus.channels());
        if let Some(ref maps) = inputs.guidance {
            assert_eq!(maps.input.dims(), inputs.corpus.dims());
            assert_eq!(maps.output.dims(), dims);
            assert_eq!(maps.input.channels(), maps.output.channels());
        }

        let index = CorpusIndex::new(inputs.corpus, inputs.corpus_mask)?;

        let edges = Edges::tiling(params.horizontal_tiling, params.vertical_tiling);
        let mut search = NeighborSearch::new(dims, edges);
        let mut states = Vec::with_capacity(dims.width as usize * dims.height as usize);
        let mut targets = Vec::new();

        for y in 0..dims.height {
            for x in 0..dims.width {
                let status = if inputs.target_mask.is_in(x, y) {
                    targets.push(Coord::new(x, y));
                    Status::Unsynthesized
                } else if params.use_border {
                    search.insert(Coord::new(x, y));
                    Status::Context
                } else {
                    Status::Excluded
                };

                states.push(PointState {
                    status,
                    score: Score::UNKNOWN,
                });
            }
        }

        if targets.is_empty() {
            return Err(Error::EmptyTarget);
        }

        log::debug!(
            "prepared {} target pixels, {} context pixels and {} corpus pixels",
            targets.len(),
            search.len(),
            index.len()
        );

        Ok(Self {
            image: inputs.target.clone(),
            sources: vec![None; states.len()],
            states,
            targets,
            search,
            index,
            edges,
            inputs,
        })
    }

    fn pass_order(&self, seed: u64, pass: u32) -> Vec<Coord> {
        let mut order = self.targets.clone();
        order.shuffle(&mut Pcg32::seed_from_u64(seed.wrapping_add(u64::from(pass))));
        order
    }

    fn batch_len(&self, is_seeding: bool, remaining: usize) -> usize {
        let len = if is_seeding {
            (self.search.len() / SEED_BATCH_DIVISOR).max(1).min(MAX_SEED_BATCH)
        } else {
            IMPROVE_BATCH
        };
        len.min(remaining)
    }

    /// Runs the seeding pass followed by improvement passes until the pass
    /// budget is spent, too few pixels improve, or the run is cancelled.
    pub(crate) fn resolve(
        mut self,
        params: &Parameters,
        mut progress: Option<Box<dyn GeneratorProgress + 'a>>,
        cancel: Option<&CancelToken>,
    ) -> Result<Synthesized, Error> {
        let costs = Costs::new(
            params.cauchy_dispersion,
            params.map_weight,
            self.image.channels(),
        );
        let max_workers = params.max_thread_count.unwrap_or_else(num_cpus::get).max(1);
        let target_count = self.targets.len();
        let total_work = target_count * params.max_passes as usize;

        let mut passes_run = 0;
        let mut cancelled = false;

        for pass in 1..=params.max_passes {
            if cancel.map_or(false, CancelToken::is_cancelled) {
                if passes_run == 0 {
                    log::warn!("synthesis cancelled before the seeding pass");
                    return Err(Error::Cancelled);
                }

                log::warn!("synthesis cancelled after {} pass(es)", passes_run);
                cancelled = true;
                break;
            }

            let is_seeding = pass == 1;
            let order = self.pass_order(params.seed, pass);
            let pass_seed = u64::from(
                Pcg32::seed_from_u64(params.seed.wrapping_add(u64::from(pass))).gen::<u32>(),
            );

            let mut cursor = 0;
            let mut improved = 0;

            while cursor < order.len() {
                let len = self.batch_len(is_seeding, order.len() - cursor);
                let batch = &order[cursor..cursor + len];

                let proposals = self.propose(
                    batch,
                    &costs,
                    params,
                    is_seeding,
                    pass_seed.wrapping_add(cursor as u64),
                    max_workers,
                );
                improved += self.merge(batch, &proposals, pass);
                cursor += len;

                if let Some(ref mut progress) = progress {
                    progress.update(ProgressUpdate {
                        image: &self.image,
                        pass,
                        total: ProgressStat {
                            current: passes_run as usize * target_count + cursor,
                            total: total_work,
                        },
                        stage: ProgressStat {
                            current: cursor,
                            total: target_count,
                        },
                    });
                }
            }

            passes_run += 1;

            let fraction = improved as f32 / target_count as f32;
            log::debug!(
                "pass {} resolved {} of {} pixels ({:.2}%)",
                pass,
                improved,
                target_count,
                fraction * 100.0
            );

            if !is_seeding && fraction < params.min_improvement {
                log::debug!("stopping after pass {}, too few pixels improved", pass);
                break;
            }
        }

        log::info!(
            "synthesized {} pixels in {} pass(es)",
            target_count,
            passes_run
        );

        let scores = self
            .states
            .iter()
            .map(|s| match s.status {
                Status::Synthesized { .. } => Some(s.score.0),
                _ => None,
            })
            .collect();

        Ok(Synthesized {
            image: self.image,
            sources: self
                .sources
                .into_iter()
                .map(|s| s.map(|c| (c.x, c.y)))
                .collect(),
            scores,
            passes: passes_run,
            cancelled,
        })
    }

    /// Finds the best match of every pixel in `batch` against the state at
    /// the start of the batch. Each pixel only depends on that state and its
    /// own seed, so splitting the batch between workers can't change the
    /// outcome.
    fn propose(
        &self,
        batch: &[Coord],
        costs: &Costs,
        params: &Parameters,
        is_seeding: bool,
        batch_seed: u64,
        max_workers: usize,
    ) -> Vec<Option<Match>> {
        let matcher = Matcher {
            target: &self.image,
            sources: &self.sources,
            corpus: self.inputs.corpus,
            index: &self.index,
            guidance: self.inputs.guidance,
            costs,
            edges: self.edges,
            trials: params.trials,
        };
        let neighbours = params.neighbours as usize;

        let worker_fn = |first: usize, chunk: &[Coord]| -> Vec<Option<Match>> {
            let mut scratch = Scratch::default();
            chunk
                .iter()
                .enumerate()
                .map(|(i, coord)| {
                    self.propose_one(
                        &matcher,
                        *coord,
                        &mut scratch,
                        neighbours,
                        is_seeding,
                        batch_seed.wrapping_add((first + i) as u64),
                    )
                })
                .collect()
        };

        let n_workers = if batch.len() < MIN_PARALLEL_BATCH {
            1
        } else {
            max_workers.min(batch.len() / (MIN_PARALLEL_BATCH / 2))
        };

        // for WASM we do not have threads and crossbeam panics,
        // so let's just run the worker function directly
        #[cfg(not(target_arch = "wasm32"))]
        {
            if n_workers > 1 {
                let chunk_len = (batch.len() + n_workers - 1) / n_workers;
                let worker_fn = &worker_fn;

                let proposals: Vec<Option<Match>> = crossbeam_utils::thread::scope(|scope| {
                    let handles: Vec<_> = batch
                        .chunks(chunk_len)
                        .enumerate()
                        .map(|(i, chunk)| scope.spawn(move |_| worker_fn(i * chunk_len, chunk)))
                        .collect();

                    handles
                        .into_iter()
                        .flat_map(|handle| handle.join().unwrap())
                        .collect()
                })
                .unwrap();

                return proposals;
            }
        }

        #[cfg(target_arch = "wasm32")]
        let _ = n_workers;

        worker_fn(0, batch)
    }

    fn propose_one(
        &self,
        matcher: &Matcher<'_>,
        coord: Coord,
        scratch: &mut Scratch,
        neighbours: usize,
        is_seeding: bool,
        seed: u64,
    ) -> Option<Match> {
        let current = self.sources[coord.to_flat(self.image.dims())];

        self.search
            .find_template(coord, neighbours, &mut scratch.template);

        if scratch.template.is_empty() && matcher.guidance.is_none() {
            // Nothing to compare against, so the first pick is as good as any
            // and a later one can't be told apart from it
            return if is_seeding {
                let source = self.index.random_probe(&mut Pcg32::seed_from_u64(seed));
                Some(Match {
                    source,
                    score: Score::UNKNOWN,
                })
            } else {
                None
            };
        }

        let baseline = match current {
            Some(source) if !is_seeding => Baseline::Source(source),
            _ => Baseline::Score(Score::UNKNOWN),
        };

        matcher.best_match(coord, scratch, baseline, seed)
    }

    /// Applies proposals in scheduler order, returning how many pixels changed.
    fn merge(&mut self, batch: &[Coord], proposals: &[Option<Match>], pass: u32) -> usize {
        let dims = self.image.dims();
        let mut changed = 0;

        for (coord, proposal) in batch.iter().zip(proposals) {
            let m = match proposal {
                Some(m) => m,
                None => continue,
            };

            let flat = coord.to_flat(dims);
            let state = &mut self.states[flat];
            let was_valued = state.status.has_value();

            // A new source beat the old one under the current template, which
            // may still score worse than the old one did under a sparser
            // template, so the recorded score only ever goes down
            state.status = Status::Synthesized { pass };
            if m.score < state.score {
                state.score = m.score;
            }
            self.sources[flat] = Some(m.source);
            self.image.set(
                coord.x,
                coord.y,
                self.inputs.corpus.get(m.source.x, m.source.y),
            );

            if !was_valued {
                self.search.insert(*coord);
            }
            changed += 1;
        }

        changed
    }
}
