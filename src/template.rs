//! Neighbor templates: which nearby target pixels are compared when scoring a
//! candidate source.

use rstar::RTree;

use crate::pixel_map::{Coord, EdgeMode, Edges, SignedCoord};
use crate::Dims;

/// Ordered offsets to the neighbors of a target pixel, nearest first, along
/// with the weight each neighbor contributes to a match score.
#[derive(Clone, Debug, Default)]
pub(crate) struct NeighborTemplate {
    offsets: Vec<SignedCoord>,
    weights: Vec<f32>,
    total_weight: f32,
}

impl NeighborTemplate {
    pub(crate) fn clear(&mut self) {
        self.offsets.clear();
        self.weights.clear();
        self.total_weight = 0.0;
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    #[inline]
    pub(crate) fn offsets(&self) -> &[SignedCoord] {
        &self.offsets
    }

    #[inline]
    pub(crate) fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub(crate) fn total_weight(&self) -> f32 {
        self.total_weight
    }

    fn push(&mut self, offset: SignedCoord) {
        self.offsets.push(offset);
    }

    // Closer neighbors weigh more, relative to the average squared distance
    // of the whole template
    fn compute_weights(&mut self) {
        self.weights.clear();
        if self.offsets.is_empty() {
            self.total_weight = 0.0;
            return;
        }

        let squared: Vec<f64> = self
            .offsets
            .iter()
            .map(|o| f64::from(o.x * o.x + o.y * o.y))
            .collect();
        let avg = squared.iter().sum::<f64>() / squared.len() as f64;

        self.weights
            .extend(squared.iter().map(|d| f64::exp(-d / avg) as f32));
        self.total_weight = self.weights.iter().sum();
    }
}

/// Finds the nearest target pixels that already hold a value.
///
/// On axes that tile, every point is also inserted one image width (or
/// height) away on both sides, so the nearest neighbors of a pixel near an
/// edge include the pixels across the seam.
pub(crate) struct NeighborSearch {
    tree: RTree<[i32; 2]>,
    dims: Dims,
    edges: Edges,
    count: usize,
}

impl NeighborSearch {
    pub(crate) fn new(dims: Dims, edges: Edges) -> Self {
        Self {
            tree: RTree::new(),
            dims,
            edges,
            count: 0,
        }
    }

    /// The number of distinct pixels inserted.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    fn mirrors(mode: EdgeMode) -> &'static [i32] {
        match mode {
            EdgeMode::Clip => &[0],
            EdgeMode::Wrap => &[0, -1, 1],
        }
    }

    pub(crate) fn insert(&mut self, coord: Coord) {
        let (w, h) = (self.dims.width as i32, self.dims.height as i32);
        let c = coord.to_signed();

        for my in Self::mirrors(self.edges.vertical) {
            for mx in Self::mirrors(self.edges.horizontal) {
                self.tree.insert([c.x + mx * w, c.y + my * h]);
            }
        }
        self.count += 1;
    }

    /// Fills `template` with the offsets to the `k` nearest valued pixels of
    /// `center`, never including `center` itself.
    pub(crate) fn find_template(&self, center: Coord, k: usize, template: &mut NeighborTemplate) {
        template.clear();
        let c = center.to_signed();

        for point in self.tree.nearest_neighbor_iter(&[c.x, c.y]) {
            if template.len() >= k {
                break;
            }

            let (rx, ry) = self.edges.resolve(point[0], point[1], self.dims);
            if rx == center.x && ry == center.y {
                continue;
            }

            template.push(SignedCoord::new(point[0] - c.x, point[1] - c.y));
        }

        template.compute_weights();
    }
}
