//! Uniform-grid spatial index over vessel polylines

use std::collections::{BTreeSet, HashMap};

use generational_arena::Index;

use crate::domain::geometry::{BoundingBox, Point};

type CellKey = (i64, i64, i64);

/// Hash grid mapping cells to the vessels passing through them.
///
/// Polylines are rasterized at a quarter-cell step; queries are widened by
/// one cell so a segment touching the query box is never missed.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f64,
    cells: HashMap<CellKey, Vec<Index>>,
    entries: HashMap<Index, Vec<CellKey>>,
}

impl SpatialGrid {
    pub fn new(cell_size: f64) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            1.0
        };
        Self {
            cell_size,
            cells: HashMap::new(),
            entries: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key(&self, p: &Point) -> CellKey {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
            (p.z / self.cell_size).floor() as i64,
        )
    }

    fn rasterize(&self, points: &[Point]) -> Vec<CellKey> {
        let step = self.cell_size / 4.0;
        let mut keys = BTreeSet::new();
        for w in points.windows(2) {
            let length = w[0].distance(&w[1]);
            let n = (length / step).ceil().max(1.0) as usize;
            for s in 0..=n {
                keys.insert(self.key(&w[0].lerp(&w[1], s as f64 / n as f64)));
            }
        }
        if points.len() == 1 {
            keys.insert(self.key(&points[0]));
        }
        keys.into_iter().collect()
    }

    pub fn insert(&mut self, idx: Index, points: &[Point]) {
        self.remove(idx);
        let keys = self.rasterize(points);
        for key in &keys {
            self.cells.entry(*key).or_default().push(idx);
        }
        self.entries.insert(idx, keys);
    }

    pub fn remove(&mut self, idx: Index) {
        if let Some(keys) = self.entries.remove(&idx) {
            for key in keys {
                if let Some(cell) = self.cells.get_mut(&key) {
                    cell.retain(|&c| c != idx);
                    if cell.is_empty() {
                        self.cells.remove(&key);
                    }
                }
            }
        }
    }

    /// Handles that may pass through `query`, deduplicated and sorted by
    /// arena slot for deterministic iteration.
    pub fn query(&self, query: &BoundingBox) -> Vec<Index> {
        let widened = query.expanded(self.cell_size);
        let lo = self.key(&widened.min);
        let hi = self.key(&widened.max);
        let span = (hi.0 - lo.0 + 1) as f64 * (hi.1 - lo.1 + 1) as f64 * (hi.2 - lo.2 + 1) as f64;

        let mut found = BTreeSet::new();
        if span > self.cells.len() as f64 {
            // Sparse grid: scanning occupied cells is cheaper than the range
            for (key, cell) in &self.cells {
                if (lo.0..=hi.0).contains(&key.0)
                    && (lo.1..=hi.1).contains(&key.1)
                    && (lo.2..=hi.2).contains(&key.2)
                {
                    found.extend(cell.iter().map(|idx| idx.into_raw_parts()));
                }
            }
        } else {
            for i in lo.0..=hi.0 {
                for j in lo.1..=hi.1 {
                    for k in lo.2..=hi.2 {
                        if let Some(cell) = self.cells.get(&(i, j, k)) {
                            found.extend(cell.iter().map(|idx| idx.into_raw_parts()));
                        }
                    }
                }
            }
        }
        found
            .into_iter()
            .map(|(slot, generation)| Index::from_raw_parts(slot, generation))
            .collect()
    }

    pub fn all(&self) -> Vec<Index> {
        let slots: BTreeSet<_> = self.entries.keys().map(|idx| idx.into_raw_parts()).collect();
        slots
            .into_iter()
            .map(|(slot, generation)| Index::from_raw_parts(slot, generation))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use generational_arena::Arena;

    #[test]
    fn given_indexed_segments_when_querying_then_returns_nearby_only() {
        let mut arena = Arena::new();
        let a = arena.insert(());
        let b = arena.insert(());
        let mut grid = SpatialGrid::new(1.0);
        grid.insert(a, &[Point::origin(), Point::new(0.5, 0.5, 0.5)]);
        grid.insert(b, &[Point::new(5.0, 5.0, 5.0), Point::new(6.0, 6.0, 6.0)]);

        let hits = grid.query(&BoundingBox::around(&Point::origin(), 1.0));
        assert_eq!(hits, vec![a]);
        assert_eq!(
            grid.query(&BoundingBox::around(&Point::new(5.5, 5.5, 5.5), 10.0)).len(),
            2
        );
    }

    #[test]
    fn given_long_diagonal_segment_when_querying_midpoint_then_found() {
        let mut arena = Arena::new();
        let a = arena.insert(());
        let mut grid = SpatialGrid::new(0.5);
        grid.insert(a, &[Point::origin(), Point::new(10.0, 10.0, 10.0)]);
        let hits = grid.query(&BoundingBox::around(&Point::new(5.0, 5.0, 5.0), 0.1));
        assert_eq!(hits, vec![a]);
    }

    #[test]
    fn given_removed_entry_when_querying_then_absent() {
        let mut arena = Arena::new();
        let a = arena.insert(());
        let mut grid = SpatialGrid::new(0.25);
        grid.insert(a, &[Point::origin(), Point::new(2.0, 0.0, 0.0)]);
        grid.remove(a);
        assert!(grid.is_empty());
        assert!(grid.query(&BoundingBox::around(&Point::origin(), 3.0)).is_empty());
    }
}
