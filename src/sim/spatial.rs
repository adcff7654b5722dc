//! Spatial hash grid for proximity queries
//!
//! A fixed `size_x * size_y` grid over a `area_x * area_y` rectangle. Cell
//! coordinates wrap (toroidal), so positions outside the area alias onto cells
//! inside it; that only adds candidates, it never hides one.
//!
//! Every cell is a fixed-capacity run of body indices terminated by
//! [`EMPTY`] when it holds fewer than `capacity` entries. Inserting into a full
//! cell drops the index silently and bumps [`SpatialIndex::dropped`].

use glam::DVec2;

use crate::consts::*;

/// Sentinel ending a cell that is not full
pub const EMPTY: u32 = u32::MAX;

#[derive(Debug, Clone)]
pub struct SpatialIndex {
    size_x: usize,
    size_y: usize,
    capacity: usize,
    area: DVec2,
    /// Position -> index-space scale per axis
    to_index: DVec2,
    /// Largest per-side extents that still visit every column/row once
    max_left: i64,
    max_right: i64,
    max_bottom: i64,
    max_top: i64,
    slots: Box<[u32]>,
    entries: usize,
    dropped: usize,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(
            GRID_SIZE_X,
            GRID_SIZE_Y,
            DVec2::new(GRID_AREA_X, GRID_AREA_Y),
            GRID_CELL_CAPACITY,
        )
    }
}

impl SpatialIndex {
    /// Sizes and capacity are raised to at least 1
    pub fn new(size_x: usize, size_y: usize, area: DVec2, capacity: usize) -> Self {
        let size_x = size_x.max(1);
        let size_y = size_y.max(1);
        let capacity = capacity.max(1);
        let max_left = (size_x / 2) as i64;
        let max_bottom = (size_y / 2) as i64;
        let mut index = Self {
            size_x,
            size_y,
            capacity,
            area,
            to_index: DVec2::new(size_x as f64 / area.x, size_y as f64 / area.y),
            max_left,
            max_right: size_x as i64 - max_left - 1,
            max_bottom,
            max_top: size_y as i64 - max_bottom - 1,
            slots: vec![EMPTY; size_x * size_y * capacity].into_boxed_slice(),
            entries: 0,
            dropped: 0,
        };
        index.clear();
        index
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.size_x, self.size_y)
    }

    pub fn area(&self) -> DVec2 {
        self.area
    }

    pub fn cell_size(&self) -> DVec2 {
        DVec2::new(
            self.area.x / self.size_x as f64,
            self.area.y / self.size_y as f64,
        )
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Indices currently stored
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Insertions dropped since the last clear because their cell was full
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn clear(&mut self) {
        for cell in self.slots.chunks_exact_mut(self.capacity) {
            cell[0] = EMPTY;
        }
        self.entries = 0;
        self.dropped = 0;
    }

    /// Clear, then insert every position with its slice index
    pub fn rebuild<I>(&mut self, positions: I)
    where
        I: IntoIterator<Item = DVec2>,
    {
        self.clear();
        self.extend(0, positions);
    }

    /// Append positions with indices starting at `first`
    pub fn extend<I>(&mut self, first: usize, positions: I)
    where
        I: IntoIterator<Item = DVec2>,
    {
        for (offset, position) in positions.into_iter().enumerate() {
            self.insert(position, first + offset);
        }
        if self.dropped > 0 {
            log::trace!("spatial index dropped {} insertions (full cells)", self.dropped);
        }
    }

    pub fn insert(&mut self, position: DVec2, body: usize) {
        let start = self.cell_start(self.cell_x(position.x), self.cell_y(position.y));
        let cell = &mut self.slots[start..start + self.capacity];
        match cell.iter().position(|&slot| slot == EMPTY) {
            Some(free) => {
                cell[free] = body as u32;
                if free + 1 < cell.len() {
                    cell[free + 1] = EMPTY;
                }
                self.entries += 1;
            }
            None => self.dropped += 1,
        }
    }

    /// Indices stored in the cell containing `position`
    pub fn query_cell(&self, position: DVec2) -> &[u32] {
        let start = self.cell_start(self.cell_x(position.x), self.cell_y(position.y));
        self.cell_at(start)
    }

    /// Visit every index stored in the cells covering the square of half-size
    /// `radius` around `position`, center cell first, then in expanding rings.
    ///
    /// Each cell is visited at most once. The visitor returns `true` to stop;
    /// the return value tells whether it did.
    pub fn visit_radius<F>(&self, position: DVec2, radius: f64, mut visitor: F) -> bool
    where
        F: FnMut(usize) -> bool,
    {
        let center_x = self.cell_x(position.x);
        let center_y = self.cell_y(position.y);

        let mut left = center_x - self.cell_x(position.x - radius);
        let mut right = self.cell_x(position.x + radius) - center_x;
        if left + right >= self.size_x as i64 {
            left = self.max_left;
            right = self.max_right;
        }
        let mut bottom = center_y - self.cell_y(position.y - radius);
        let mut top = self.cell_y(position.y + radius) - center_y;
        if bottom + top >= self.size_y as i64 {
            bottom = self.max_bottom;
            top = self.max_top;
        }
        let rings = left.max(right).max(bottom).max(top);

        if self.visit_cell(center_x, center_y, &mut visitor) {
            return true;
        }
        for d in 1..=rings {
            let visit_bottom = d <= bottom;
            let visit_right = d <= right;
            let visit_top = d <= top;
            let visit_left = d <= left;
            let l = center_x - d.min(left);
            let r = center_x + d.min(right);
            let b = center_y - d.min(bottom);
            let t = center_y + d.min(top);

            // Each edge leaves its last corner to the next edge.
            if visit_bottom {
                let y = center_y - d;
                let end = if visit_right { r - 1 } else { r };
                for x in l..=end {
                    if self.visit_cell(x, y, &mut visitor) {
                        return true;
                    }
                }
            }
            if visit_right {
                let x = center_x + d;
                let end = if visit_top { t - 1 } else { t };
                for y in b..=end {
                    if self.visit_cell(x, y, &mut visitor) {
                        return true;
                    }
                }
            }
            if visit_top {
                let y = center_y + d;
                let end = if visit_left { l + 1 } else { l };
                for x in (end..=r).rev() {
                    if self.visit_cell(x, y, &mut visitor) {
                        return true;
                    }
                }
            }
            if visit_left {
                let x = center_x - d;
                let end = if visit_bottom { b + 1 } else { b };
                for y in (end..=t).rev() {
                    if self.visit_cell(x, y, &mut visitor) {
                        return true;
                    }
                }
            }
        }
        false
    }

    #[inline]
    fn cell_x(&self, x: f64) -> i64 {
        (x * self.to_index.x).floor() as i64
    }

    #[inline]
    fn cell_y(&self, y: f64) -> i64 {
        (y * self.to_index.y).floor() as i64
    }

    #[inline]
    fn cell_start(&self, x: i64, y: i64) -> usize {
        let x = x.rem_euclid(self.size_x as i64) as usize;
        let y = y.rem_euclid(self.size_y as i64) as usize;
        (x * self.size_y + y) * self.capacity
    }

    fn cell_at(&self, start: usize) -> &[u32] {
        let cell = &self.slots[start..start + self.capacity];
        let len = cell.iter().position(|&slot| slot == EMPTY).unwrap_or(cell.len());
        &cell[..len]
    }

    #[inline]
    fn visit_cell<F>(&self, x: i64, y: i64, visitor: &mut F) -> bool
    where
        F: FnMut(usize) -> bool,
    {
        self.cell_at(self.cell_start(x, y))
            .iter()
            .any(|&body| visitor(body as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn collect(index: &SpatialIndex, position: DVec2, radius: f64) -> Vec<usize> {
        let mut seen = Vec::new();
        index.visit_radius(position, radius, |i| {
            seen.push(i);
            false
        });
        seen
    }

    #[test]
    fn test_insert_and_query_cell() {
        let mut index = SpatialIndex::new(4, 4, DVec2::new(4.0, 4.0), 3);
        index.insert(DVec2::new(0.5, 0.5), 7);
        index.insert(DVec2::new(0.6, 0.4), 9);
        index.insert(DVec2::new(1.5, 0.5), 1);
        assert_eq!(index.query_cell(DVec2::new(0.1, 0.9)), &[7, 9]);
        assert_eq!(index.query_cell(DVec2::new(1.1, 0.1)), &[1]);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_negative_positions_use_floor() {
        let mut index = SpatialIndex::new(8, 8, DVec2::new(8.0, 8.0), 2);
        index.insert(DVec2::new(-0.5, -0.5), 1);
        index.insert(DVec2::new(0.5, 0.5), 2);
        assert_eq!(index.query_cell(DVec2::new(-0.1, -0.9)), &[1]);
        // -0.5 lands in cell -1, which wraps to the last column/row
        assert_eq!(index.query_cell(DVec2::new(7.5, 7.5)), &[1]);
    }

    #[test]
    fn test_full_cell_drops_insertion() {
        let mut index = SpatialIndex::new(2, 2, DVec2::new(2.0, 2.0), 2);
        for i in 0..4 {
            index.insert(DVec2::new(0.5, 0.5), i);
        }
        assert_eq!(index.query_cell(DVec2::new(0.5, 0.5)), &[0, 1]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.dropped(), 2);
        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.dropped(), 0);
        assert!(index.query_cell(DVec2::new(0.5, 0.5)).is_empty());
    }

    #[test]
    fn test_visit_radius_visits_each_cell_once() {
        let mut index = SpatialIndex::new(5, 3, DVec2::new(5.0, 3.0), 1);
        let mut next = 0;
        for x in 0..5 {
            for y in 0..3 {
                index.insert(DVec2::new(x as f64 + 0.5, y as f64 + 0.5), next);
                next += 1;
            }
        }
        // Radius larger than the grid wraps on both axes
        let seen = collect(&index, DVec2::new(2.5, 1.5), 100.0);
        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(seen.len(), 15);
        assert_eq!(unique.len(), 15);
    }

    #[test]
    fn test_visit_radius_starts_at_center_and_stops_early() {
        let mut index = SpatialIndex::new(8, 8, DVec2::new(8.0, 8.0), 4);
        index.insert(DVec2::new(4.5, 4.5), 0);
        index.insert(DVec2::new(5.5, 4.5), 1);
        index.insert(DVec2::new(3.5, 3.5), 2);

        let seen = collect(&index, DVec2::new(4.5, 4.5), 1.0);
        assert_eq!(seen[0], 0);
        assert_eq!(seen.len(), 3);

        let mut visits = 0;
        let stopped = index.visit_radius(DVec2::new(4.5, 4.5), 1.0, |_| {
            visits += 1;
            true
        });
        assert!(stopped);
        assert_eq!(visits, 1);
    }

    #[test]
    fn test_zero_radius_visits_center_only() {
        let mut index = SpatialIndex::new(8, 8, DVec2::new(8.0, 8.0), 4);
        index.insert(DVec2::new(4.5, 4.5), 0);
        index.insert(DVec2::new(5.5, 4.5), 1);
        assert_eq!(collect(&index, DVec2::new(4.2, 4.2), 0.0), vec![0]);
    }

    proptest! {
        #[test]
        fn prop_visit_radius_has_no_false_negatives(
            size_x in 1usize..20,
            size_y in 1usize..20,
            area_x in 0.5f64..6.0,
            area_y in 0.5f64..6.0,
            points in prop::collection::vec((-3.0f64..3.0, -3.0f64..3.0), 1..120),
            query in (-3.0f64..3.0, -3.0f64..3.0),
            radius in 0.0f64..4.0,
        ) {
            // Capacity large enough that nothing is dropped
            let mut index = SpatialIndex::new(size_x, size_y, DVec2::new(area_x, area_y), points.len());
            let positions: Vec<DVec2> = points.iter().map(|&(x, y)| DVec2::new(x, y)).collect();
            index.rebuild(positions.iter().copied());
            prop_assert_eq!(index.dropped(), 0);

            let center = DVec2::new(query.0, query.1);
            let seen = collect(&index, center, radius);
            let unique: HashSet<usize> = seen.iter().copied().collect();
            prop_assert_eq!(unique.len(), seen.len());

            for (i, p) in positions.iter().enumerate() {
                if p.distance(center) <= radius {
                    prop_assert!(unique.contains(&i), "body {} at {:?} missed", i, p);
                }
            }
        }
    }
}
