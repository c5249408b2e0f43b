//! Splits a grid into independent rectangular regions.
//!
//! A sheet often holds several tables separated by blank columns or blank
//! rows. Segmentation walks the grid, cuts it on entirely-null columns
//! first and entirely-null rows second, and repeats on every piece until
//! no piece changes any more.
use crate::table::grid::Grid;
use crate::table::grid::Value;
use std::fmt::Debug;
use std::ops::Range;

/// A rectangular window (row range x column range) over a grid.
#[derive(Clone)]
pub struct Region<'g> {
    grid: &'g Grid,
    /// Row indexes in the grid (half-open)
    pub rows: Range<usize>,
    /// Column indexes in the grid (half-open)
    pub cols: Range<usize>,
}

impl PartialEq for Region<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.grid, other.grid) && self.rows == other.rows && self.cols == other.cols
    }
}

impl Debug for Region<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

impl<'g> Region<'g> {
    /// The region covering the whole grid.
    pub fn whole(grid: &'g Grid) -> Self {
        Region {
            grid,
            rows: 0..grid.height(),
            cols: 0..grid.width(),
        }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.cols.len()
    }

    /// Cell at a region-relative position.
    pub fn get(&self, row: usize, col: usize) -> &'g Value {
        self.grid.get(self.rows.start + row, self.cols.start + col)
    }

    /// Copies the region's cells out, row by row.
    pub fn to_rows(&self) -> Vec<Vec<Value>> {
        self.rows
            .clone()
            .map(|row| self.cols.clone().map(|col| self.grid.get(row, col).to_owned()).collect())
            .collect()
    }

    fn is_null_row(&self, row: usize) -> bool {
        self.cols.clone().all(|col| self.grid.get(row, col).is_null())
    }

    fn is_null_col(&self, col: usize) -> bool {
        self.rows.clone().all(|row| self.grid.get(row, col).is_null())
    }

    pub fn is_null(&self) -> bool {
        self.rows.clone().all(|row| self.is_null_row(row))
    }

    fn has_null_col(&self) -> bool {
        self.cols.clone().any(|col| self.is_null_col(col))
    }

    fn has_null_row(&self) -> bool {
        self.rows.clone().any(|row| self.is_null_row(row))
    }

    /// One segmentation step: split on null columns if there are any,
    /// otherwise on null rows, otherwise return the region itself.
    fn split_once(&self) -> Vec<Region<'g>> {
        if self.has_null_col() {
            blocks(self.cols.clone(), |col| self.is_null_col(col))
                .into_iter()
                .map(|cols| Region { grid: self.grid, rows: self.rows.clone(), cols })
                .collect()
        } else if self.has_null_row() {
            blocks(self.rows.clone(), |row| self.is_null_row(row))
                .into_iter()
                .map(|rows| Region { grid: self.grid, rows, cols: self.cols.clone() })
                .collect()
        } else {
            vec![self.clone()]
        }
    }
}

/// Collects the maximal runs of indexes for which `is_separator` is false.
fn blocks<F>(indexes: Range<usize>, is_separator: F) -> Vec<Range<usize>>
where
    F: Fn(usize) -> bool,
{
    let mut blocks = Vec::new();
    let mut start: Option<usize> = None;
    for index in indexes.clone() {
        match (is_separator(index), start) {
            (true, Some(lower)) => {
                blocks.push(lower..index);
                start = None;
            }
            (false, None) => start = Some(index),
            _ => (),
        }
    }
    if let Some(lower) = start {
        blocks.push(lower..indexes.end);
    }
    blocks
}

/// Partitions the grid into regions with no entirely-null row or column.
///
/// An entirely-null (or zero-sized) grid yields no region at all.
pub fn segment(grid: &Grid) -> Vec<Region<'_>> {
    segment_region(Region::whole(grid))
}

/// Re-runs segmentation on a single region until a full pass leaves every
/// region unchanged.
pub fn segment_region(region: Region<'_>) -> Vec<Region<'_>> {
    if region.height() == 0 || region.width() == 0 || region.is_null() {
        return Vec::new();
    }
    let mut regions = vec![region];
    loop {
        let next: Vec<Region> = regions.iter().flat_map(|region| region.split_once()).collect();
        if next == regions {
            return next;
        }
        regions = next;
    }
}
