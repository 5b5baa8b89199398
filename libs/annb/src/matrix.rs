//! Dense row-major 2-D arrays.

use crate::error::{Error, Result};

/// Row-major `rows × cols` matrix backed by one contiguous buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix<T> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
}

impl<T: Copy> Matrix<T> {
    /// Wrap a flat buffer. Fails when `data.len() != rows * cols`.
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::Shape(format!(
                "buffer of {} elements cannot be viewed as {}x{}",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self { data, rows, cols })
    }

    /// Build from a list of equally sized rows.
    pub fn from_rows(rows: &[Vec<T>]) -> Result<Self> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(Error::Shape(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    cols
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            rows: rows.len(),
            cols,
        })
    }

    /// A matrix filled with `value`.
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            data: vec![value; rows * cols],
            rows,
            cols,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Row `i` as a slice. Panics when out of bounds, like slice indexing.
    #[inline]
    pub fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [T] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        (0..self.rows).map(move |i| self.row(i))
    }

    /// Copy of the first `n` rows (all rows when `n >= rows`).
    pub fn head(&self, n: usize) -> Self {
        let n = n.min(self.rows);
        Self {
            data: self.data[..n * self.cols].to_vec(),
            rows: n,
            cols: self.cols,
        }
    }

    /// Column `j` as an owned vector.
    pub fn column(&self, j: usize) -> Vec<T> {
        (0..self.rows).map(|i| self.data[i * self.cols + j]).collect()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Append the rows of `other`. Column counts must match unless `self` is empty.
    pub fn extend_rows(&mut self, other: &Matrix<T>) -> Result<()> {
        if self.rows == 0 && self.data.is_empty() {
            self.cols = other.cols;
        } else if other.cols != self.cols {
            return Err(Error::Shape(format!(
                "cannot append {} columns to a matrix with {} columns",
                other.cols, self.cols
            )));
        }
        self.data.extend_from_slice(&other.data);
        self.rows += other.rows;
        Ok(())
    }
}

impl Matrix<f32> {
    /// L2-normalize every row in place.
    pub fn normalize_rows(&mut self) {
        if self.cols == 0 {
            return;
        }
        for row in self.data.chunks_exact_mut(self.cols) {
            annb_core::distance::normalize_in_place(row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_checks_shape() {
        assert!(Matrix::from_vec(vec![1.0f32; 6], 2, 3).is_ok());
        assert!(matches!(
            Matrix::from_vec(vec![1.0f32; 5], 2, 3),
            Err(Error::Shape(_))
        ));
    }

    #[test]
    fn test_rows_head_column() {
        let m = Matrix::from_vec((0..12i64).collect(), 4, 3).unwrap();
        assert_eq!(m.row(1), &[3, 4, 5]);
        assert_eq!(m.head(2).shape(), (2, 3));
        assert_eq!(m.head(10).shape(), (4, 3));
        assert_eq!(m.column(0), vec![0, 3, 6, 9]);
        assert_eq!(m.iter_rows().count(), 4);
    }

    #[test]
    fn test_from_rows_rejects_ragged() {
        assert!(Matrix::from_rows(&[vec![1, 2], vec![3]]).is_err());
        let m = Matrix::from_rows(&[vec![1, 2], vec![3, 4]]).unwrap();
        assert_eq!(m.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_normalize_rows() {
        let mut m = Matrix::from_vec(vec![3.0f32, 4.0, 0.0, 0.0], 2, 2).unwrap();
        m.normalize_rows();
        assert!((m.row(0)[0] - 0.6).abs() < 1e-6);
        assert!((m.row(0)[1] - 0.8).abs() < 1e-6);
        assert_eq!(m.row(1), &[0.0, 0.0]);
    }

    #[test]
    fn test_extend_rows() {
        let mut m = Matrix::from_vec(Vec::<f32>::new(), 0, 0).unwrap();
        m.extend_rows(&Matrix::filled(2, 3, 1.0)).unwrap();
        m.extend_rows(&Matrix::filled(1, 3, 2.0)).unwrap();
        assert_eq!(m.shape(), (3, 3));
        assert!(m.extend_rows(&Matrix::filled(1, 2, 0.0)).is_err());
    }
}
