use crate::layers::Shape;

use ndarray::linalg::general_mat_mul;
use ndarray::{Array1, Array2, ArrayBase, Axis, DataMut, Dimension};
use rand::distributions::Distribution;
use std::ops::{AddAssign, Deref, DerefMut};

/// A dense `width x height` grid of values.
///
/// Backed by an ndarray matrix with `height` rows and `width` columns, so
/// `mat[(y, x)]` addresses row `y` and column `x`. A grid of height 1 reads
/// like a plain vector.
#[derive(Clone, Debug, PartialEq)]
pub struct Mat(Array2<f64>);

impl Mat {
    /// Allocates a zero-filled grid.
    pub fn zeros(width: usize, height: usize) -> Self {
        Mat(Array2::zeros((height, width)))
    }

    /// Allocates a grid with every value drawn from `distribution`.
    pub fn random<D>(distribution: D, width: usize, height: usize) -> Self
    where
        D: Distribution<f64>,
    {
        let mut rng = rand::thread_rng();
        Mat(Array2::from_shape_simple_fn((height, width), || {
            distribution.sample(&mut rng)
        }))
    }

    /// Lays `values` out row by row. Returns `None` unless there are exactly
    /// `width * height` of them.
    pub fn from_vec(width: usize, height: usize, values: Vec<f64>) -> Option<Self> {
        Array2::from_shape_vec((height, width), values).ok().map(Mat)
    }

    /// Builds a grid from a list of equally long rows.
    ///
    /// Panics if the rows are ragged.
    pub fn from_rows<R>(rows: &[R]) -> Self
    where
        R: AsRef<[f64]>,
    {
        let width = rows.first().map_or(0, |row| row.as_ref().len());
        assert!(rows.iter().all(|row| row.as_ref().len() == width));
        Mat(Array2::from_shape_fn((rows.len(), width), |(y, x)| {
            rows[y].as_ref()[x]
        }))
    }

    pub fn width(&self) -> usize {
        self.0.ncols()
    }

    pub fn height(&self) -> usize {
        self.0.nrows()
    }

    pub fn shape(&self) -> Shape {
        Shape::new(self.width(), self.height())
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.0
    }

    /// The values in row-major order.
    pub fn to_vec(&self) -> Vec<f64> {
        self.0.iter().copied().collect()
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.0.outer_iter().map(|row| row.to_vec()).collect()
    }

    /// The values as one vector, row by row.
    pub fn flatten(&self) -> Array1<f64> {
        self.0.iter().copied().collect()
    }

    /// Overwrites the grid row by row with `values`.
    pub fn assign_flat(&mut self, values: &Array1<f64>) {
        assert_eq!(self.0.len(), values.len());
        for (v, &x) in self.0.iter_mut().zip(values) {
            *v = x;
        }
    }

    /// Overwrites this grid with the contents of `other`.
    pub fn copy_from(&mut self, other: &Mat) {
        assert_eq!(self.shape(), other.shape());
        self.0.assign(&other.0);
    }

    /// Returns true if any value differs from zero.
    pub fn any_nonzero(&self) -> bool {
        self.0.iter().any(|&v| v != 0.0)
    }
}

impl Deref for Mat {
    type Target = Array2<f64>;

    fn deref(&self) -> &Array2<f64> {
        &self.0
    }
}

impl DerefMut for Mat {
    fn deref_mut(&mut self) -> &mut Array2<f64> {
        &mut self.0
    }
}

impl From<Array2<f64>> for Mat {
    fn from(values: Array2<f64>) -> Mat {
        Mat(values)
    }
}

impl<'a> AddAssign<&'a Mat> for Mat {
    fn add_assign(&mut self, other: &Mat) {
        // ndarray would broadcast a 1x1 grid, which is never wanted here
        assert_eq!(self.shape(), other.shape());
        self.0 += &other.0;
    }
}

/// Accumulates the outer product `alpha * a * transpose(b)` into `target`.
pub fn add_outer(target: &mut Array2<f64>, alpha: f64, a: &Array1<f64>, b: &Array1<f64>) {
    let column = a.view().insert_axis(Axis(1));
    let row = b.view().insert_axis(Axis(0));
    general_mat_mul(alpha, &column, &row, 1.0, target);
}

/// Resets every value in a container to zero.
pub trait ZeroOut {
    fn zero_out(&mut self);
}

impl ZeroOut for f64 {
    fn zero_out(&mut self) {
        *self = 0.0;
    }
}

impl ZeroOut for Mat {
    fn zero_out(&mut self) {
        self.0.fill(0.0);
    }
}

impl<S, D> ZeroOut for ArrayBase<S, D>
where
    S: DataMut<Elem = f64>,
    D: Dimension,
{
    fn zero_out(&mut self) {
        self.fill(0.0);
    }
}

impl<T> ZeroOut for [T]
where
    T: ZeroOut,
{
    fn zero_out(&mut self) {
        for elem in self {
            elem.zero_out();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn zeros_has_requested_shape() {
        let m = Mat::zeros(3, 2);
        assert_eq!(m.width(), 3);
        assert_eq!(m.height(), 2);
        assert_eq!(m.to_rows(), vec![vec![0.0; 3], vec![0.0; 3]]);
    }

    #[test]
    fn indexes_row_then_column() {
        let m = Mat::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(m[(0, 2)], 3.0);
        assert_eq!(m[(1, 0)], 4.0);
        assert_eq!(m.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn from_vec_checks_length() {
        assert_eq!(
            Mat::from_vec(2, 1, vec![1.0, 2.0]),
            Some(Mat::from_rows(&[[1.0, 2.0]]))
        );
        assert_eq!(Mat::from_vec(2, 2, vec![1.0, 2.0]), None);
    }

    #[test]
    fn flatten_and_assign_flat_follow_rows() {
        let mut m = Mat::from_rows(&[[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(m.flatten(), arr1(&[1.0, 2.0, 3.0, 4.0]));
        m.assign_flat(&arr1(&[4.0, 3.0, 2.0, 1.0]));
        assert_eq!(m.to_rows(), vec![vec![4.0, 3.0], vec![2.0, 1.0]]);
    }

    #[test]
    fn add_outer_accumulates() {
        let mut m = arr2(&[[0.0, 0.0], [0.0, 0.0]]);
        add_outer(&mut m, 2.0, &arr1(&[1.0, 3.0]), &arr1(&[1.0, -1.0]));
        add_outer(&mut m, 1.0, &arr1(&[1.0, 0.0]), &arr1(&[1.0, 1.0]));
        assert_eq!(m, arr2(&[[3.0, -1.0], [6.0, -6.0]]));
    }

    #[test]
    fn add_assign_and_zero_out() {
        let mut m = Mat::from_rows(&[[1.0, 2.0]]);
        m += &Mat::from_rows(&[[0.5, -2.0]]);
        assert_eq!(m.to_vec(), vec![1.5, 0.0]);
        assert!(m.any_nonzero());
        m.zero_out();
        assert!(!m.any_nonzero());
    }

    #[test]
    #[should_panic]
    fn add_assign_rejects_shape_mismatch() {
        let mut m = Mat::zeros(2, 1);
        m += &Mat::zeros(1, 2);
    }
}
