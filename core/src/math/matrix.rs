use ndarray::Array2;

const JACOBI_MAX_SWEEPS: usize = 64;

pub struct MatrixHelper;

impl MatrixHelper {
    /// Symmetric Toeplitz matrix whose first row is `first_row`.
    pub fn toeplitz(first_row: &[f64]) -> Array2<f64> {
        let n = first_row.len();
        Array2::from_shape_fn((n, n), |(i, j)| first_row[i.abs_diff(j)])
    }

    /// Eigenvalues of a real symmetric matrix, ascending.
    ///
    /// Cyclic Jacobi rotations; the matrices handled here are small (one row
    /// per autocorrelation lag) so the O(n^3) sweeps are negligible next to
    /// the autocorrelation itself.
    pub fn symmetric_eigenvalues(matrix: &Array2<f64>) -> Vec<f64> {
        let n = matrix.nrows().min(matrix.ncols());
        let mut a = matrix.to_owned();

        for _ in 0..JACOBI_MAX_SWEEPS {
            let mut off_diagonal = 0.0;
            let mut total = 0.0;
            for ((i, j), value) in a.indexed_iter() {
                let sq = value * value;
                total += sq;
                if i != j {
                    off_diagonal += sq;
                }
            }
            if off_diagonal <= f64::EPSILON * f64::EPSILON * total {
                break;
            }

            for p in 0..n {
                for q in (p + 1)..n {
                    let apq = a[[p, q]];
                    if apq == 0.0 {
                        continue;
                    }
                    let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                    let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                    let c = 1.0 / (t * t + 1.0).sqrt();
                    let s = t * c;

                    for k in 0..n {
                        let akp = a[[k, p]];
                        let akq = a[[k, q]];
                        a[[k, p]] = c * akp - s * akq;
                        a[[k, q]] = s * akp + c * akq;
                    }
                    for k in 0..n {
                        let apk = a[[p, k]];
                        let aqk = a[[q, k]];
                        a[[p, k]] = c * apk - s * aqk;
                        a[[q, k]] = s * apk + c * aqk;
                    }
                }
            }
        }

        let mut eigenvalues: Vec<f64> = a.diag().to_vec();
        eigenvalues.sort_by(|x, y| x.total_cmp(y));
        eigenvalues
    }
}
