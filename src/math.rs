use faer::Mat;
use itertools::izip;

pub(crate) fn vector_dot(a: &[f64], b: &[f64]) -> f64 {
    assert!(a.len() == b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// out = y + a * x
pub(crate) fn axpy_out(x: &[f64], y: &[f64], a: f64, out: &mut [f64]) {
    let n = x.len();
    assert!(y.len() == n);
    assert!(out.len() == n);

    izip!(x, y, out).for_each(|(x, y, out)| {
        *out = a * x + y;
    });
}

/// out = L x for a lower-triangular `L`. Entries above the diagonal are ignored.
pub(crate) fn lower_mat_vec(l: &Mat<f64>, x: &[f64], out: &mut [f64]) {
    let n = x.len();
    assert!(l.nrows() == n);
    assert!(l.ncols() == n);
    assert!(out.len() == n);

    for (i, out) in out.iter_mut().enumerate() {
        *out = (0..=i).map(|j| l[(i, j)] * x[j]).sum();
    }
}

/// Rank-one update of a lower Cholesky factor.
///
/// Replaces `L` by the factor of `L Lᵀ + sign · x xᵀ` where `sign` is `1.` or
/// `-1.`. `x` is used as scratch space. Returns `false` and leaves `L`
/// untouched if a downdate would make the matrix indefinite.
pub(crate) fn cholesky_rank_one_update(l: &mut Mat<f64>, x: &mut [f64], sign: f64) -> bool {
    let n = x.len();
    assert!(l.nrows() == n);
    assert!(l.ncols() == n);
    assert!(sign == 1. || sign == -1.);

    let mut updated = l.clone();
    for k in 0..n {
        let diag = updated[(k, k)];
        let r2 = diag * diag + sign * x[k] * x[k];
        if !(r2 > 0.) || !r2.is_finite() {
            return false;
        }
        let r = r2.sqrt();
        let c = r / diag;
        let s = x[k] / diag;
        updated[(k, k)] = r;
        for i in (k + 1)..n {
            let val = (updated[(i, k)] + sign * s * x[i]) / c;
            updated[(i, k)] = val;
            x[i] = c * x[i] - s * val;
        }
    }
    *l = updated;
    true
}

/// Sample mean and unbiased sample variance.
///
/// The variance of fewer than two values is `NAN`.
pub(crate) fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    let mut mean = 0f64;
    let mut m2 = 0f64;
    for (count, &x) in values.iter().enumerate() {
        let diff = x - mean;
        mean += diff / (count + 1) as f64;
        m2 += diff * (x - mean);
    }
    let variance = if values.len() < 2 {
        f64::NAN
    } else {
        m2 / (values.len() - 1) as f64
    };
    (mean, variance)
}
