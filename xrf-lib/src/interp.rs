/// Linear interpolation of a single value (equivalent to numpy.interp).
///
/// Values outside the range are clamped to the boundary values.
pub fn interp_one(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[xp.len() - 1] {
        return fp[fp.len() - 1];
    }

    let idx = xp.partition_point(|&v| v < x);
    if idx == 0 {
        return fp[0];
    }
    if xp[idx] == x {
        return fp[idx];
    }

    let lo = idx - 1;
    let t = (x - xp[lo]) / (xp[idx] - xp[lo]);
    fp[lo] + t * (fp[idx] - fp[lo])
}

/// Indices of the two tabulated abscissae bracketing `x`.
///
/// `xp` must be non-decreasing with at least two points. An abscissa may be
/// repeated (absorption edges); an exact hit on a repeated value selects the
/// upper pair so that the post-edge sample is used. Outside the table the
/// outermost pair is returned, ready for extrapolation.
pub fn bracket(xp: &[f64], x: f64) -> (usize, usize) {
    let n = xp.len();
    if n < 2 {
        return (0, 0);
    }
    // number of samples <= x
    let idx = xp.partition_point(|&v| v <= x);
    if idx == 0 {
        (0, 1)
    } else if idx >= n {
        (n - 2, n - 1)
    } else {
        (idx - 1, idx)
    }
}

/// Interpolate (or extrapolate) on the straight line through
/// `(ln x0, ln y0)` and `(ln x1, ln y1)`.
///
/// Both ordinates must be positive. Tabulated points are reproduced exactly.
pub fn loglog(x: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    if x == x0 {
        return y0;
    }
    if x == x1 {
        return y1;
    }
    let scale = 1.0 / (x1 / x0).ln();
    let a = (x1 / x).ln() * scale;
    let b = (x / x0).ln() * scale;
    (a * y0.ln() + b * y1.ln()).exp()
}
