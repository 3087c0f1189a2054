//! Exponential integrals and the de Boer secondary-fluorescence integrals.
//!
//! References: Abramowitz & Stegun 5.1; D.K.G. de Boer, X-Ray Spectrometry
//! 19 (1990) 145.

use crate::error::{Result, XrfError};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

fn check_finite(value: f64, what: &str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(XrfError::Numerical(format!("{what}: non-finite result")))
    }
}

/// A&S 5.1.53: `E1(x) + ln(x)` for `0 <= x <= 1`.
fn as_5_1_53(x: f64) -> f64 {
    const A: [f64; 6] = [
        -0.577_215_66,
        0.999_991_93,
        -0.249_910_55,
        0.055_199_68,
        -0.009_760_04,
        0.001_078_57,
    ];
    let mut result = A[5] * x;
    for a in A[1..5].iter().rev() {
        result = (result + a) * x;
    }
    result + A[0]
}

/// `exp(x) E1(x)` for `x > 1` by a modified Lentz continued fraction.
fn lentz_d(x: f64, epsilon: f64) -> f64 {
    let mut b = 1.0 + x;
    let mut f = b;
    let mut c = f;
    let mut d = 0.0;
    for i in 1..100 {
        b += 2.0;
        let a = -((i * i) as f64);
        c = b + a / c;
        d = 1.0 / (b + a * d);
        let delta = c * d;
        f *= delta;
        if (delta - 1.0).abs() < epsilon {
            return 1.0 / f;
        }
    }
    // A&S 5.1.20 bounds
    0.5 * (0.5 * (1.0 + 2.0 / x).ln() + (1.0 + 1.0 / x).ln())
}

/// Exponential integral E1.
pub fn e1(x: f64) -> Result<f64> {
    if x == 0.0 {
        return Err(XrfError::Numerical("E1(0) is undefined".to_string()));
    }
    if x < 0.0 {
        // A&S 5.1.11, ten terms
        let mut result = -EULER_GAMMA;
        let mut term = 1.0;
        for n in 1..=10 {
            term *= -x / n as f64;
            result -= term / n as f64;
        }
        return Ok(result - (-x).ln());
    }
    if x < 1.0 {
        Ok(as_5_1_53(x) - x.ln())
    } else {
        Ok((-x).exp() * lentz_d(x, 1.0e-7))
    }
}

/// Generalized exponential integral En by upward recurrence.
pub fn en(n: u32, x: f64) -> Result<f64> {
    match n {
        0 => Err(XrfError::Numerical("En requires n >= 1".to_string())),
        1 => e1(x),
        _ if x == 0.0 => Ok(1.0 / (n - 1) as f64),
        _ => Ok(((-x).exp() - x * en(n - 1, x)?) / (n - 1) as f64),
    }
}

/// `exp(x) E1(x)`.
pub fn de_boer_d(x: f64) -> Result<f64> {
    if x < 0.0 {
        return Ok(x.exp() * e1(x)?);
    }
    if x == 0.0 {
        return Err(XrfError::Numerical("D(0) is undefined".to_string()));
    }
    let value = if x > 1.0 {
        lentz_d(x, 1.0e-7)
    } else {
        x.exp() * (as_5_1_53(x) - x.ln())
    };
    let lower = 0.5 * (1.0 + 2.0 / x).ln();
    let upper = (1.0 + 1.0 / x).ln();
    if (value < lower || value > upper) && x > 1.0 {
        log::debug!("de Boer D({x}) = {value} outside [{lower}, {upper}], refining");
        return Ok(lentz_d(x, 1.0e-5));
    }
    Ok(value)
}

/// Same-layer secondary excitation integral.
///
/// # Arguments
/// * `mu1` - Attenuation of the exciting beam along its path (cm²/g)
/// * `mu2` - Attenuation of the detected line along its path (cm²/g)
/// * `muj` - Attenuation of the exciting line (cm²/g)
/// * `density`, `thickness` - of the layer
pub fn de_boer_l0(mu1: f64, mu2: f64, muj: f64, density: f64, thickness: f64) -> Result<f64> {
    for (value, name) in [(mu1, "mu1"), (mu2, "mu2"), (muj, "muj")] {
        if !value.is_finite() || value <= 0.0 {
            return Err(XrfError::Numerical(format!(
                "de Boer L0: {name} must be finite and positive, got {value}"
            )));
        }
    }
    let d = thickness * density;
    let sum = mu1 + mu2;

    if sum * d > 10.0 {
        // thick target
        return check_finite(
            (muj / mu1) * (1.0 + mu1 / muj).ln() / (sum * muj),
            "de Boer L0 thick target",
        );
    }
    if sum * d < 0.01 {
        // enhancement negligible
        return Ok(0.0);
    }

    let mut value = de_boer_d((muj - mu2) * d)? / (mu2 * sum) - de_boer_d(muj * d)? / (mu1 * mu2)
        + de_boer_d((muj + mu1) * d)? / (mu1 * sum);
    value *= (-(mu1 + muj) * d).exp();
    value += (1.0 + mu1 / muj).ln() / (mu1 * sum);
    let log_term = if mu2 < muj {
        (1.0 - mu2 / muj).ln()
    } else {
        (mu2 / muj - 1.0).ln()
    };
    value += (-sum * d).exp() / (mu2 * sum) * log_term;

    if value < 0.0 {
        return Err(XrfError::Numerical(format!(
            "de Boer L0 negative ({value}) for mu1={mu1} mu2={mu2} muj={muj} d={d}"
        )));
    }
    check_finite(value, "de Boer L0")
}

/// de Boer V function of the inter-layer integral.
pub fn de_boer_v(
    p: f64,
    q: f64,
    d1: f64,
    d2: f64,
    mu1j: f64,
    mu2j: f64,
    mubj_dt: f64,
) -> Result<f64> {
    let denominator = p * mu1j + q * mu2j;
    if mubj_dt == 0.0 && d1 == 0.0 && d2 == 0.0 {
        let value = (mu2j / p) * (1.0 + p / mu2j).abs().ln() + (mu1j / q) * (1.0 - q / mu1j).abs().ln();
        return check_finite(-value / denominator, "de Boer V(0, 0)");
    }
    let h = mu1j * d1 + mubj_dt + mu2j * d2;
    let first = check_finite(
        mu2j / (p * denominator) * de_boer_d((1.0 + p / mu2j) * h)?,
        "de Boer V",
    )?;
    let second = check_finite(
        mu1j / (q * denominator) * de_boer_d((1.0 - q / mu1j) * h)? - de_boer_d(h)? / (p * q),
        "de Boer V",
    )?;
    check_finite(
        ((q - mu1j) * d1 - (p + mu2j) * d2 - mubj_dt).exp() * (first + second),
        "de Boer V",
    )
}

/// Inter-layer secondary excitation integral
/// `X = V(d1, d2) - V(d1, 0) - V(0, d2) + V(0, 0)`.
///
/// `d1`, `d2` are the mass thicknesses of the fluorescing and the exciting
/// layer and `mubj_dt` the attenuation of the layers in between.
pub fn de_boer_x(
    p: f64,
    q: f64,
    d1: f64,
    d2: f64,
    mu1j: f64,
    mu2j: f64,
    mubj_dt: f64,
) -> Result<f64> {
    Ok(de_boer_v(p, q, d1, d2, mu1j, mu2j, mubj_dt)?
        - de_boer_v(p, q, d1, 0.0, mu1j, mu2j, mubj_dt)?
        - de_boer_v(p, q, 0.0, d2, mu1j, mu2j, mubj_dt)?
        + de_boer_v(p, q, 0.0, 0.0, mu1j, mu2j, mubj_dt)?)
}
