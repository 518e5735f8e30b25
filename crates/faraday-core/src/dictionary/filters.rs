//! Orthonormal wavelet filter banks.
//!
//! Only the decomposition low-pass filter is tabulated; the high-pass filter
//! follows from the quadrature-mirror relation $g_i = (-1)^i h_{L-1-i}$.
//! Coefficients use the usual convention $\sum_i h_i = \sqrt{2}$.

use crate::error::{FaradayError, Result};

const HAAR: [f64; 2] = [0.7071067811865476, 0.7071067811865476];

const DB2: [f64; 4] = [
    -0.12940952255092145,
    0.22414386804185735,
    0.836516303737469,
    0.48296291314469025,
];

const DB3: [f64; 6] = [
    0.035226291882100656,
    -0.08544127388224149,
    -0.13501102001039084,
    0.4598775021193313,
    0.8068915093133388,
    0.3326705529509569,
];

const DB4: [f64; 8] = [
    -0.010597401784997278,
    0.032883011666982945,
    0.030841381835986965,
    -0.18703481171888114,
    -0.02798376941698385,
    0.6308807679295904,
    0.7148465705525415,
    0.23037781330885523,
];

const SYM4: [f64; 8] = [
    -0.07576571478927333,
    -0.02963552764599851,
    0.49761866763201545,
    0.8037387518059161,
    0.29785779560527736,
    -0.09921954357684722,
    -0.012603967262037833,
    0.0322231006040427,
];

const COIF1: [f64; 6] = [
    -0.015655728135791993,
    -0.07273261951252645,
    0.3848648468648578,
    0.8525720202116004,
    0.3378976624574818,
    -0.07273261951252645,
];

const COIF2: [f64; 12] = [
    -0.0007205494453679795,
    -0.0018232088709110323,
    0.005611434819368834,
    0.02368017194684777,
    -0.05943441864643109,
    -0.07648859907828076,
    0.4170051844232391,
    0.8127236354494135,
    0.38611006682276227,
    -0.0673725547237256,
    -0.04146493678687178,
    0.016387336463203123,
];

/// Names accepted by [`Wavelet::from_name`].
pub const AVAILABLE: &[&str] = &["haar", "db1", "db2", "db3", "db4", "sym4", "coif1", "coif2"];

/// Prefixes of continuous wavelet families, which have no filter bank.
const CONTINUOUS: &[&str] = &["morl", "mexh", "gaus", "cmor", "shan", "fbsp", "cgau"];

/// An orthonormal two-channel filter bank.
#[derive(Debug, Clone, PartialEq)]
pub struct Wavelet {
    name: String,
    dec_lo: Vec<f64>,
    dec_hi: Vec<f64>,
}

impl Wavelet {
    /// Look up a wavelet by name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self> {
        let key = name.trim().to_ascii_lowercase();
        let lo: &[f64] = match key.as_str() {
            "haar" | "db1" => &HAAR,
            "db2" => &DB2,
            "db3" => &DB3,
            "db4" => &DB4,
            "sym4" => &SYM4,
            "coif1" => &COIF1,
            "coif2" => &COIF2,
            _ if is_continuous(&key) => {
                return Err(FaradayError::config(format!(
                    "continuous wavelets unsupported: '{}'",
                    name
                )))
            }
            _ => {
                return Err(FaradayError::config(format!(
                    "unknown wavelet '{}' (available: {})",
                    name,
                    AVAILABLE.join(", ")
                )))
            }
        };
        let len = lo.len();
        let dec_hi = (0..len)
            .map(|i| if i % 2 == 0 { lo[len - 1 - i] } else { -lo[len - 1 - i] })
            .collect();
        Ok(Self { name: key, dec_lo: lo.to_vec(), dec_hi })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dec_lo(&self) -> &[f64] {
        &self.dec_lo
    }

    pub fn dec_hi(&self) -> &[f64] {
        &self.dec_hi
    }

    /// Filter length L.
    pub fn len(&self) -> usize {
        self.dec_lo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dec_lo.is_empty()
    }

    /// Deepest level whose filter still fits the signal: `floor(log2(len / (L - 1)))`.
    pub fn max_level(&self, len: usize) -> usize {
        let span = self.len().saturating_sub(1).max(1);
        if len < span {
            return 0;
        }
        (len / span).ilog2() as usize
    }
}

/// Whether `name` belongs to a continuous wavelet family.
pub fn is_continuous(name: &str) -> bool {
    let key = name.trim().to_ascii_lowercase();
    CONTINUOUS.iter().any(|p| key.starts_with(p))
}
