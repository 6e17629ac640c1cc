//! Choice of the in-memory representation of a parsed dataset.
//!
//! Keys are stored as `i32` when the whole key range fits, `i64` otherwise.
//! With a scaling factor `f`, values are quantized to `round(v * f)` and
//! stored as an offset from `floor(min * f)` in the narrowest integer that
//! holds the scaled span. Without a factor, or when the span does not fit
//! `i32`, values are kept as `f64`.

use serde::Serialize;

use crate::parse::ParsedValues;

/// The concrete layout of a values provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuesEncoding {
    /// `i32` keys, `i16` scaled offsets.
    IntShort,
    /// `i32` keys, `i32` scaled offsets.
    IntInt,
    /// `i32` keys, `f64` values.
    IntDouble,
    /// `i64` keys, `i16` scaled offsets.
    LongShort,
    /// `i64` keys, `i32` scaled offsets.
    LongInt,
    /// `i64` keys, `f64` values.
    LongDouble,
    /// Memory-mapped trie hash table file.
    MappedFile,
}

impl ValuesEncoding {
    pub fn name(self) -> &'static str {
        match self {
            ValuesEncoding::IntShort => "int_short",
            ValuesEncoding::IntInt => "int_int",
            ValuesEncoding::IntDouble => "int_double",
            ValuesEncoding::LongShort => "long_short",
            ValuesEncoding::LongInt => "long_int",
            ValuesEncoding::LongDouble => "long_double",
            ValuesEncoding::MappedFile => "mapped_file",
        }
    }

    /// Bytes taken by a single key/value entry. Zero for the mapped file,
    /// which is not resident.
    pub fn entry_size(self) -> usize {
        match self {
            ValuesEncoding::IntShort => 4 + 2,
            ValuesEncoding::IntInt => 4 + 4,
            ValuesEncoding::IntDouble => 4 + 8,
            ValuesEncoding::LongShort => 8 + 2,
            ValuesEncoding::LongInt => 8 + 4,
            ValuesEncoding::LongDouble => 8 + 8,
            ValuesEncoding::MappedFile => 0,
        }
    }

    pub fn is_scaled(self) -> bool {
        matches!(
            self,
            ValuesEncoding::IntShort
                | ValuesEncoding::IntInt
                | ValuesEncoding::LongShort
                | ValuesEncoding::LongInt
        )
    }
}

impl std::fmt::Display for ValuesEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Quantization of values into integer offsets: `v` is stored as
/// `round(v * factor) - base` and read back as `(offset + base) / factor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Scale {
    pub factor: i64,
    /// `floor(min_value * factor)`.
    pub base: i64,
}

impl Scale {
    /// Returns the offset stored for `value`, or `None` when the scaled value
    /// does not fit `i64`.
    #[inline]
    pub fn encode(&self, value: f64) -> Option<i64> {
        let scaled = (value * self.factor as f64).round();
        if !(scaled >= i64::MIN as f64 && scaled < i64::MAX as f64) {
            return None;
        }
        (scaled as i64).checked_sub(self.base)
    }

    #[inline]
    pub fn decode(&self, offset: i64) -> f64 {
        (offset as i128 + self.base as i128) as f64 / self.factor as f64
    }
}

/// The outcome of the selection: an encoding and, for the scaled encodings,
/// the quantization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodingPlan {
    pub encoding: ValuesEncoding,
    pub scale: Option<Scale>,
}

impl EncodingPlan {
    pub fn unscaled(encoding: ValuesEncoding) -> EncodingPlan {
        EncodingPlan {
            encoding,
            scale: None,
        }
    }
}

/// Picks the narrowest in-memory encoding able to hold `parsed`.
pub fn select_encoding(parsed: &ParsedValues, scaling_factor: Option<i64>) -> EncodingPlan {
    let Some(factor) = scaling_factor.filter(|&f| f > 0) else {
        return EncodingPlan::unscaled(ValuesEncoding::LongDouble);
    };
    if parsed.is_empty() {
        return EncodingPlan::unscaled(ValuesEncoding::LongDouble);
    }

    let int_keys = parsed.min_key >= i32::MIN as i64 && parsed.max_key < i32::MAX as i64;
    let (short, int, double) = if int_keys {
        (
            ValuesEncoding::IntShort,
            ValuesEncoding::IntInt,
            ValuesEncoding::IntDouble,
        )
    } else {
        (
            ValuesEncoding::LongShort,
            ValuesEncoding::LongInt,
            ValuesEncoding::LongDouble,
        )
    };

    // NaN and infinities have no scaled representation.
    if !parsed.values.iter().all(|v| v.is_finite()) {
        return EncodingPlan::unscaled(double);
    }
    let Some((base, span)) = scaled_span(parsed.min_value, parsed.max_value, factor) else {
        return EncodingPlan::unscaled(double);
    };

    // `round` may land one above `floor(max * factor)`, hence the strict
    // comparisons.
    let encoding = if span < i16::MAX as i128 {
        short
    } else if span < i32::MAX as i128 {
        int
    } else {
        return EncodingPlan::unscaled(double);
    };
    EncodingPlan {
        encoding,
        scale: Some(Scale { factor, base }),
    }
}

/// Returns `floor(min * factor)` and the span up to `floor(max * factor)`,
/// or `None` if either bound does not fit `i64`.
fn scaled_span(min: f64, max: f64, factor: i64) -> Option<(i64, i128)> {
    let scaled_min = (min * factor as f64).floor();
    let scaled_max = (max * factor as f64).floor();
    let fits = |v: f64| v >= i64::MIN as f64 && v < i64::MAX as f64;
    if !fits(scaled_min) || !fits(scaled_max) {
        return None;
    }
    let base = scaled_min as i64;
    Some((base, scaled_max as i64 as i128 - base as i128))
}
