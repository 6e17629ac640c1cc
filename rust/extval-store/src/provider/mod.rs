//! Immutable snapshots of an external file's values.
//!
//! A [`ValuesProvider`] is built once per refresh and never modified. The
//! representation is fixed at construction: one of the six in-memory
//! encodings picked by [`select_encoding`], or a memory-mapped trie hash
//! table file.

use std::{path::Path, time::SystemTime};

use extval_common::{Result, error::Error};

use crate::{
    parse::ParsedValues,
    select::{EncodingPlan, Scale, ValuesEncoding, select_encoding},
};

pub mod mapped;
pub mod memory;

pub use mapped::MappedValues;
pub use memory::MemoryValues;

/// The representation of a provider.
#[derive(Debug)]
pub enum ProviderValues {
    IntShort(MemoryValues<i32, i16>),
    IntInt(MemoryValues<i32, i32>),
    IntDouble(MemoryValues<i32, f64>),
    LongShort(MemoryValues<i64, i16>),
    LongInt(MemoryValues<i64, i32>),
    LongDouble(MemoryValues<i64, f64>),
    Mapped(MappedValues),
}

macro_rules! dispatch {
    ($values:expr, $v:ident => $body:expr) => {
        match $values {
            ProviderValues::IntShort($v) => $body,
            ProviderValues::IntInt($v) => $body,
            ProviderValues::IntDouble($v) => $body,
            ProviderValues::LongShort($v) => $body,
            ProviderValues::LongInt($v) => $body,
            ProviderValues::LongDouble($v) => $body,
            ProviderValues::Mapped($v) => $body,
        }
    };
}

impl ProviderValues {
    /// Encodes `parsed` according to `plan`, which must name an in-memory
    /// encoding.
    pub fn build(parsed: &ParsedValues, plan: &EncodingPlan) -> Result<ProviderValues> {
        let keys = &parsed.keys;
        let values = &parsed.values;
        let scale = || plan.scale.unwrap_or(Scale { factor: 1, base: 0 });
        Ok(match plan.encoding {
            ValuesEncoding::IntShort => {
                ProviderValues::IntShort(MemoryValues::build(keys, values, scale())?)
            }
            ValuesEncoding::IntInt => {
                ProviderValues::IntInt(MemoryValues::build(keys, values, scale())?)
            }
            ValuesEncoding::IntDouble => {
                ProviderValues::IntDouble(MemoryValues::build(keys, values, ())?)
            }
            ValuesEncoding::LongShort => {
                ProviderValues::LongShort(MemoryValues::build(keys, values, scale())?)
            }
            ValuesEncoding::LongInt => {
                ProviderValues::LongInt(MemoryValues::build(keys, values, scale())?)
            }
            ValuesEncoding::LongDouble => {
                ProviderValues::LongDouble(MemoryValues::build(keys, values, ())?)
            }
            ValuesEncoding::MappedFile => {
                return Err(Error::invalid_arg(
                    "plan",
                    "mapped values are opened from a trie hash table file, not built in memory",
                ));
            }
        })
    }

    #[inline]
    pub fn get(&self, key: i64) -> Option<f64> {
        dispatch!(self, v => v.get(key))
    }

    pub fn len(&self) -> usize {
        dispatch!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_bytes(&self) -> u64 {
        dispatch!(self, v => v.size_bytes())
    }

    pub fn encoding(&self) -> ValuesEncoding {
        match self {
            ProviderValues::IntShort(_) => ValuesEncoding::IntShort,
            ProviderValues::IntInt(_) => ValuesEncoding::IntInt,
            ProviderValues::IntDouble(_) => ValuesEncoding::IntDouble,
            ProviderValues::LongShort(_) => ValuesEncoding::LongShort,
            ProviderValues::LongInt(_) => ValuesEncoding::LongInt,
            ProviderValues::LongDouble(_) => ValuesEncoding::LongDouble,
            ProviderValues::Mapped(_) => ValuesEncoding::MappedFile,
        }
    }
}

/// One published generation of an external file's values.
#[derive(Debug)]
pub struct ValuesProvider {
    values: ProviderValues,
    last_modified: SystemTime,
}

impl ValuesProvider {
    pub fn new(values: ProviderValues, last_modified: SystemTime) -> ValuesProvider {
        ValuesProvider {
            values,
            last_modified,
        }
    }

    /// Builds an in-memory provider in the narrowest encoding that fits.
    pub fn in_memory(
        parsed: &ParsedValues,
        scaling_factor: Option<i64>,
        last_modified: SystemTime,
    ) -> Result<ValuesProvider> {
        let plan = select_encoding(parsed, scaling_factor);
        let values = ProviderValues::build(parsed, &plan)?;
        Ok(ValuesProvider::new(values, last_modified))
    }

    /// Maps a trie hash table file.
    pub fn mapped(path: &Path, last_modified: SystemTime) -> Result<ValuesProvider> {
        Ok(ValuesProvider::new(
            ProviderValues::Mapped(MappedValues::open(path)?),
            last_modified,
        ))
    }

    /// Returns the value stored for `key`, or `default` if there is none.
    #[inline]
    pub fn get(&self, key: i64, default: f64) -> f64 {
        self.values.get(key).unwrap_or(default)
    }

    #[inline]
    pub fn lookup(&self, key: i64) -> Option<f64> {
        self.values.get(key)
    }

    /// Approximate memory footprint. For a mapped file this is the file size,
    /// which is mostly not resident.
    pub fn size_bytes(&self) -> u64 {
        self.values.size_bytes()
    }

    /// Modification time of the source file this snapshot was built from.
    pub fn last_modified(&self) -> SystemTime {
        self.last_modified
    }

    pub fn encoding(&self) -> ValuesEncoding {
        self.values.encoding()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &ProviderValues {
        &self.values
    }
}
