use extval_common::{Result, error::Error, verify_arg};

use crate::select::Scale;

/// Key width of an in-memory provider.
pub trait KeyCell: Copy + Ord + Send + Sync + 'static {
    /// Narrows a lookup key, `None` if it does not fit.
    fn from_key(key: i64) -> Option<Self>;
}

impl KeyCell for i32 {
    #[inline]
    fn from_key(key: i64) -> Option<i32> {
        i32::try_from(key).ok()
    }
}

impl KeyCell for i64 {
    #[inline]
    fn from_key(key: i64) -> Option<i64> {
        Some(key)
    }
}

/// Value width of an in-memory provider together with the parameters needed
/// to map it back to `f64`.
pub trait ValueCell: Copy + Send + Sync + 'static {
    type Codec: Copy + Send + Sync + std::fmt::Debug;

    fn encode(value: f64, codec: &Self::Codec) -> Option<Self>;

    fn decode(self, codec: &Self::Codec) -> f64;
}

impl ValueCell for f64 {
    type Codec = ();

    #[inline]
    fn encode(value: f64, _: &()) -> Option<f64> {
        Some(value)
    }

    #[inline]
    fn decode(self, _: &()) -> f64 {
        self
    }
}

macro_rules! impl_scaled_value_cell {
    ($($t:ty),*) => {
        $(
            impl ValueCell for $t {
                type Codec = Scale;

                #[inline]
                fn encode(value: f64, scale: &Scale) -> Option<$t> {
                    scale.encode(value).and_then(|offset| <$t>::try_from(offset).ok())
                }

                #[inline]
                fn decode(self, scale: &Scale) -> f64 {
                    scale.decode(self as i64)
                }
            }
        )*
    };
}

impl_scaled_value_cell!(i16, i32);

/// Values held in process memory: keys sorted ascending, looked up by binary
/// search, with a parallel array of encoded values.
pub struct MemoryValues<K, V: ValueCell> {
    keys: Box<[K]>,
    values: Box<[V]>,
    codec: V::Codec,
}

impl<K: KeyCell, V: ValueCell> MemoryValues<K, V> {
    /// Encodes parallel `keys`/`values` arrays. Of several entries with the
    /// same key, the last one wins.
    ///
    /// # Errors
    /// Fails if the arrays differ in length or if a key or value does not fit
    /// the chosen widths.
    pub fn build(keys: &[i64], values: &[f64], codec: V::Codec) -> Result<MemoryValues<K, V>> {
        verify_arg!(values, keys.len() == values.len());

        let mut order = (0..keys.len()).collect::<Vec<_>>();
        // Stable, so equal keys keep their file order.
        order.sort_by_key(|&i| keys[i]);

        let mut out_keys = Vec::<K>::with_capacity(order.len());
        let mut out_values = Vec::<V>::with_capacity(order.len());
        for i in order {
            let key = K::from_key(keys[i]).ok_or_else(|| {
                Error::invalid_arg("keys", format!("key {} does not fit", keys[i]))
            })?;
            let value = V::encode(values[i], &codec).ok_or_else(|| {
                Error::invalid_arg("values", format!("value {} does not fit", values[i]))
            })?;
            if out_keys.last() == Some(&key) {
                if let Some(last) = out_values.last_mut() {
                    *last = value;
                }
            } else {
                out_keys.push(key);
                out_values.push(value);
            }
        }

        Ok(MemoryValues {
            keys: out_keys.into_boxed_slice(),
            values: out_values.into_boxed_slice(),
            codec,
        })
    }

    #[inline]
    pub fn get(&self, key: i64) -> Option<f64> {
        let key = K::from_key(key)?;
        let index = self.keys.binary_search(&key).ok()?;
        Some(self.values[index].decode(&self.codec))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn size_bytes(&self) -> u64 {
        (self.keys.len() * (std::mem::size_of::<K>() + std::mem::size_of::<V>())) as u64
    }
}

impl<K, V: ValueCell> std::fmt::Debug for MemoryValues<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryValues")
            .field("len", &self.keys.len())
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}
