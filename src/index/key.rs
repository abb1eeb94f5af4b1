use std::cmp::Ordering;
use std::fmt;

/// Fixed-width index key. The width is a compile-time parameter; the standard
/// widths are instantiated as the Key4..Key64 aliases below. Ordering is not
/// intrinsic to the bytes - it is supplied by a KeyComparator.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct GenericKey<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    pub fn zeroed() -> Self {
        Self { data: [0u8; N] }
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        assert!(bytes.len() <= N, "key wider than {} bytes", N);
        let mut data = [0u8; N];
        data[..bytes.len()].copy_from_slice(bytes);
        Self { data }
    }

    /// Encodes an integer into the key, truncating to the key width for
    /// widths below 8 bytes.
    pub fn from_integer(value: i64) -> Self {
        let mut data = [0u8; N];
        let bytes = value.to_le_bytes();
        let take = N.min(8);
        data[..take].copy_from_slice(&bytes[..take]);
        Self { data }
    }

    /// Decodes the integer written by from_integer.
    pub fn to_integer(&self) -> i64 {
        if N >= 8 {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&self.data[..8]);
            i64::from_le_bytes(bytes)
        } else {
            let mut bytes = [0u8; 4];
            bytes[..N.min(4)].copy_from_slice(&self.data[..N.min(4)]);
            i32::from_le_bytes(bytes) as i64
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl<const N: usize> fmt::Debug for GenericKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenericKey<{N}>({})", self.to_integer())
    }
}

pub type Key4 = GenericKey<4>;
pub type Key8 = GenericKey<8>;
pub type Key16 = GenericKey<16>;
pub type Key32 = GenericKey<32>;
pub type Key64 = GenericKey<64>;

pub trait KeyComparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Compares keys as little-endian signed integers: 8 bytes when the key is
/// wide enough, 4 otherwise.
#[derive(Default, Clone, Copy)]
pub struct IntegerComparator;

impl KeyComparator for IntegerComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        if a.len() >= 8 && b.len() >= 8 {
            let a_val = i64::from_le_bytes(a[..8].try_into().expect("checked length"));
            let b_val = i64::from_le_bytes(b[..8].try_into().expect("checked length"));
            a_val.cmp(&b_val)
        } else if a.len() >= 4 && b.len() >= 4 {
            let a_val = i32::from_le_bytes(a[..4].try_into().expect("checked length"));
            let b_val = i32::from_le_bytes(b[..4].try_into().expect("checked length"));
            a_val.cmp(&b_val)
        } else {
            a.cmp(b)
        }
    }
}

#[derive(Default, Clone, Copy)]
pub struct BytewiseComparator;

impl KeyComparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}
