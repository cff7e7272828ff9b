//! Fixed-width encoding for keys and records.
//!
//! Every key and record occupies the same number of bytes inside a node,
//! which is what lets the fan-out be computed up front.

/// A value with a fixed-size binary encoding.
///
/// `encode_into` writes exactly `SIZE` bytes at the start of `buf`, and
/// `decode` reads them back. Ordering of keys is the `Ord` of the decoded
/// value, never of the raw bytes.
pub trait FixedSize: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Write the encoding into the first `SIZE` bytes of `buf`.
    fn encode_into(&self, buf: &mut [u8]);

    /// Read a value from the first `SIZE` bytes of `buf`.
    fn decode(buf: &[u8]) -> Self;
}

macro_rules! impl_fixed_size_int {
    ($($ty:ty),*) => {
        $(
            impl FixedSize for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn encode_into(&self, buf: &mut [u8]) {
                    buf[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                fn decode(buf: &[u8]) -> Self {
                    let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                    bytes.copy_from_slice(&buf[..Self::SIZE]);
                    Self::from_le_bytes(bytes)
                }
            }
        )*
    };
}

impl_fixed_size_int!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128);

impl<const N: usize> FixedSize for [u8; N] {
    const SIZE: usize = N;

    fn encode_into(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(self);
    }

    fn decode(buf: &[u8]) -> Self {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&buf[..N]);
        bytes
    }
}

/// Zero-sized records turn the tree into an ordered set.
impl FixedSize for () {
    const SIZE: usize = 0;

    fn encode_into(&self, _buf: &mut [u8]) {}

    fn decode(_buf: &[u8]) -> Self {}
}

/// Composite keys compare field by field.
impl<A: FixedSize, B: FixedSize> FixedSize for (A, B) {
    const SIZE: usize = A::SIZE + B::SIZE;

    fn encode_into(&self, buf: &mut [u8]) {
        self.0.encode_into(&mut buf[..A::SIZE]);
        self.1.encode_into(&mut buf[A::SIZE..Self::SIZE]);
    }

    fn decode(buf: &[u8]) -> Self {
        (A::decode(&buf[..A::SIZE]), B::decode(&buf[A::SIZE..Self::SIZE]))
    }
}
