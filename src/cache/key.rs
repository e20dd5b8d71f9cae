//! Key Module
//!
//! Blank-key detection used by the read paths.

/// Keys that can be "blank": empty or null-like values that never name an entry.
///
/// Reads with a blank key miss without consulting the store. Numeric keys are
/// never blank; zero is a perfectly good key.
pub trait BlankKey {
    fn is_blank(&self) -> bool;
}

impl BlankKey for str {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl BlankKey for String {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl<T> BlankKey for [T] {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl<T> BlankKey for Vec<T> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl<T: BlankKey> BlankKey for Option<T> {
    fn is_blank(&self) -> bool {
        self.as_ref().map_or(true, BlankKey::is_blank)
    }
}

impl<T: BlankKey + ?Sized> BlankKey for &T {
    fn is_blank(&self) -> bool {
        (**self).is_blank()
    }
}

macro_rules! never_blank {
    ($($ty:ty),* $(,)?) => {
        $(
            impl BlankKey for $ty {
                fn is_blank(&self) -> bool {
                    false
                }
            }
        )*
    };
}

never_blank!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, char);
