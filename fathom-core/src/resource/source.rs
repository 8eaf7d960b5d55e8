//! Source Values
//!
//! A resource fetches only while its source is "truthy". Only explicit
//! absence counts as falsy: `None`, `false` and `Value::Null`. Zero, empty
//! strings and `NaN` are ordinary sources.

use crate::deep::Value;

/// How a source value tells the resource whether it is ready to fetch.
pub trait ExplicitFalsy {
    /// What the fetcher receives.
    type Truthy;

    /// `None` if the value means "no source yet".
    fn into_truthy(self) -> Option<Self::Truthy>;
}

/// No source: always ready.
impl ExplicitFalsy for () {
    type Truthy = ();

    fn into_truthy(self) -> Option<()> {
        Some(())
    }
}

impl ExplicitFalsy for bool {
    type Truthy = bool;

    fn into_truthy(self) -> Option<bool> {
        self.then_some(true)
    }
}

impl<T> ExplicitFalsy for Option<T> {
    type Truthy = T;

    fn into_truthy(self) -> Option<T> {
        self
    }
}

impl ExplicitFalsy for Value {
    type Truthy = Value;

    fn into_truthy(self) -> Option<Value> {
        match self {
            Value::Null | Value::Bool(false) => None,
            other => Some(other),
        }
    }
}

macro_rules! always_truthy {
    ($($ty:ty),*) => {
        $(
            impl ExplicitFalsy for $ty {
                type Truthy = $ty;

                fn into_truthy(self) -> Option<$ty> {
                    Some(self)
                }
            }
        )*
    };
}

always_truthy!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64, char, String, &'static str);
