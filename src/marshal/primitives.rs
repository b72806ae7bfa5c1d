use super::{FromLua, IntoLua};
use crate::error::{Error, Result};
use crate::stack::Stack;

macro_rules! impl_integer {
    ($($ty:ty),* $(,)?) => {$(
        impl IntoLua for $ty {
            #[inline]
            fn push_lua(self, stack: &Stack) {
                stack.push_int(self as i64);
            }
        }

        impl FromLua for $ty {
            #[inline]
            fn from_lua(stack: &Stack, index: i32) -> Result<Self> {
                let value = stack.to_int(index)?;
                <$ty>::try_from(value).map_err(|_| Error::OutOfRange {
                    value,
                    target: stringify!($ty),
                })
            }
        }
    )*};
}

impl_integer!(i8, i16, i32, i64, isize, u8, u16, u32);

/// Runtime integers are 64-bit two's complement, so `u64` travels as its bit
/// pattern: values past `i64::MAX` appear negative to scripts (`math.ult`
/// compares them unsigned) and read back unchanged.
impl IntoLua for u64 {
    #[inline]
    fn push_lua(self, stack: &Stack) {
        stack.push_int(self as i64);
    }
}

impl FromLua for u64 {
    #[inline]
    fn from_lua(stack: &Stack, index: i32) -> Result<Self> {
        stack.to_int(index).map(|bits| bits as u64)
    }
}

impl IntoLua for usize {
    #[inline]
    fn push_lua(self, stack: &Stack) {
        (self as u64).push_lua(stack);
    }
}

impl FromLua for usize {
    #[inline]
    fn from_lua(stack: &Stack, index: i32) -> Result<Self> {
        let bits = u64::from_lua(stack, index)?;
        usize::try_from(bits).map_err(|_| Error::OutOfRange {
            value: bits as i64,
            target: "usize",
        })
    }
}

impl IntoLua for f64 {
    #[inline]
    fn push_lua(self, stack: &Stack) {
        stack.push_number(self);
    }
}

impl FromLua for f64 {
    #[inline]
    fn from_lua(stack: &Stack, index: i32) -> Result<Self> {
        stack.to_number(index)
    }
}

impl IntoLua for f32 {
    #[inline]
    fn push_lua(self, stack: &Stack) {
        stack.push_number(self as f64);
    }
}

impl FromLua for f32 {
    #[inline]
    fn from_lua(stack: &Stack, index: i32) -> Result<Self> {
        stack.to_number(index).map(|value| value as f32)
    }
}

impl IntoLua for bool {
    #[inline]
    fn push_lua(self, stack: &Stack) {
        stack.push_bool(self);
    }
}

impl FromLua for bool {
    #[inline]
    fn from_lua(stack: &Stack, index: i32) -> Result<Self> {
        stack.to_bool(index)
    }
}

impl IntoLua for &str {
    fn push_lua(self, stack: &Stack) {
        stack.push_string(self);
    }
}

impl IntoLua for String {
    fn push_lua(self, stack: &Stack) {
        stack.push_string(&self);
    }
}

impl IntoLua for &String {
    fn push_lua(self, stack: &Stack) {
        stack.push_string(self);
    }
}

impl IntoLua for &[u8] {
    fn push_lua(self, stack: &Stack) {
        stack.push_bytes(self);
    }
}

/// Runtime string taken as raw bytes
///
/// `String` only accepts UTF-8; binary payloads cross as `Bytes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes(bytes)
    }
}

impl IntoLua for Bytes {
    fn push_lua(self, stack: &Stack) {
        stack.push_bytes(&self.0);
    }
}

impl FromLua for Bytes {
    fn from_lua(stack: &Stack, index: i32) -> Result<Self> {
        stack.to_bytes(index).map(Bytes)
    }
}

impl FromLua for String {
    fn from_lua(stack: &Stack, index: i32) -> Result<Self> {
        stack.to_string(index)
    }
}

impl<T: IntoLua> IntoLua for Option<T> {
    fn push_lua(self, stack: &Stack) {
        match self {
            Some(value) => value.push_lua(stack),
            None => stack.push_nil(),
        }
    }
}

impl<T: FromLua> FromLua for Option<T> {
    fn from_lua(stack: &Stack, index: i32) -> Result<Self> {
        if stack.kind(index).is_none_or_nil() {
            Ok(None)
        } else {
            T::from_lua(stack, index).map(Some)
        }
    }
}
