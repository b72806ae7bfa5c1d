use super::{FromLua, IntoLua};
use crate::error::Result;
use crate::stack::Stack;

/// Values pushed as zero or more slots (arguments and results)
pub trait IntoLuaMulti {
    /// Push every element in order, returning how many slots were pushed
    fn push_multi(self, stack: &Stack) -> i32;
}

/// Fixed-size packs read from consecutive slots
pub trait FromLuaMulti: Sized {
    const COUNT: i32;

    /// Read `COUNT` slots starting at `first`, in declaration order
    fn from_stack(stack: &Stack, first: i32) -> Result<Self>;
}

impl IntoLuaMulti for () {
    #[inline]
    fn push_multi(self, _stack: &Stack) -> i32 {
        0
    }
}

impl<T: IntoLua> IntoLuaMulti for T {
    #[inline]
    fn push_multi(self, stack: &Stack) -> i32 {
        self.push_lua(stack);
        1
    }
}

impl FromLuaMulti for () {
    const COUNT: i32 = 0;

    #[inline]
    fn from_stack(_stack: &Stack, _first: i32) -> Result<Self> {
        Ok(())
    }
}

impl<T: FromLua> FromLuaMulti for T {
    const COUNT: i32 = 1;

    #[inline]
    fn from_stack(stack: &Stack, first: i32) -> Result<Self> {
        T::from_lua(stack, first)
    }
}

macro_rules! count {
    () => { 0 };
    ($head:ident $($tail:ident)*) => { 1 + count!($($tail)*) };
}

macro_rules! impl_tuple {
    ($($name:ident)+) => {
        impl<$($name: IntoLua),+> IntoLuaMulti for ($($name,)+) {
            #[allow(non_snake_case)]
            fn push_multi(self, stack: &Stack) -> i32 {
                let ($($name,)+) = self;
                stack.reserve(count!($($name)+));
                $( $name.push_lua(stack); )+
                count!($($name)+)
            }
        }

        impl<$($name: FromLua),+> FromLuaMulti for ($($name,)+) {
            const COUNT: i32 = count!($($name)+);

            #[allow(non_snake_case, unused_assignments)]
            fn from_stack(stack: &Stack, first: i32) -> Result<Self> {
                let mut index = first;
                $(
                    let $name = $name::from_lua(stack, index)?;
                    index += 1;
                )+
                Ok(($($name,)+))
            }
        }
    };
}

impl_tuple!(A);
impl_tuple!(A B);
impl_tuple!(A B C);
impl_tuple!(A B C D);
impl_tuple!(A B C D E);
impl_tuple!(A B C D E F);
impl_tuple!(A B C D E F G);
impl_tuple!(A B C D E F G H);
