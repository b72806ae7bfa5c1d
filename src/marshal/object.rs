use super::{FromLua, IntoLua};
use crate::class::{instance, Class};
use crate::error::Result;
use crate::stack::Stack;

/// Owned values of a registered class become runtime-owned instances
impl<T: Class> IntoLua for T {
    fn push_lua(self, stack: &Stack) {
        instance::push_owned(stack, self);
    }
}

/// Reading a class by value copies it out of the instance block
impl<T: Class + Clone> FromLua for T {
    fn from_lua(stack: &Stack, index: i32) -> Result<Self> {
        let instance = instance::instance::<T>(stack, index)?;
        let value = instance.borrow()?;
        Ok(T::clone(&value))
    }
}
