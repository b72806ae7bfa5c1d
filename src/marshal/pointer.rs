use std::any::TypeId;
use std::ptr::{self, NonNull};

use super::{FromLua, IntoLua};
use crate::class::instance;
use crate::error::{Error, Result};
use crate::stack::{Kind, Stack};

/// Light userdata, unless `T` is a registered class
///
/// A registered pointee is pushed as a borrowed instance: it dispatches like
/// any instance but its finalizer leaves the native object alone.
impl<T: 'static> IntoLua for *mut T {
    fn push_lua(self, stack: &Stack) {
        let Some(target) = NonNull::new(self) else {
            stack.push_nil();
            return;
        };

        let registered = stack.shared().classes.borrow().contains(TypeId::of::<T>());
        if registered {
            instance::push_borrowed(stack, target);
        } else {
            stack.push_userdata(self.cast());
        }
    }
}

impl<T: 'static> IntoLua for *const T {
    fn push_lua(self, stack: &Stack) {
        self.cast_mut().push_lua(stack);
    }
}

/// `nil` reads as null; light userdata is taken at its word
impl<T: 'static> FromLua for *mut T {
    fn from_lua(stack: &Stack, index: i32) -> Result<Self> {
        match stack.kind(index) {
            Kind::Nil | Kind::None => Ok(ptr::null_mut()),
            Kind::LightUserdata => Ok(stack.to_userdata(index)?.cast()),
            Kind::Userdata => instance::instance::<T>(stack, index)?.as_ptr(),
            other => Err(Error::mismatch("userdata", other.name())),
        }
    }
}

impl<T: 'static> FromLua for *const T {
    fn from_lua(stack: &Stack, index: i32) -> Result<Self> {
        <*mut T>::from_lua(stack, index).map(|ptr| ptr.cast_const())
    }
}
