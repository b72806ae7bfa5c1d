//! Callable handle - a script function kept alive by a registry reference

use std::ffi::c_int;
use std::fmt;
use std::rc::Rc;

use crate::context::Shared;
use crate::error::{Error, Result};
use crate::marshal::{FromLua, FromLuaMulti, IntoLua, IntoLuaMulti};
use crate::stack::{Kind, Stack};

/// Move-only handle to a script function
///
/// `Default` is the empty handle. Moving out with [`Function::take`] or
/// `std::mem::take` leaves the source empty; dropping a bound handle releases
/// its reference exactly once.
#[derive(Default)]
pub struct Function {
    inner: Option<Reference>,
}

struct Reference {
    shared: Rc<Shared>,
    key: c_int,
}

impl Drop for Reference {
    fn drop(&mut self) {
        // Closing the runtime already released every reference
        if !self.shared.is_closed() {
            Stack::main(&self.shared).release_reference(self.key);
        }
    }
}

impl Function {
    /// Whether the handle holds a reference
    pub fn is_valid(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|reference| !reference.shared.is_closed())
    }

    /// Move the reference out, leaving this handle empty
    pub fn take(&mut self) -> Function {
        std::mem::take(self)
    }

    /// Protected call with typed arguments and results
    ///
    /// Failures are reported through the context's error hook and returned.
    pub fn call<R: FromLuaMulti>(&self, args: impl IntoLuaMulti) -> Result<R> {
        let Some(reference) = &self.inner else {
            tracing::warn!("Call through an empty function handle");
            return Err(Error::InvalidHandle);
        };
        if reference.shared.is_closed() {
            return Err(Error::ContextClosed);
        }

        let stack = Stack::main(&reference.shared);
        let _guard = stack.guard();
        stack.push_reference(reference.key);
        let nargs = args.push_multi(&stack);
        stack.call_protected(nargs, R::COUNT)?;
        stack.read_results()
    }

    fn push_to(&self, stack: &Stack) {
        match &self.inner {
            Some(reference) if !reference.shared.is_closed() => {
                stack.push_reference(reference.key);
            }
            _ => stack.push_nil(),
        }
    }
}

impl FromLua for Function {
    fn from_lua(stack: &Stack, index: i32) -> Result<Self> {
        stack.expect(index, Kind::Function)?;
        stack.push_value(index);
        let key = stack.reference()?;
        Ok(Function {
            inner: Some(Reference {
                shared: stack.shared_rc().clone(),
                key,
            }),
        })
    }
}

impl IntoLua for &Function {
    fn push_lua(self, stack: &Stack) {
        self.push_to(stack);
    }
}

impl IntoLua for Function {
    fn push_lua(self, stack: &Stack) {
        self.push_to(stack);
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(reference) => write!(f, "Function(ref {})", reference.key),
            None => write!(f, "Function(empty)"),
        }
    }
}
