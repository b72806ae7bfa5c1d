//! Native function binder - arbitrary Rust callables as runtime functions
//!
//! Design: a callable is stored type-erased in a userdata upvalue of one
//! shared trampoline. Arity and argument conversion are resolved at compile
//! time through `FromArgs`; the trampoline only sees `dyn Callback`.
//!
//! Argument order: left to right, absolute slots starting at 1.

pub(crate) mod boxed;

use mlua_sys as ffi;
use std::any::Any;
use std::ffi::c_int;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::config::ErrorPolicy;
use crate::error::{Error, Location, Result};
use crate::logging;
use crate::marshal::{FromLua, IntoLuaMulti};
use crate::stack::{upvalue, Stack};
use crate::variadic::Variadic;

/// One declared parameter of a bound function
pub trait FromArg: Sized {
    /// Script arguments consumed (0 for injected parameters like `Stack`)
    const SLOTS: i32;

    fn from_arg(stack: &Stack, index: i32) -> Result<Self>;
}

impl<T: FromLua> FromArg for T {
    const SLOTS: i32 = 1;

    #[inline]
    fn from_arg(stack: &Stack, index: i32) -> Result<Self> {
        T::from_lua(stack, index)
    }
}

/// The calling frame itself, for re-entering the runtime
impl FromArg for Stack {
    const SLOTS: i32 = 0;

    #[inline]
    fn from_arg(stack: &Stack, _index: i32) -> Result<Self> {
        Ok(stack.clone())
    }
}

/// The final declared parameter; only here may a `Variadic` appear
pub trait LastArg: Sized {
    const SLOTS: i32;
    const VARIADIC: bool;

    fn from_last(stack: &Stack, index: i32) -> Result<Self>;
}

impl<T: FromArg> LastArg for T {
    const SLOTS: i32 = T::SLOTS;
    const VARIADIC: bool = false;

    #[inline]
    fn from_last(stack: &Stack, index: i32) -> Result<Self> {
        T::from_arg(stack, index)
    }
}

impl LastArg for Variadic {
    const SLOTS: i32 = 0;
    const VARIADIC: bool = true;

    #[inline]
    fn from_last(stack: &Stack, index: i32) -> Result<Self> {
        Ok(Variadic::capture(stack, index))
    }
}

/// A full parameter list
pub trait FromArgs: Sized {
    /// Declared script arguments, excluding a trailing `Variadic`
    const ARITY: i32;
    const VARIADIC: bool;

    fn from_args(stack: &Stack, first: i32) -> Result<Self>;
}

impl FromArgs for () {
    const ARITY: i32 = 0;
    const VARIADIC: bool = false;

    #[inline]
    fn from_args(_stack: &Stack, _first: i32) -> Result<Self> {
        Ok(())
    }
}

macro_rules! impl_from_args {
    ($($head:ident)* ; $last:ident) => {
        impl<$($head: FromArg,)* $last: LastArg> FromArgs for ($($head,)* $last,) {
            const ARITY: i32 = 0 $(+ <$head as FromArg>::SLOTS)* + <$last as LastArg>::SLOTS;
            const VARIADIC: bool = <$last as LastArg>::VARIADIC;

            #[allow(non_snake_case, unused_mut)]
            #[inline]
            fn from_args(stack: &Stack, first: i32) -> Result<Self> {
                let mut index = first;
                $(
                    let $head = <$head as FromArg>::from_arg(stack, index)?;
                    index += <$head as FromArg>::SLOTS;
                )*
                let $last = <$last as LastArg>::from_last(stack, index)?;
                Ok(($($head,)* $last,))
            }
        }
    };
}

impl_from_args!(; A);
impl_from_args!(A; B);
impl_from_args!(A B; C);
impl_from_args!(A B C; D);
impl_from_args!(A B C D; E);
impl_from_args!(A B C D E; F);
impl_from_args!(A B C D E F; G);
impl_from_args!(A B C D E F G; H);

/// Rust callables bindable as runtime functions
///
/// `Args` is the parameter tuple; it only disambiguates the impls.
pub trait NativeFn<Args>: 'static {
    const ARITY: i32;
    const VARIADIC: bool;

    /// Read arguments from `first` on, call, push results
    fn invoke(&self, stack: &Stack, first: i32) -> Result<i32>;
}

macro_rules! impl_native_fn {
    ($($arg:ident)*) => {
        impl<Func, Ret, $($arg,)*> NativeFn<($($arg,)*)> for Func
        where
            Func: Fn($($arg),*) -> Ret + 'static,
            ($($arg,)*): FromArgs,
            Ret: IntoLuaMulti,
        {
            const ARITY: i32 = <($($arg,)*) as FromArgs>::ARITY;
            const VARIADIC: bool = <($($arg,)*) as FromArgs>::VARIADIC;

            #[allow(non_snake_case)]
            fn invoke(&self, stack: &Stack, first: i32) -> Result<i32> {
                let ($($arg,)*) = <($($arg,)*) as FromArgs>::from_args(stack, first)?;
                Ok((self)($($arg),*).push_multi(stack))
            }
        }
    };
}

impl_native_fn!();
impl_native_fn!(A);
impl_native_fn!(A B);
impl_native_fn!(A B C);
impl_native_fn!(A B C D);
impl_native_fn!(A B C D E);
impl_native_fn!(A B C D E F);
impl_native_fn!(A B C D E F G);
impl_native_fn!(A B C D E F G H);

/// Object-safe entry stored behind every bound function
pub(crate) trait Callback {
    fn dispatch(&self, stack: &Stack) -> Result<i32>;
}

pub(crate) struct Bound<F, Args> {
    name: Rc<str>,
    function: F,
    _args: PhantomData<fn(Args)>,
}

impl<F, Args> Bound<F, Args>
where
    F: NativeFn<Args>,
    Args: 'static,
{
    pub(crate) fn new(name: &str, function: F) -> Self {
        logging::log_function_bound(name, F::ARITY, F::VARIADIC);
        Self {
            name: Rc::from(name),
            function,
            _args: PhantomData,
        }
    }
}

impl<F, Args> Callback for Bound<F, Args>
where
    F: NativeFn<Args>,
    Args: 'static,
{
    fn dispatch(&self, stack: &Stack) -> Result<i32> {
        logging::log_native_call(&self.name, stack.top());
        check_arity(stack, 1, F::ARITY, F::VARIADIC)?;
        self.function.invoke(stack, 1)
    }
}

/// Enforce the declared arity when strict dispatch is configured
pub(crate) fn check_arity(stack: &Stack, first: i32, arity: i32, variadic: bool) -> Result<()> {
    if !stack.shared().config.dispatch.strict_arity {
        return Ok(());
    }

    let given = (stack.top() - first + 1).max(0);
    let matches = if variadic { given >= arity } else { given == arity };
    if matches {
        Ok(())
    } else {
        let expected = if variadic {
            format!("at least {}", arity)
        } else {
            arity.to_string()
        };
        Err(Error::ArgumentCount { expected, got: given })
    }
}

/// Push `function` as a runtime closure
pub(crate) fn push_function<F, Args>(stack: &Stack, name: &str, function: F) -> Result<()>
where
    F: NativeFn<Args>,
    Args: 'static,
{
    let callback: Rc<dyn Callback> = Rc::new(Bound::new(name, function));
    boxed::push(stack, callback)?;
    stack.push_closure(callback_trampoline, 1);
    Ok(())
}

pub(crate) unsafe extern "C-unwind" fn callback_trampoline(state: *mut ffi::lua_State) -> c_int {
    entry(state, |stack| {
        let callback = upvalue_ref::<Rc<dyn Callback>>(stack, 1)?.clone();
        callback.dispatch(stack)
    })
}

/// Fetch a value stored by `boxed::push` in upvalue `n` of the running closure
pub(crate) fn upvalue_ref<T: 'static>(stack: &Stack, n: i32) -> Result<&T> {
    unsafe { boxed::get::<T>(stack, upvalue(n)) }.ok_or(Error::Allocation("callback storage"))
}

enum Outcome {
    Return(c_int),
    Raise,
}

/// Common body of every native entry point
///
/// Runs `body`, converting panics into errors. Errors are reported and the
/// call returns no results, or, under the raise policy, become a script
/// error once every Rust value in this frame has been dropped.
///
/// # Safety
/// `state` must be a state of a live context entering native code.
pub(crate) unsafe fn entry(
    state: *mut ffi::lua_State,
    body: impl FnOnce(&Stack) -> Result<i32>,
) -> c_int {
    let outcome = match Stack::from_raw(state) {
        Some(stack) => {
            let result = panic::catch_unwind(AssertUnwindSafe(|| body(&stack)))
                .unwrap_or_else(|payload| Err(Error::CallbackPanic(panic_message(payload))));

            match result {
                Ok(results) => Outcome::Return(results),
                Err(err) => match stack.shared().config.dispatch.on_error {
                    ErrorPolicy::Report => {
                        stack.report(&err);
                        Outcome::Return(0)
                    }
                    ErrorPolicy::Raise => {
                        let message = Location::capture(state).annotate(&err.to_string());
                        stack.push_string(&message);
                        Outcome::Raise
                    }
                },
            }
        }
        None => Outcome::Return(0),
    };

    match outcome {
        Outcome::Return(results) => results,
        Outcome::Raise => ffi::lua_error(state),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
