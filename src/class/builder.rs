//! Class builder - typed registration of constructors, properties, methods
//!
//! Design: every accessor is checked against `T` when it is added and then
//! stored behind a small object-safe trait, so dispatch never reinterprets
//! a pointer.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

use super::instance::{self, push_owned};
use super::Class;
use crate::binder::{check_arity, Bound, Callback, FromArgs, NativeFn};
use crate::error::Result;
use crate::marshal::{FromLua, IntoLua, IntoLuaMulti};
use crate::stack::Stack;

/// Marker for methods taking `&T`
pub struct Ref;

/// Marker for methods taking `&mut T`
pub struct Mut;

/// Rust callables usable as a method of `T`
///
/// Implemented for `Fn(&T, A...) -> R` and `Fn(&mut T, A...) -> R`.
pub trait Method<T, Marker>: 'static {
    const ARITY: i32;
    const VARIADIC: bool;

    /// Slot 1 holds the instance, arguments start at slot 2
    fn call_method(&self, stack: &Stack) -> Result<i32>;
}

macro_rules! impl_method {
    ($($arg:ident)*) => {
        impl<T, Func, Ret, $($arg,)*> Method<T, (Ref, ($($arg,)*))> for Func
        where
            T: 'static,
            Func: Fn(&T, $($arg),*) -> Ret + 'static,
            ($($arg,)*): FromArgs,
            Ret: IntoLuaMulti,
        {
            const ARITY: i32 = <($($arg,)*) as FromArgs>::ARITY;
            const VARIADIC: bool = <($($arg,)*) as FromArgs>::VARIADIC;

            #[allow(non_snake_case)]
            fn call_method(&self, stack: &Stack) -> Result<i32> {
                let ($($arg,)*) = <($($arg,)*) as FromArgs>::from_args(stack, 2)?;
                let result = {
                    let target = instance::instance::<T>(stack, 1)?.borrow()?;
                    (self)(&*target, $($arg),*)
                };
                Ok(result.push_multi(stack))
            }
        }

        impl<T, Func, Ret, $($arg,)*> Method<T, (Mut, ($($arg,)*))> for Func
        where
            T: 'static,
            Func: Fn(&mut T, $($arg),*) -> Ret + 'static,
            ($($arg,)*): FromArgs,
            Ret: IntoLuaMulti,
        {
            const ARITY: i32 = <($($arg,)*) as FromArgs>::ARITY;
            const VARIADIC: bool = <($($arg,)*) as FromArgs>::VARIADIC;

            #[allow(non_snake_case)]
            fn call_method(&self, stack: &Stack) -> Result<i32> {
                let ($($arg,)*) = <($($arg,)*) as FromArgs>::from_args(stack, 2)?;
                let result = {
                    let mut target = instance::instance::<T>(stack, 1)?.borrow_mut()?;
                    (self)(&mut *target, $($arg),*)
                };
                Ok(result.push_multi(stack))
            }
        }
    };
}

impl_method!();
impl_method!(A);
impl_method!(A B);
impl_method!(A B C);
impl_method!(A B C D);
impl_method!(A B C D E);
impl_method!(A B C D E F);

/// Rust callables producing a new `T` from script arguments
pub trait Constructor<T, Args>: 'static {
    const ARITY: i32;
    const VARIADIC: bool;

    fn construct(&self, stack: &Stack, first: i32) -> Result<T>;
}

macro_rules! impl_constructor {
    ($($arg:ident)*) => {
        impl<T, Func, $($arg,)*> Constructor<T, ($($arg,)*)> for Func
        where
            T: 'static,
            Func: Fn($($arg),*) -> T + 'static,
            ($($arg,)*): FromArgs,
        {
            const ARITY: i32 = <($($arg,)*) as FromArgs>::ARITY;
            const VARIADIC: bool = <($($arg,)*) as FromArgs>::VARIADIC;

            #[allow(non_snake_case)]
            fn construct(&self, stack: &Stack, first: i32) -> Result<T> {
                let ($($arg,)*) = <($($arg,)*) as FromArgs>::from_args(stack, first)?;
                Ok((self)($($arg),*))
            }
        }
    };
}

impl_constructor!();
impl_constructor!(A);
impl_constructor!(A B);
impl_constructor!(A B C);
impl_constructor!(A B C D);
impl_constructor!(A B C D E);
impl_constructor!(A B C D E F);
impl_constructor!(A B C D E F G);
impl_constructor!(A B C D E F G H);

// ----------------------------------------------------------------------
// Erased accessors
// ----------------------------------------------------------------------

pub(crate) trait Getter {
    /// Push the property of the instance in slot 1
    fn get(&self, stack: &Stack) -> Result<i32>;
}

pub(crate) trait Setter {
    /// Assign the value in slot `value` to the instance in slot 1
    fn set(&self, stack: &Stack, value: i32) -> Result<()>;
}

pub(crate) trait MethodCall {
    fn call(&self, stack: &Stack) -> Result<i32>;
}

pub(crate) trait Construct {
    /// Build an instance from arguments starting at `first` and push it
    fn construct(&self, stack: &Stack, first: i32) -> Result<i32>;
}

struct GetterFn<T, V, G> {
    getter: G,
    _marker: PhantomData<fn(&T) -> V>,
}

impl<T, V, G> Getter for GetterFn<T, V, G>
where
    T: 'static,
    V: IntoLua,
    G: Fn(&T) -> V,
{
    fn get(&self, stack: &Stack) -> Result<i32> {
        let value = {
            let target = instance::instance::<T>(stack, 1)?.borrow()?;
            (self.getter)(&*target)
        };
        value.push_lua(stack);
        Ok(1)
    }
}

struct SetterFn<T, V, S> {
    setter: S,
    _marker: PhantomData<fn(&mut T, V)>,
}

impl<T, V, S> Setter for SetterFn<T, V, S>
where
    T: 'static,
    V: FromLua,
    S: Fn(&mut T, V),
{
    fn set(&self, stack: &Stack, value: i32) -> Result<()> {
        let value = V::from_lua(stack, value)?;
        let mut target = instance::instance::<T>(stack, 1)?.borrow_mut()?;
        (self.setter)(&mut *target, value);
        Ok(())
    }
}

struct MethodFn<T, M, F> {
    method: F,
    _marker: PhantomData<fn(&T, M)>,
}

impl<T, M, F> MethodCall for MethodFn<T, M, F>
where
    T: 'static,
    M: 'static,
    F: Method<T, M>,
{
    fn call(&self, stack: &Stack) -> Result<i32> {
        check_arity(stack, 2, F::ARITY, F::VARIADIC)?;
        self.method.call_method(stack)
    }
}

struct ConstructorFn<T, A, F> {
    constructor: F,
    _marker: PhantomData<fn(A) -> T>,
}

impl<T, A, F> Construct for ConstructorFn<T, A, F>
where
    T: 'static,
    A: 'static,
    F: Constructor<T, A>,
{
    fn construct(&self, stack: &Stack, first: i32) -> Result<i32> {
        check_arity(stack, first, F::ARITY, F::VARIADIC)?;
        let value = self.constructor.construct(stack, first)?;
        push_owned(stack, value);
        Ok(1)
    }
}

/// Read and write halves of one property
#[derive(Clone, Default)]
pub(crate) struct FieldAccessor {
    pub(crate) write: Option<Rc<dyn Setter>>,
    pub(crate) read: Option<Rc<dyn Getter>>,
}

/// Everything a class exposes, assembled before registration
///
/// ```ignore
/// ctx.register_class(
///     ClassBuilder::<Vec3>::new("vec3")
///         .constructor(|x: f32, y: f32, z: f32| Vec3 { x, y, z })
///         .property("x", |v: &mut Vec3, x: f32| v.x = x, |v: &Vec3| v.x)
///         .method("length", |v: &Vec3| v.length()),
/// );
/// ```
pub struct ClassBuilder<T> {
    pub(crate) name: String,
    pub(crate) constructor: Option<Rc<dyn Construct>>,
    pub(crate) fields: HashMap<String, FieldAccessor>,
    pub(crate) methods: Vec<(String, Rc<dyn MethodCall>)>,
    pub(crate) functions: Vec<(String, Rc<dyn Callback>)>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Class> ClassBuilder<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructor: None,
            fields: HashMap::new(),
            methods: Vec::new(),
            functions: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Script-side `create(...)` and `Class(...)`
    pub fn constructor<A, F>(mut self, constructor: F) -> Self
    where
        A: 'static,
        F: Constructor<T, A>,
    {
        self.constructor = Some(Rc::new(ConstructorFn {
            constructor,
            _marker: PhantomData,
        }));
        self
    }

    /// Readable and writable property; a later entry for `name` replaces this one
    pub fn property<V, W, S, G>(mut self, name: &str, setter: S, getter: G) -> Self
    where
        V: FromLua + 'static,
        W: IntoLua + 'static,
        S: Fn(&mut T, V) + 'static,
        G: Fn(&T) -> W + 'static,
    {
        self.fields.insert(
            name.to_string(),
            FieldAccessor {
                write: Some(setter_fn(setter)),
                read: Some(getter_fn(getter)),
            },
        );
        self
    }

    /// Read-only property
    pub fn getter<W, G>(mut self, name: &str, getter: G) -> Self
    where
        W: IntoLua + 'static,
        G: Fn(&T) -> W + 'static,
    {
        self.fields.entry(name.to_string()).or_default().read = Some(getter_fn(getter));
        self
    }

    /// Write-only property
    pub fn setter<V, S>(mut self, name: &str, setter: S) -> Self
    where
        V: FromLua + 'static,
        S: Fn(&mut T, V) + 'static,
    {
        self.fields.entry(name.to_string()).or_default().write = Some(setter_fn(setter));
        self
    }

    /// Instance method, called from scripts as `obj:name(...)`
    pub fn method<M, F>(mut self, name: &str, method: F) -> Self
    where
        M: 'static,
        F: Method<T, M>,
    {
        self.methods.push((
            name.to_string(),
            Rc::new(MethodFn {
                method,
                _marker: PhantomData,
            }),
        ));
        self
    }

    /// Class-level function, called from scripts as `Class.name(...)`
    pub fn function<A, F>(mut self, name: &str, function: F) -> Self
    where
        A: 'static,
        F: NativeFn<A>,
    {
        let qualified = format!("{}.{}", self.name, name);
        self.functions
            .push((name.to_string(), Rc::new(Bound::new(&qualified, function))));
        self
    }
}

fn getter_fn<T, W, G>(getter: G) -> Rc<dyn Getter>
where
    T: 'static,
    W: IntoLua + 'static,
    G: Fn(&T) -> W + 'static,
{
    Rc::new(GetterFn {
        getter,
        _marker: PhantomData,
    })
}

fn setter_fn<T, V, S>(setter: S) -> Rc<dyn Setter>
where
    T: 'static,
    V: FromLua + 'static,
    S: Fn(&mut T, V) + 'static,
{
    Rc::new(SetterFn {
        setter,
        _marker: PhantomData,
    })
}
