//! Metamethods and entry points installed for every class

use mlua_sys as ffi;
use std::any::TypeId;
use std::ffi::c_int;
use std::rc::Rc;

use super::builder::{Construct, FieldAccessor, MethodCall};
use crate::binder::{entry, upvalue_ref};
use crate::error::{Error, Result};
use crate::stack::{upvalue, Kind, Stack};

/// Class name and the accessor registered for `key`, if any
fn lookup<T: 'static>(stack: &Stack, key: &str) -> Result<(Rc<str>, Option<FieldAccessor>)> {
    let classes = stack.shared().classes.borrow();
    let descriptor = classes
        .get(TypeId::of::<T>())
        .ok_or(Error::ClassNotRegistered {
            type_name: std::any::type_name::<T>(),
        })?;
    Ok((descriptor.name.clone(), descriptor.fields.get(key).cloned()))
}

/// `__index(instance, key)`: methods first, then property getters
pub(crate) unsafe extern "C-unwind" fn index<T: 'static>(state: *mut ffi::lua_State) -> c_int {
    entry(state, |stack| {
        stack.push_value(2);
        if stack.raw_get(upvalue(1)) != Kind::Nil {
            return Ok(1);
        }
        stack.pop(1);

        let Some(key) = stack.string_at(2) else {
            stack.push_nil();
            return Ok(1);
        };

        match lookup::<T>(stack, &key)? {
            (_, Some(FieldAccessor { read: Some(getter), .. })) => getter.get(stack),
            (class, Some(_)) => Err(Error::WriteOnly {
                class: class.to_string(),
                field: key,
            }),
            (_, None) => {
                stack.push_nil();
                Ok(1)
            }
        }
    })
}

/// `__newindex(instance, key, value)`: property setters only
pub(crate) unsafe extern "C-unwind" fn newindex<T: 'static>(state: *mut ffi::lua_State) -> c_int {
    entry(state, |stack| {
        let key = stack.to_string(2)?;
        match lookup::<T>(stack, &key)? {
            (_, Some(FieldAccessor { write: Some(setter), .. })) => {
                setter.set(stack, 3)?;
                Ok(0)
            }
            (class, Some(_)) => Err(Error::ReadOnly {
                class: class.to_string(),
                field: key,
            }),
            (class, None) => Err(Error::UnknownMember {
                class: class.to_string(),
                member: key,
            }),
        }
    })
}

/// `__tostring(instance)`: `<class>: 0x<address>`
pub(crate) unsafe extern "C-unwind" fn tostring<T: 'static>(state: *mut ffi::lua_State) -> c_int {
    entry(state, |stack| {
        let address = stack.to_userdata(1)?;
        let name = stack
            .shared()
            .classes
            .borrow()
            .get(TypeId::of::<T>())
            .map(|descriptor| descriptor.name.to_string())
            .unwrap_or_else(|| std::any::type_name::<T>().to_string());
        stack.push_string(&format!("{}: {:p}", name, address));
        Ok(1)
    })
}

/// Bound instance method; slot 1 is the receiver
pub(crate) unsafe extern "C-unwind" fn method(state: *mut ffi::lua_State) -> c_int {
    entry(state, |stack| {
        let method = upvalue_ref::<Rc<dyn MethodCall>>(stack, 1)?.clone();
        method.call(stack)
    })
}

/// `Class.create(...)`
pub(crate) unsafe extern "C-unwind" fn create(state: *mut ffi::lua_State) -> c_int {
    entry(state, |stack| {
        let constructor = upvalue_ref::<Rc<dyn Construct>>(stack, 1)?.clone();
        constructor.construct(stack, 1)
    })
}

/// `Class(...)` through the class table's `__call`; slot 1 is the class table
pub(crate) unsafe extern "C-unwind" fn call(state: *mut ffi::lua_State) -> c_int {
    entry(state, |stack| {
        let constructor = upvalue_ref::<Rc<dyn Construct>>(stack, 1)?.clone();
        constructor.construct(stack, 2)
    })
}
