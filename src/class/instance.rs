//! Instance blocks - native values living inside runtime userdata

use mlua_sys as ffi;
use std::alloc::Layout;
use std::any::{type_name, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::ffi::c_int;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::{self, NonNull};

use crate::error::{Error, Result};
use crate::logging;
use crate::stack::{userdata_block, Kind, Stack};

pub(crate) enum Slot<T> {
    /// Value owned by the runtime, dropped by the finalizer
    Owned(T),
    /// Native object pushed by pointer; ownership stays native
    Borrowed(NonNull<T>),
    /// Finalized
    Vacant,
}

pub(crate) struct Instance<T> {
    slot: RefCell<Slot<T>>,
}

impl<T: 'static> Instance<T> {
    pub(crate) fn borrow(&self) -> Result<Ref<'_, T>> {
        let slot = self.slot.try_borrow().map_err(|_| Error::InstanceBorrowed {
            class: type_name::<T>().to_string(),
        })?;

        Ref::filter_map(slot, |slot| match slot {
            Slot::Owned(value) => Some(value),
            Slot::Borrowed(target) => Some(unsafe { target.as_ref() }),
            Slot::Vacant => None,
        })
        .map_err(|_| invalid::<T>())
    }

    pub(crate) fn borrow_mut(&self) -> Result<RefMut<'_, T>> {
        let slot = self.slot.try_borrow_mut().map_err(|_| Error::InstanceBorrowed {
            class: type_name::<T>().to_string(),
        })?;

        RefMut::filter_map(slot, |slot| match slot {
            Slot::Owned(value) => Some(value),
            Slot::Borrowed(target) => Some(unsafe { target.as_mut() }),
            Slot::Vacant => None,
        })
        .map_err(|_| invalid::<T>())
    }

    /// Address of the native value
    pub(crate) fn as_ptr(&self) -> Result<*mut T> {
        let mut value = self.borrow_mut()?;
        Ok(&mut *value as *mut T)
    }

    /// Drop the native value if owned; false if there was nothing to release
    fn release(&self) -> bool {
        let Ok(mut slot) = self.slot.try_borrow_mut() else {
            return false;
        };
        let previous = mem::replace(&mut *slot, Slot::Vacant);
        drop(slot);
        !matches!(previous, Slot::Vacant)
    }
}

fn invalid<T>() -> Error {
    Error::InvalidInstance {
        class: type_name::<T>().to_string(),
    }
}

pub(crate) fn push_owned<T: 'static>(stack: &Stack, value: T) {
    push_slot(stack, Slot::Owned(value));
}

pub(crate) fn push_borrowed<T: 'static>(stack: &Stack, target: NonNull<T>) {
    push_slot(stack, Slot::Borrowed(target));
}

/// Allocate an instance block and attach the class metatable; nil if `T` is
/// not registered
fn push_slot<T: 'static>(stack: &Stack, slot: Slot<T>) {
    let metatable = stack.shared().classes.borrow().metatable(TypeId::of::<T>());
    let Some(metatable) = metatable else {
        stack.report(&Error::ClassNotRegistered {
            type_name: type_name::<T>(),
        });
        stack.push_nil();
        return;
    };

    let borrowed = matches!(slot, Slot::Borrowed(_));
    stack.reserve(2);
    let block = match stack.new_userdata(Layout::new::<Instance<T>>()) {
        Ok(block) => block,
        Err(err) => {
            stack.report(&err);
            return;
        }
    };
    unsafe {
        ptr::write(
            block.cast::<Instance<T>>().as_ptr(),
            Instance {
                slot: RefCell::new(slot),
            },
        )
    };
    stack.push_reference(metatable);
    stack.set_metatable(-2);
    logging::log_instance_created(type_name::<T>(), borrowed);
}

/// The `T` instance at `index`
///
/// The userdata must carry `T`'s class metatable; anything else is a
/// mismatch, so a block is never reinterpreted as another type.
pub(crate) fn instance<T: 'static>(stack: &Stack, index: i32) -> Result<&Instance<T>> {
    let (name, metatable) = {
        let classes = stack.shared().classes.borrow();
        let descriptor = classes
            .get(TypeId::of::<T>())
            .ok_or(Error::ClassNotRegistered {
                type_name: type_name::<T>(),
            })?;
        (descriptor.name.clone(), descriptor.metatable)
    };

    let index = stack.abs_index(index);
    if stack.kind(index) != Kind::Userdata {
        return Err(Error::mismatch(&*name, stack.kind(index).name()));
    }

    let _guard = stack.guard();
    if !stack.get_metatable(index) {
        return Err(Error::mismatch(&*name, "userdata"));
    }
    stack.push_reference(metatable);
    if !stack.raw_equal(-1, -2) {
        return Err(Error::mismatch(&*name, "userdata"));
    }

    let raw = unsafe { ffi::lua_touserdata(stack.as_ptr(), index) };
    let block = userdata_block::<Instance<T>>(raw).ok_or_else(invalid::<T>)?;
    Ok(unsafe { &*block.as_ptr() })
}

/// `__gc` of every class metatable
pub(crate) unsafe extern "C-unwind" fn finalize<T: 'static>(state: *mut ffi::lua_State) -> c_int {
    let raw = ffi::lua_touserdata(state, 1);
    if let Some(block) = userdata_block::<Instance<T>>(raw) {
        let instance = &*block.as_ptr();
        let released =
            panic::catch_unwind(AssertUnwindSafe(|| instance.release())).unwrap_or(false);
        logging::log_instance_finalized(type_name::<T>(), released);
    }
    0
}
