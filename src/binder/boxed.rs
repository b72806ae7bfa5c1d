//! Native values owned by runtime userdata, dropped by its finalizer

use mlua_sys as ffi;
use std::alloc::Layout;
use std::any::type_name;
use std::ffi::{c_int, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use crate::error::Result;
use crate::stack::{userdata_block, Stack};

/// Move `value` into a new userdata on top of the stack
pub(crate) fn push<T: 'static>(stack: &Stack, value: T) -> Result<()> {
    let block = stack.new_userdata(Layout::new::<T>())?;
    unsafe { ptr::write(block.cast::<T>().as_ptr(), value) };

    push_metatable::<T>(stack);
    stack.set_metatable(-2);
    Ok(())
}

/// Borrow the value stored by `push` at `index`
///
/// # Safety
/// The slot must hold a userdata created by `push::<T>` that stays alive for `'a`.
pub(crate) unsafe fn get<'a, T: 'static>(stack: &Stack, index: i32) -> Option<&'a T> {
    let raw = ffi::lua_touserdata(stack.as_ptr(), index);
    userdata_block::<T>(raw).map(|block| &*block.as_ptr())
}

/// One metatable per stored type, kept in the registry under the type name
fn push_metatable<T: 'static>(stack: &Stack) {
    let name = CString::new(type_name::<T>()).unwrap_or_default();
    let created = unsafe { ffi::luaL_newmetatable(stack.as_ptr(), name.as_ptr()) } != 0;
    if created {
        stack.push_closure(finalize::<T>, 0);
        stack.set_field(-2, "__gc");
        stack.push_bool(false);
        stack.set_field(-2, "__metatable");
    }
}

unsafe extern "C-unwind" fn finalize<T: 'static>(state: *mut ffi::lua_State) -> c_int {
    let raw = ffi::lua_touserdata(state, 1);
    if let Some(block) = userdata_block::<T>(raw) {
        // A panicking destructor must not unwind into the collector
        let dropped = panic::catch_unwind(AssertUnwindSafe(|| ptr::drop_in_place(block.as_ptr())));
        if dropped.is_err() {
            tracing::error!(value = type_name::<T>(), "Destructor panicked during finalization");
        }
    }
    0
}
