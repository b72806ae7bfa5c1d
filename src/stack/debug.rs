use mlua_sys as ffi;
use std::ffi::CStr;
use std::fmt::Write;

use super::{Kind, Stack};
use crate::error::Location;

impl Location {
    /// Function name of the running native entry and line of its script caller
    pub(crate) fn capture(state: *mut ffi::lua_State) -> Self {
        let mut location = Location::default();
        unsafe {
            let mut ar: ffi::lua_Debug = std::mem::zeroed();
            if ffi::lua_getstack(state, 0, &mut ar) != 0
                && ffi::lua_getinfo(state, c"n".as_ptr(), &mut ar) != 0
                && !ar.name.is_null()
            {
                location.function = Some(CStr::from_ptr(ar.name).to_string_lossy().into_owned());
            }

            let mut ar: ffi::lua_Debug = std::mem::zeroed();
            if ffi::lua_getstack(state, 1, &mut ar) != 0
                && ffi::lua_getinfo(state, c"Sl".as_ptr(), &mut ar) != 0
                && ar.currentline > 0
            {
                location.line = u32::try_from(ar.currentline).ok();
            }
        }
        location
    }
}

pub(super) fn dump(stack: &Stack) -> String {
    let mut out = String::new();
    let top = stack.top();
    for index in 1..=top {
        let kind = stack.kind(index);
        let _ = write!(out, "[{}] {}", index, kind);
        match kind {
            Kind::Boolean => {
                let _ = write!(out, " {}", stack.to_bool(index).unwrap_or_default());
            }
            Kind::Number if stack.is_integer(index) => {
                let _ = write!(out, " {}", stack.to_int(index).unwrap_or_default());
            }
            Kind::Number => {
                let _ = write!(out, " {}", stack.to_number(index).unwrap_or_default());
            }
            Kind::String => {
                let _ = write!(out, " {:?}", stack.to_string(index).unwrap_or_default());
            }
            Kind::Table => {
                let _ = write!(out, " #{}", stack.raw_len(index));
            }
            Kind::Userdata | Kind::LightUserdata => {
                let address = stack.to_userdata(index).unwrap_or(std::ptr::null_mut());
                let _ = write!(out, " {:p}", address);
            }
            _ => {}
        }
        out.push('\n');
    }
    out
}
