//! Stack accessor - the only layer that touches runtime stack indices
//!
//! Design: `Stack` is a cheap handle (state pointer + shared context state).
//! Conversions return `Result`; scoped `StackGuard`s keep depth balanced on
//! every exit path.
//!
//! Architecture:
//! - `kind.rs` - runtime type tags
//! - `guard.rs` - scoped depth restoration
//! - `debug.rs` - source locations and stack dumps

mod debug;
mod guard;
mod kind;

pub use guard::StackGuard;
pub use kind::Kind;

use mlua_sys as ffi;
use std::alloc::Layout;
use std::ffi::{c_int, c_void};
use std::ptr::{self, NonNull};
use std::rc::Rc;

use crate::context::Shared;
use crate::error::{Error, Result};
use crate::logging;
use crate::marshal::{FromLua, FromLuaMulti, IntoLua, IntoLuaMulti};

/// Registry slot holding a light pointer to the context's shared state
static SHARED_KEY: u8 = 0;

pub(crate) fn shared_key() -> *const c_void {
    ptr::addr_of!(SHARED_KEY).cast()
}

/// Pseudo-index of upvalue `n` of the running native closure
pub(crate) fn upvalue(n: i32) -> i32 {
    ffi::lua_upvalueindex(n)
}

/// Handle to one runtime stack
///
/// Inside a native callback this is the callback's frame; slot 1 is the
/// first argument. A handle may outlive its context: once the context is
/// closed, pushes do nothing, queries report an empty stack and reads fail
/// with `ContextClosed`.
#[derive(Clone)]
pub struct Stack {
    state: NonNull<ffi::lua_State>,
    shared: Rc<Shared>,
}

impl Stack {
    pub(crate) fn new(state: NonNull<ffi::lua_State>, shared: Rc<Shared>) -> Self {
        Self { state, shared }
    }

    /// Stack of the context's main state
    pub(crate) fn main(shared: &Rc<Shared>) -> Self {
        Self::new(shared.main, shared.clone())
    }

    /// Recover the handle for a state entering native code
    ///
    /// # Safety
    /// `state` must belong to a live context created by this crate.
    pub(crate) unsafe fn from_raw(state: *mut ffi::lua_State) -> Option<Self> {
        let state = NonNull::new(state)?;
        ffi::lua_rawgetp(state.as_ptr(), ffi::LUA_REGISTRYINDEX, shared_key());
        let raw = ffi::lua_touserdata(state.as_ptr(), -1) as *const Shared;
        ffi::lua_settop(state.as_ptr(), -2);
        if raw.is_null() {
            return None;
        }

        // The context keeps one strong count alive for as long as the state exists
        Rc::increment_strong_count(raw);
        Some(Self::new(state, Rc::from_raw(raw)))
    }

    /// Raw state pointer; dangling once the context is closed
    pub fn as_ptr(&self) -> *mut ffi::lua_State {
        self.state.as_ptr()
    }

    /// Whether the owning context has been dropped
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// The state, unless the context is closed
    fn live(&self) -> Option<*mut ffi::lua_State> {
        (!self.shared.is_closed()).then(|| self.state.as_ptr())
    }

    fn open(&self) -> Result<*mut ffi::lua_State> {
        self.live().ok_or(Error::ContextClosed)
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    pub(crate) fn shared_rc(&self) -> &Rc<Shared> {
        &self.shared
    }

    // ------------------------------------------------------------------
    // Depth
    // ------------------------------------------------------------------

    pub fn top(&self) -> i32 {
        self.live()
            .map_or(0, |state| unsafe { ffi::lua_gettop(state) })
    }

    pub fn set_top(&self, top: i32) {
        if let Some(state) = self.live() {
            unsafe { ffi::lua_settop(state, top) }
        }
    }

    pub fn pop(&self, n: i32) {
        if n > 0 {
            self.set_top(-n - 1);
        }
    }

    pub fn abs_index(&self, index: i32) -> i32 {
        self.live()
            .map_or(index, |state| unsafe { ffi::lua_absindex(state, index) })
    }

    /// Scope guard restoring the current depth on drop
    pub fn guard(&self) -> StackGuard<'_> {
        StackGuard::new(self)
    }

    /// Grow the stack for `extra` slots; running out is fatal
    pub(crate) fn reserve(&self, extra: i32) {
        let Some(state) = self.live() else {
            return;
        };
        if unsafe { ffi::lua_checkstack(state, extra) } == 0 {
            self.fatal(&Error::Allocation("stack space"));
        }
    }

    // ------------------------------------------------------------------
    // Type queries
    // ------------------------------------------------------------------

    /// `Kind::None` past the top, or for every slot of a closed context
    pub fn kind(&self, index: i32) -> Kind {
        self.live()
            .map_or(Kind::None, |state| Kind::from_raw(unsafe { ffi::lua_type(state, index) }))
    }

    pub fn is_integer(&self, index: i32) -> bool {
        self.live()
            .is_some_and(|state| unsafe { ffi::lua_isinteger(state, index) != 0 })
    }

    pub(crate) fn expect(&self, index: i32, kind: Kind) -> Result<()> {
        self.open()?;
        let actual = self.kind(index);
        if actual == kind {
            Ok(())
        } else {
            Err(Error::mismatch(kind.name(), actual.name()))
        }
    }

    // ------------------------------------------------------------------
    // Pushes
    // ------------------------------------------------------------------

    pub fn push_nil(&self) {
        if let Some(state) = self.live() {
            unsafe { ffi::lua_pushnil(state) }
        }
    }

    pub fn push_bool(&self, value: bool) {
        if let Some(state) = self.live() {
            unsafe { ffi::lua_pushboolean(state, value as c_int) }
        }
    }

    pub fn push_int(&self, value: i64) {
        if let Some(state) = self.live() {
            unsafe { ffi::lua_pushinteger(state, value as ffi::lua_Integer) }
        }
    }

    pub fn push_number(&self, value: f64) {
        if let Some(state) = self.live() {
            unsafe { ffi::lua_pushnumber(state, value as ffi::lua_Number) }
        }
    }

    pub fn push_string(&self, value: &str) {
        self.push_bytes(value.as_bytes());
    }

    /// Push a byte string; runtime strings need not be UTF-8
    pub fn push_bytes(&self, value: &[u8]) {
        if let Some(state) = self.live() {
            unsafe {
                ffi::lua_pushlstring(state, value.as_ptr().cast(), value.len());
            }
        }
    }

    /// Push a non-owning pointer
    pub fn push_userdata(&self, value: *mut c_void) {
        if let Some(state) = self.live() {
            unsafe { ffi::lua_pushlightuserdata(state, value) }
        }
    }

    /// Push a new table with preallocated array and hash parts
    pub fn push_table(&self, array: usize, records: usize) {
        let clamp = |n: usize| c_int::try_from(n).unwrap_or(c_int::MAX);
        if let Some(state) = self.live() {
            unsafe { ffi::lua_createtable(state, clamp(array), clamp(records)) }
        }
    }

    pub fn push_value(&self, index: i32) {
        if let Some(state) = self.live() {
            unsafe { ffi::lua_pushvalue(state, index) }
        }
    }

    /// Push any marshalable value
    pub fn push<T: IntoLua>(&self, value: T) {
        value.push_lua(self);
    }

    /// Push a native closure taking the top `upvalues` slots as upvalues
    pub(crate) fn push_closure(&self, function: ffi::lua_CFunction, upvalues: i32) {
        if let Some(state) = self.live() {
            unsafe { ffi::lua_pushcclosure(state, function, upvalues) }
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn to_bool(&self, index: i32) -> Result<bool> {
        self.expect(index, Kind::Boolean)?;
        let state = self.open()?;
        Ok(unsafe { ffi::lua_toboolean(state, index) != 0 })
    }

    /// Integers are strict: a float slot is a mismatch even when integral
    pub fn to_int(&self, index: i32) -> Result<i64> {
        let state = self.open()?;
        if !self.is_integer(index) {
            return Err(Error::mismatch("integer", self.kind(index).name()));
        }
        Ok(unsafe { ffi::lua_tointegerx(state, index, ptr::null_mut()) })
    }

    pub fn to_number(&self, index: i32) -> Result<f64> {
        self.expect(index, Kind::Number)?;
        let state = self.open()?;
        Ok(unsafe { ffi::lua_tonumberx(state, index, ptr::null_mut()) })
    }

    /// UTF-8 strings, and numbers rendered the way the runtime renders them
    ///
    /// A string holding invalid UTF-8 is a mismatch; read it with
    /// [`Stack::to_bytes`] instead.
    pub fn to_string(&self, index: i32) -> Result<String> {
        let bytes = match self.kind(index) {
            Kind::String => self.string_bytes(index)?,
            Kind::Number => {
                // Converting in place would break a running `next` traversal
                let _guard = self.guard();
                self.push_value(index);
                self.string_bytes(-1)?
            }
            other => {
                self.open()?;
                return Err(Error::mismatch("string", other.name()));
            }
        };
        String::from_utf8(bytes).map_err(|_| Error::mismatch("string", "binary string"))
    }

    /// Raw contents of a string slot
    pub fn to_bytes(&self, index: i32) -> Result<Vec<u8>> {
        self.expect(index, Kind::String)?;
        self.string_bytes(index)
    }

    fn string_bytes(&self, index: i32) -> Result<Vec<u8>> {
        let state = self.open()?;
        let mut len = 0usize;
        let data = unsafe { ffi::lua_tolstring(state, index, &mut len) };
        if data.is_null() {
            return Ok(Vec::new());
        }
        Ok(unsafe { std::slice::from_raw_parts(data.cast::<u8>(), len) }.to_vec())
    }

    /// The string at `index`, only if it is a UTF-8 string
    pub(crate) fn string_at(&self, index: i32) -> Option<String> {
        if self.kind(index) != Kind::String {
            return None;
        }
        self.to_string(index).ok()
    }

    /// Address of a full or light userdata
    pub fn to_userdata(&self, index: i32) -> Result<*mut c_void> {
        let state = self.open()?;
        match self.kind(index) {
            Kind::Userdata | Kind::LightUserdata => {
                Ok(unsafe { ffi::lua_touserdata(state, index) })
            }
            other => Err(Error::mismatch("userdata", other.name())),
        }
    }

    /// Read any marshalable value without popping it
    pub fn read<T: FromLua>(&self, index: i32) -> Result<T> {
        self.open()?;
        T::from_lua(self, index)
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    /// Border of the sequence part (`#t` without metamethods)
    pub fn raw_len(&self, index: i32) -> usize {
        self.live()
            .map_or(0, |state| unsafe { ffi::lua_rawlen(state, index) as usize })
    }

    /// Pops a key, pushes `t[key]`
    pub fn raw_get(&self, table: i32) -> Kind {
        self.live()
            .map_or(Kind::None, |state| Kind::from_raw(unsafe { ffi::lua_rawget(state, table) }))
    }

    /// Pops a value and a key, assigns `t[key] = value`
    pub fn raw_set(&self, table: i32) {
        if let Some(state) = self.live() {
            unsafe { ffi::lua_rawset(state, table) }
        }
    }

    pub fn raw_get_index(&self, table: i32, n: i64) -> Kind {
        self.live().map_or(Kind::None, |state| {
            Kind::from_raw(unsafe { ffi::lua_rawgeti(state, table, n as ffi::lua_Integer) })
        })
    }

    /// Pops a value, assigns `t[n] = value`
    pub fn raw_set_index(&self, table: i32, n: i64) {
        if let Some(state) = self.live() {
            unsafe { ffi::lua_rawseti(state, table, n as ffi::lua_Integer) }
        }
    }

    /// Pops a value, assigns `t[key] = value` with a string key
    pub(crate) fn set_field(&self, table: i32, key: &str) {
        let Some(state) = self.live() else {
            return;
        };
        let table = self.abs_index(table);
        self.push_string(key);
        unsafe { ffi::lua_rotate(state, -2, 1) };
        self.raw_set(table);
    }

    /// Pops a key, pushes the next key/value pair; false at the end
    pub fn next(&self, table: i32) -> bool {
        self.live()
            .is_some_and(|state| unsafe { ffi::lua_next(state, table) != 0 })
    }

    /// Pops a table and makes it the metatable of the value at `index`
    pub(crate) fn set_metatable(&self, index: i32) {
        if let Some(state) = self.live() {
            unsafe { ffi::lua_setmetatable(state, index) };
        }
    }

    /// Pushes the metatable of the value at `index`, if any
    pub(crate) fn get_metatable(&self, index: i32) -> bool {
        self.live()
            .is_some_and(|state| unsafe { ffi::lua_getmetatable(state, index) != 0 })
    }

    pub(crate) fn raw_equal(&self, a: i32, b: i32) -> bool {
        self.live()
            .is_some_and(|state| unsafe { ffi::lua_rawequal(state, a, b) != 0 })
    }

    // ------------------------------------------------------------------
    // Globals
    // ------------------------------------------------------------------

    fn push_globals(&self) {
        self.raw_get_index(ffi::LUA_REGISTRYINDEX, ffi::LUA_RIDX_GLOBALS as i64);
    }

    /// Pushes the global `name`
    pub fn get_global(&self, name: &str) -> Kind {
        let Some(state) = self.live() else {
            return Kind::None;
        };
        self.push_globals();
        self.push_string(name);
        let kind = self.raw_get(-2);
        unsafe { ffi::lua_rotate(state, -2, 1) };
        self.pop(1);
        kind
    }

    /// Pops a value into the global `name`
    pub fn set_global(&self, name: &str) {
        if self.is_closed() {
            return;
        }
        self.push_globals();
        self.push_string(name);
        self.push_value(-3);
        self.raw_set(-3);
        self.pop(2);
        logging::log_global_set(name);
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Pops the top value into a new registry reference
    pub(crate) fn reference(&self) -> Result<c_int> {
        let state = self.open()?;
        Ok(unsafe { ffi::luaL_ref(state, ffi::LUA_REGISTRYINDEX) })
    }

    pub(crate) fn push_reference(&self, key: c_int) -> Kind {
        self.raw_get_index(ffi::LUA_REGISTRYINDEX, key as i64)
    }

    pub(crate) fn release_reference(&self, key: c_int) {
        if let Some(state) = self.live() {
            unsafe { ffi::luaL_unref(state, ffi::LUA_REGISTRYINDEX, key) }
        }
    }

    // ------------------------------------------------------------------
    // Userdata blocks
    // ------------------------------------------------------------------

    /// Push a full userdata able to hold `layout`, returning its aligned start
    pub(crate) fn new_userdata(&self, layout: Layout) -> Result<NonNull<u8>> {
        let state = self.open()?;
        let size = layout.size() + layout.align() - 1;
        let raw = unsafe { ffi::lua_newuserdatauv(state, size, 0) };
        match NonNull::new(raw.cast::<u8>()) {
            Some(block) => Ok(align_up(block, layout.align())),
            None => self.fatal(&Error::Allocation("userdata block")),
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    /// Compile `source` and push it as a function
    pub(crate) fn load(&self, source: &str, chunk: &str) -> Result<()> {
        let state = self.open()?;
        let name = format!("={}\0", chunk);
        let status = unsafe {
            ffi::luaL_loadbufferx(
                state,
                source.as_ptr().cast(),
                source.len(),
                name.as_ptr().cast(),
                ptr::null(),
            )
        };
        if status == ffi::LUA_OK {
            return Ok(());
        }

        let message = self.error_message(-1);
        self.pop(1);
        let err = Error::Syntax(message);
        self.report(&err);
        Err(err)
    }

    /// Protected call of the function below `nargs` arguments
    ///
    /// On failure the error object is popped, reported once, and returned.
    pub fn call_protected(&self, nargs: i32, nreturns: i32) -> Result<()> {
        let state = self.open()?;
        let status = unsafe { ffi::lua_pcall(state, nargs, nreturns, 0) };
        if status == ffi::LUA_OK {
            return Ok(());
        }

        let message = self.error_message(-1);
        self.pop(1);
        logging::log_protected_call_failed(&message);
        let err = Error::ProtectedCall(message);
        self.report(&err);
        Err(err)
    }

    /// Call the global function `name` with typed arguments and results
    pub fn call_global<R: FromLuaMulti>(&self, name: &str, args: impl IntoLuaMulti) -> Result<R> {
        self.open()?;
        let _guard = self.guard();
        if self.get_global(name) != Kind::Function {
            let err = Error::UndefinedFunction {
                name: name.to_string(),
            };
            self.report(&err);
            return Err(err);
        }

        let nargs = args.push_multi(self);
        self.call_protected(nargs, R::COUNT)?;
        self.read_results()
    }

    /// Read `R::COUNT` results from the top of the stack
    pub(crate) fn read_results<R: FromLuaMulti>(&self) -> Result<R> {
        self.open()?;
        R::from_stack(self, self.top() - R::COUNT + 1).map_err(|err| {
            self.report(&err);
            err
        })
    }

    fn error_message(&self, index: i32) -> String {
        match self.kind(index) {
            Kind::String | Kind::Number => self
                .string_bytes(index)
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default(),
            other => format!("(error object is a {} value)", other.name()),
        }
    }

    // ------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------

    /// Route a non-fatal error to the context's error hook
    pub fn report(&self, error: &Error) {
        self.shared.report(self.as_ptr(), error);
    }

    pub(crate) fn fatal(&self, error: &Error) -> ! {
        self.shared.fatal(&error.to_string())
    }

    /// Render every live slot, bottom first
    pub fn dump(&self) -> String {
        let dump = debug::dump(self);
        tracing::trace!(stack = %dump, "stack dump");
        dump
    }
}

/// First address at or after `block` aligned to `align`
pub(crate) fn align_up(block: NonNull<u8>, align: usize) -> NonNull<u8> {
    let addr = block.as_ptr() as usize;
    let offset = addr.wrapping_neg() & (align - 1);
    // An in-bounds offset of a non-null pointer is non-null
    unsafe { NonNull::new_unchecked(block.as_ptr().add(offset)) }
}

/// Aligned start of a userdata block created by `new_userdata`
pub(crate) fn userdata_block<T>(raw: *mut c_void) -> Option<NonNull<T>> {
    NonNull::new(raw.cast::<u8>()).map(|block| align_up(block, std::mem::align_of::<T>()).cast())
}

#[cfg(test)]
mod tests {
    use crate::{Context, Error, Kind};

    #[test]
    fn test_guard_restores_depth() {
        let ctx = Context::new(false);
        let stack = ctx.stack();
        let base = stack.top();
        {
            let _guard = stack.guard();
            stack.push_int(1);
            stack.push_string("two");
            assert_eq!(stack.top(), base + 2);
        }
        assert_eq!(stack.top(), base);
    }

    #[test]
    fn test_typed_reads() {
        let ctx = Context::new(false);
        let stack = ctx.stack();
        let _guard = stack.guard();

        stack.push_int(42);
        stack.push_number(2.5);
        stack.push_bool(true);
        stack.push_nil();

        assert_eq!(stack.to_int(-4).unwrap(), 42);
        assert_eq!(stack.to_number(-4).unwrap(), 42.0);
        assert_eq!(stack.to_number(-3).unwrap(), 2.5);
        assert!(stack.to_bool(-2).unwrap());
        assert_eq!(stack.kind(-1), Kind::Nil);

        assert_eq!(
            stack.to_int(-3),
            Err(Error::mismatch("integer", "number"))
        );
        assert_eq!(stack.to_bool(-1), Err(Error::mismatch("boolean", "nil")));
    }

    #[test]
    fn test_number_to_string_keeps_slot() {
        let ctx = Context::new(false);
        let stack = ctx.stack();
        let _guard = stack.guard();

        stack.push_int(7);
        assert_eq!(stack.to_string(-1).unwrap(), "7");
        assert!(stack.is_integer(-1));
    }

    #[test]
    fn test_align_up() {
        use std::ptr::NonNull;

        let mut buffer = [0u8; 64];
        let base = NonNull::new(buffer.as_mut_ptr()).unwrap();
        for align in [1usize, 2, 8, 16, 32] {
            let aligned = super::align_up(base, align);
            assert_eq!(aligned.as_ptr() as usize % align, 0);
            assert!((aligned.as_ptr() as usize) - (base.as_ptr() as usize) < align);
        }
    }

    #[test]
    fn test_globals() {
        let ctx = Context::new(false);
        let stack = ctx.stack();
        let base = stack.top();

        stack.push_string("hello");
        stack.set_global("greeting");
        assert_eq!(stack.top(), base);

        assert_eq!(stack.get_global("greeting"), Kind::String);
        assert_eq!(stack.to_string(-1).unwrap(), "hello");
        stack.pop(1);
        assert_eq!(stack.get_global("missing"), Kind::Nil);
        stack.pop(1);
        assert_eq!(stack.top(), base);
    }

    #[test]
    fn test_dump_lists_slots() {
        let ctx = Context::new(false);
        let stack = ctx.stack();
        let _guard = stack.guard();

        stack.push_int(3);
        stack.push_string("x");
        let dump = stack.dump();
        assert!(dump.contains("3"));
        assert!(dump.contains("\"x\""));
    }
}
