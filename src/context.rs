//! Runtime context - owns one embedded runtime and its class registry

use mlua_sys as ffi;
use std::cell::{Cell, RefCell};
use std::ffi::{c_int, c_void};
use std::ptr::NonNull;
use std::rc::Rc;

use crate::binder::{self, NativeFn};
use crate::class::{self, Class, ClassBuilder, ClassInfo, ClassRegistry};
use crate::config::{Config, ErrorHandlers};
use crate::error::{Error, Location, Result};
use crate::function::Function;
use crate::logging::{self, perf};
use crate::marshal::{FromLua, FromLuaMulti, IntoLua, IntoLuaMulti};
use crate::stack::{self, Kind, Stack};

/// State shared by the context, its stacks and every live handle
pub(crate) struct Shared {
    pub(crate) main: NonNull<ffi::lua_State>,
    closed: Cell<bool>,
    pub(crate) config: Config,
    handlers: ErrorHandlers,
    pub(crate) classes: RefCell<ClassRegistry>,
}

impl Shared {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Report a non-fatal error once, prefixed with its script position
    pub(crate) fn report(&self, state: *mut ffi::lua_State, error: &Error) {
        let message = if self.config.dispatch.source_locations && !self.is_closed() {
            Location::capture(state).annotate(&error.to_string())
        } else {
            error.to_string()
        };

        logging::log_reported_error(error.kind(), &message);
        self.handlers.error(&message);
    }

    pub(crate) fn fatal(&self, message: &str) -> ! {
        logging::log_fatal(message);
        self.handlers.fatal(message)
    }
}

/// One embedded runtime instance
///
/// Dropping the context closes the runtime: every instance still alive is
/// finalized and every handle becomes invalid.
pub struct Context {
    shared: Rc<Shared>,
    stack: Stack,
}

impl Context {
    /// Create a runtime with default configuration
    pub fn new(open_libs: bool) -> Self {
        Self::with_config(
            Config::default().with_open_libs(open_libs),
            ErrorHandlers::default(),
        )
    }

    pub fn with_config(config: Config, handlers: ErrorHandlers) -> Self {
        let raw = unsafe { ffi::luaL_newstate() };
        let Some(main) = NonNull::new(raw) else {
            logging::log_fatal("Could not allocate new runtime state");
            handlers.fatal("Could not allocate new runtime state");
        };

        let open_libs = config.open_libs;
        let object_model = config.object_model;
        let shared = Rc::new(Shared {
            main,
            closed: Cell::new(false),
            config,
            handlers,
            classes: RefCell::new(ClassRegistry::default()),
        });

        unsafe {
            ffi::lua_pushlightuserdata(raw, Rc::as_ptr(&shared) as *mut c_void);
            ffi::lua_rawsetp(raw, ffi::LUA_REGISTRYINDEX, stack::shared_key());
            ffi::lua_atpanic(raw, panic_handler);
            if open_libs {
                ffi::luaL_openlibs(raw);
            }
        }

        logging::log_context_created(open_libs, object_model);
        let stack = Stack::main(&shared);
        Self { shared, stack }
    }

    /// Stack of the main state, for direct slot access
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Run a chunk of source; errors are reported and returned
    pub fn execute(&self, source: &str) -> Result<()> {
        self.eval::<()>(source)
    }

    /// Run a chunk of source and read its return values
    pub fn eval<R: FromLuaMulti>(&self, source: &str) -> Result<R> {
        let _timer = perf::track("eval");
        let stack = &self.stack;
        let _guard = stack.guard();
        stack.load(source, "lunabind")?;
        stack.call_protected(0, R::COUNT)?;
        stack.read_results()
    }

    /// Call the global function `name`
    ///
    /// An undefined name, a script error or a result conversion failure is
    /// reported once and returned; use `unwrap_or_default` for default results.
    pub fn call_safe<R: FromLuaMulti>(&self, name: &str, args: impl IntoLuaMulti) -> Result<R> {
        self.stack.call_global(name, args)
    }

    /// Handle to the global function `name`
    pub fn function(&self, name: &str) -> Result<Function> {
        let _guard = self.stack.guard();
        if self.stack.get_global(name) != Kind::Function {
            let err = Error::UndefinedFunction {
                name: name.to_string(),
            };
            self.stack.report(&err);
            return Err(err);
        }
        Function::from_lua(&self.stack, -1)
    }

    pub fn add_global(&self, name: &str, value: impl IntoLua) {
        let _guard = self.stack.guard();
        value.push_lua(&self.stack);
        self.stack.set_global(name);
    }

    /// Read the global `name`; a conversion failure is reported and returned
    pub fn get_global<T: FromLua>(&self, name: &str) -> Result<T> {
        let _guard = self.stack.guard();
        self.stack.get_global(name);
        T::from_lua(&self.stack, -1).map_err(|err| {
            self.stack.report(&err);
            err
        })
    }

    /// Bind a Rust callable as the global function `name`
    pub fn add_function<F, Args>(&self, name: &str, function: F)
    where
        F: NativeFn<Args>,
        Args: 'static,
    {
        let _guard = self.stack.guard();
        match binder::push_function(&self.stack, name, function) {
            Ok(()) => self.stack.set_global(name),
            Err(err) => self.stack.report(&err),
        }
    }

    /// Register `T` as a script class; false if it cannot be registered
    pub fn register_class<T: Class>(&self, class: ClassBuilder<T>) -> bool {
        match class::register(&self.stack, class) {
            Ok(()) => true,
            Err(err) => {
                self.stack.report(&err);
                false
            }
        }
    }

    /// Shape of the registered class for `T`
    pub fn class_info<T: Class>(&self) -> Option<ClassInfo> {
        self.shared.classes.borrow().info::<T>()
    }

    /// Run a full collection cycle, finalizing unreachable instances
    pub fn collect_garbage(&self) {
        unsafe { ffi::lua_gc(self.stack.as_ptr(), ffi::LUA_GCCOLLECT) };
    }

    /// Bytes currently held by the runtime
    pub fn memory_in_use(&self) -> usize {
        let state = self.stack.as_ptr();
        let (kilobytes, bytes) = unsafe {
            (
                ffi::lua_gc(state, ffi::LUA_GCCOUNT),
                ffi::lua_gc(state, ffi::LUA_GCCOUNTB),
            )
        };
        kilobytes.max(0) as usize * 1024 + bytes.max(0) as usize
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.shared.closed.set(true);
        unsafe { ffi::lua_close(self.shared.main.as_ptr()) };

        let mut classes = self.shared.classes.borrow_mut();
        logging::log_context_closed(classes.len());
        classes.clear();
    }
}

/// Errors raised outside any protected call end the process
unsafe extern "C-unwind" fn panic_handler(state: *mut ffi::lua_State) -> c_int {
    let Some(stack) = Stack::from_raw(state) else {
        logging::log_fatal("unprotected runtime error");
        std::process::exit(1)
    };

    let message = stack
        .to_string(-1)
        .unwrap_or_else(|_| "unknown error".to_string());
    stack.shared().fatal(&Error::Panic(message).to_string())
}
