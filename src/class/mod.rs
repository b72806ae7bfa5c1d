//! Object model - native types as script classes
//!
//! Design: each context owns a registry from `TypeId` to a descriptor
//! (properties, methods, metatable reference). Instances are userdata blocks
//! holding the native value; metamethods route member access through the
//! registry.
//!
//! Architecture:
//! - `builder.rs` - typed registration API and erased accessors
//! - `instance.rs` - instance blocks, allocation, finalization
//! - `dispatch.rs` - `__index`, `__newindex`, constructor and method entries

mod builder;
mod dispatch;
pub(crate) mod instance;

pub use builder::{ClassBuilder, Constructor, Method, Mut, Ref};

use std::any::TypeId;
use std::collections::HashMap;
use std::ffi::c_int;
use std::rc::Rc;

use self::builder::{FieldAccessor, MethodCall};
use crate::binder::{self, boxed};
use crate::error::{Error, Result};
use crate::logging;
use crate::stack::Stack;

/// Native types that can be registered as script classes
///
/// Registered types cross the boundary by value (`IntoLua`, and `FromLua`
/// when `Clone`) and by `*mut T` pointer.
pub trait Class: 'static {}

/// Per-type metadata kept by a context
pub(crate) struct ClassDescriptor {
    pub(crate) name: Rc<str>,
    /// Registry reference of the instance metatable
    pub(crate) metatable: c_int,
    pub(crate) fields: HashMap<String, FieldAccessor>,
    pub(crate) methods: HashMap<String, Rc<dyn MethodCall>>,
    pub(crate) functions: Vec<String>,
}

#[derive(Default)]
pub(crate) struct ClassRegistry {
    classes: HashMap<TypeId, ClassDescriptor>,
}

impl ClassRegistry {
    pub(crate) fn contains(&self, id: TypeId) -> bool {
        self.classes.contains_key(&id)
    }

    pub(crate) fn get(&self, id: TypeId) -> Option<&ClassDescriptor> {
        self.classes.get(&id)
    }

    pub(crate) fn metatable(&self, id: TypeId) -> Option<c_int> {
        self.classes.get(&id).map(|descriptor| descriptor.metatable)
    }

    pub(crate) fn info<T: 'static>(&self) -> Option<ClassInfo> {
        self.get(TypeId::of::<T>()).map(ClassInfo::from)
    }

    pub(crate) fn len(&self) -> usize {
        self.classes.len()
    }

    pub(crate) fn clear(&mut self) {
        self.classes.clear();
    }

    fn insert(&mut self, id: TypeId, descriptor: ClassDescriptor) {
        self.classes.insert(id, descriptor);
    }
}

/// Public view of a registered class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    /// Sorted by name
    pub properties: Vec<PropertyInfo>,
    /// Sorted
    pub methods: Vec<String>,
    pub functions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyInfo {
    pub name: String,
    pub readable: bool,
    pub writable: bool,
}

impl From<&ClassDescriptor> for ClassInfo {
    fn from(descriptor: &ClassDescriptor) -> Self {
        let mut properties: Vec<PropertyInfo> = descriptor
            .fields
            .iter()
            .map(|(name, field)| PropertyInfo {
                name: name.clone(),
                readable: field.read.is_some(),
                writable: field.write.is_some(),
            })
            .collect();
        properties.sort_by(|a, b| a.name.cmp(&b.name));

        let mut methods: Vec<String> = descriptor.methods.keys().cloned().collect();
        methods.sort();
        let mut functions = descriptor.functions.clone();
        functions.sort();

        ClassInfo {
            name: descriptor.name.to_string(),
            properties,
            methods,
            functions,
        }
    }
}

/// Install `class` in the runtime and record its descriptor
///
/// Creates the instance metatable, the global class table (`create`,
/// static functions, `__call` construction), and fails without touching
/// anything if `T` is already registered.
pub(crate) fn register<T: Class>(stack: &Stack, class: ClassBuilder<T>) -> Result<()> {
    if !stack.shared().config.object_model {
        return Err(Error::ObjectModelDisabled);
    }
    if stack.shared().classes.borrow().contains(TypeId::of::<T>()) {
        return Err(Error::AlreadyRegistered { class: class.name });
    }

    let ClassBuilder {
        name,
        constructor,
        fields,
        methods,
        functions,
        ..
    } = class;

    let _guard = stack.guard();
    stack.reserve(8);

    // Methods table, the upvalue of `__index`
    stack.push_table(0, methods.len());
    let methods_table = stack.top();
    for (method_name, method) in &methods {
        boxed::push(stack, method.clone())?;
        stack.push_closure(dispatch::method, 1);
        stack.set_field(methods_table, method_name);
    }

    // Instance metatable
    stack.push_table(0, 6);
    stack.push_string(&name);
    stack.set_field(-2, "__name");
    stack.push_value(methods_table);
    stack.push_closure(dispatch::index::<T>, 1);
    stack.set_field(-2, "__index");
    stack.push_closure(dispatch::newindex::<T>, 0);
    stack.set_field(-2, "__newindex");
    stack.push_closure(dispatch::tostring::<T>, 0);
    stack.set_field(-2, "__tostring");
    stack.push_closure(instance::finalize::<T>, 0);
    stack.set_field(-2, "__gc");
    stack.push_bool(false);
    stack.set_field(-2, "__metatable");
    let metatable = stack.reference()?;

    // Class table
    stack.push_table(0, functions.len() + 1);
    let class_table = stack.top();
    if let Some(constructor) = constructor {
        boxed::push(stack, constructor.clone())?;
        stack.push_closure(dispatch::create, 1);
        stack.set_field(class_table, "create");

        stack.push_table(0, 1);
        boxed::push(stack, constructor)?;
        stack.push_closure(dispatch::call, 1);
        stack.set_field(-2, "__call");
        stack.set_metatable(class_table);
    }
    for (function_name, callback) in &functions {
        boxed::push(stack, callback.clone())?;
        stack.push_closure(binder::callback_trampoline, 1);
        stack.set_field(class_table, function_name);
    }
    stack.push_value(class_table);
    stack.set_global(&name);

    logging::log_class_registered(&name, fields.len(), methods.len());
    let descriptor = ClassDescriptor {
        name: Rc::from(name.as_str()),
        metatable,
        fields,
        methods: methods.into_iter().collect(),
        functions: functions.into_iter().map(|(name, _)| name).collect(),
    };
    stack
        .shared()
        .classes
        .borrow_mut()
        .insert(TypeId::of::<T>(), descriptor);
    Ok(())
}
