//! Type marshaling - native ↔ runtime stack conversions
//!
//! Design: one trait pair selects the push/read strategy per type at compile
//! time; reads never pop, callers own the depth.
//!
//! Architecture:
//! - `primitives.rs` - booleans, integers, floats, strings, bytes, `Option`
//! - `containers.rs` - sequences and maps as tables
//! - `pointer.rs` - raw pointers (light userdata or borrowed class instance)
//! - `object.rs` - registered classes by value
//! - `multi.rs` - argument and result packs

mod containers;
mod multi;
mod object;
mod pointer;
mod primitives;

pub use multi::{FromLuaMulti, IntoLuaMulti};
pub use primitives::Bytes;

use crate::error::Result;
use crate::stack::Stack;

/// Types that can be pushed onto the runtime stack
pub trait IntoLua {
    /// Push exactly one slot
    fn push_lua(self, stack: &Stack);
}

/// Types that can be read from a runtime stack slot
pub trait FromLua: Sized {
    /// Convert the slot at `index` without popping it
    fn from_lua(stack: &Stack, index: i32) -> Result<Self>;
}
