//! Variadic capture - trailing arguments read lazily by position

use crate::error::{Error, Result};
use crate::marshal::FromLua;
use crate::stack::{Kind, Stack};

/// Arguments beyond a function's declared parameters
///
/// Only valid inside the native call that received it. Positions are
/// absolute stack slots fixed at capture time, so values pushed afterwards
/// (for example a function about to be called) do not shift them.
#[derive(Clone)]
pub struct Variadic {
    stack: Stack,
    first: i32,
    len: usize,
}

impl Variadic {
    pub(crate) fn capture(stack: &Stack, first: i32) -> Self {
        let len = (stack.top() - first + 1).max(0) as usize;
        Self {
            stack: stack.clone(),
            first,
            len,
        }
    }

    /// Number of extra arguments
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Convert argument `i` (0-based); repeatable, nothing is popped
    pub fn get<T: FromLua>(&self, i: usize) -> Result<T> {
        let index = self.slot(i)?;
        T::from_lua(&self.stack, index)
    }

    /// Runtime type of argument `i`, `Kind::None` when out of range
    pub fn kind(&self, i: usize) -> Kind {
        match self.slot(i) {
            Ok(index) => self.stack.kind(index),
            Err(_) => Kind::None,
        }
    }

    /// Every argument converted to `T`
    pub fn collect<T: FromLua>(&self) -> Result<Vec<T>> {
        (0..self.len).map(|i| self.get(i)).collect()
    }

    fn slot(&self, i: usize) -> Result<i32> {
        if self.stack.shared().is_closed() {
            return Err(Error::ContextClosed);
        }
        if i >= self.len {
            return Err(Error::mismatch("argument", Kind::None.name()));
        }
        Ok(self.first + i as i32)
    }
}

impl std::fmt::Debug for Variadic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variadic")
            .field("first", &self.first)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Context;

    #[test]
    fn test_window_over_pushed_slots() {
        let ctx = Context::new(false);
        let stack = ctx.stack();
        let _guard = stack.guard();

        let first = stack.top() + 1;
        stack.push_int(2);
        stack.push_string("three");
        stack.push_bool(true);

        let rest = Variadic::capture(stack, first);
        assert_eq!(rest.len(), 3);
        assert_eq!(rest.get::<i64>(0).unwrap(), 2);
        assert_eq!(rest.get::<i64>(0).unwrap(), 2);
        assert_eq!(rest.get::<String>(1).unwrap(), "three");
        assert_eq!(rest.kind(2), Kind::Boolean);
        assert_eq!(rest.kind(3), Kind::None);
        assert!(rest.get::<i64>(3).is_err());

        // Pushing above the window leaves its positions intact
        stack.push_int(99);
        assert_eq!(rest.get::<i64>(0).unwrap(), 2);
    }

    #[test]
    fn test_empty_window() {
        let ctx = Context::new(false);
        let stack = ctx.stack();
        let rest = Variadic::capture(stack, stack.top() + 1);
        assert!(rest.is_empty());
        assert_eq!(rest.collect::<i64>().unwrap(), Vec::<i64>::new());
    }
}
