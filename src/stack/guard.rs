use super::Stack;

/// Restores the stack depth it was created at when dropped
///
/// Every early return between acquire and drop unwinds to the same depth,
/// so a failed conversion cannot leak slots.
pub struct StackGuard<'a> {
    stack: &'a Stack,
    top: i32,
}

impl<'a> StackGuard<'a> {
    pub(crate) fn new(stack: &'a Stack) -> Self {
        Self {
            stack,
            top: stack.top(),
        }
    }

    /// Depth the guard will restore
    pub fn depth(&self) -> i32 {
        self.top
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        let current = self.stack.top();
        if current > self.top {
            self.stack.set_top(self.top);
        } else if current < self.top {
            tracing::warn!(
                expected = self.top,
                actual = current,
                "Stack popped below guarded depth"
            );
        }
    }
}
