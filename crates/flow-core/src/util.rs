//! Small shared helpers used across the operator modules.

use std::cell::RefCell;
use std::rc::Rc;

/// A clone-on-write vector: readers take a cheap `Rc` snapshot so they can
/// iterate without holding a borrow across a callback that might itself
/// mutate the vector (registering/unregistering an observer from inside its
/// own `on_next`, for instance). Mutators pay a full clone only when the
/// `Rc` is actually shared with a live snapshot.
pub(crate) struct CowVector<T> {
    inner: RefCell<Rc<Vec<T>>>,
}

impl<T: Clone> CowVector<T> {
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(Rc::new(Vec::new())),
        }
    }

    pub fn snapshot(&self) -> Rc<Vec<T>> {
        self.inner.borrow().clone()
    }

    pub fn push(&self, value: T) {
        let mut slot = self.inner.borrow_mut();
        Rc::make_mut(&mut slot).push(value);
    }

    pub fn retain(&self, mut keep: impl FnMut(&T) -> bool) {
        let mut slot = self.inner.borrow_mut();
        Rc::make_mut(&mut slot).retain(|item| keep(item));
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }
}

impl<T: Clone> Default for CowVector<T> {
    fn default() -> Self {
        Self::new()
    }
}
