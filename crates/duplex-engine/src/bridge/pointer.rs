//! Type-erased ownership of a bridged native object

use std::any::{Any, TypeId};
use std::cell::{BorrowError, BorrowMutError, RefCell};
use std::rc::Rc;

/// Owner of one native object, independent of its concrete type.
pub trait AbstractPointer {
    /// Address of the native object
    fn raw_pointer(&self) -> *const ();
    /// `TypeId` of the concrete native type
    fn native_type_id(&self) -> TypeId;
    /// Rust path of the concrete native type
    fn native_type_name(&self) -> &'static str;
    /// True when final destruction is delegated to a shared owner
    fn is_shared(&self) -> bool;
    /// Run `f` with a shared borrow of the object
    fn visit(&self, f: &mut dyn FnMut(&dyn Any)) -> Result<(), BorrowError>;
    /// Run `f` with an exclusive borrow of the object
    fn visit_mut(&self, f: &mut dyn FnMut(&mut dyn Any)) -> Result<(), BorrowMutError>;
}

/// Concrete owner: either the sole owner, or one of several `Rc` holders.
pub(crate) enum ConcretePointer<T> {
    Exclusive(RefCell<T>),
    Shared(Rc<RefCell<T>>),
}

impl<T> ConcretePointer<T> {
    fn cell(&self) -> &RefCell<T> {
        match self {
            ConcretePointer::Exclusive(cell) => cell,
            ConcretePointer::Shared(rc) => rc,
        }
    }
}

impl<T: 'static> AbstractPointer for ConcretePointer<T> {
    fn raw_pointer(&self) -> *const () {
        self.cell() as *const RefCell<T> as *const ()
    }

    fn native_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn native_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn is_shared(&self) -> bool {
        matches!(self, ConcretePointer::Shared(_))
    }

    fn visit(&self, f: &mut dyn FnMut(&dyn Any)) -> Result<(), BorrowError> {
        let guard = self.cell().try_borrow()?;
        f(&*guard);
        Ok(())
    }

    fn visit_mut(&self, f: &mut dyn FnMut(&mut dyn Any)) -> Result<(), BorrowMutError> {
        let mut guard = self.cell().try_borrow_mut()?;
        f(&mut *guard);
        Ok(())
    }
}
