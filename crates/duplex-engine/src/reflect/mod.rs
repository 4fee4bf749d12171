//! Descriptor model
//!
//! ```text
//! ClassDescriptor
//!   +-- parents: [parent1, parent2]      (ClassId back-references)
//!   +-- attributes: AttributeDescriptor  (get / set by name)
//!   +-- methods: name -> [MethodDescriptor]   (overloads)
//!   +-- constructors: [ConstructorDescriptor]
//!   +-- enums: [EnumDescriptor]
//!   +-- info: ClassInfo                  (TypeId, upcasts, adapter slots)
//! ```
//!
//! Descriptors are built once by a [`ClassBuilder`] while the registry
//! initializes and never change afterwards.

mod attribute;
mod class;
mod enumeration;
mod invoke;
mod method;

pub use attribute::AttributeDescriptor;
pub use class::{ClassBuilder, ClassDescriptor, ClassId, ClassInfo, Upcast};
pub use enumeration::EnumDescriptor;
pub use invoke::{ConstMethod, Ctor, MutMethod, StaticFn, MAX_ARITY};
pub use method::{Constness, ConstructorDescriptor, FunctionDescriptor, MethodDescriptor};

pub(crate) use class::static_descriptor;
