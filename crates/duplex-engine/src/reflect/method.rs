//! Method, function and constructor descriptors

use std::any::TypeId;
use std::fmt;
use std::rc::Rc;

use duplex_sdk::{GuestResult, GuestValue, NativeError, NativeType, RuntimeTag, Signature};

use super::invoke::{ConstInvoker, CtorInvoker, MutInvoker, StaticInvoker};
use crate::bridge::Reference;
use crate::registry::Registry;

/// How a descriptor receives its object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constness {
    /// Bound to `&T`
    Const,
    /// Bound to `&mut T`
    Mut,
    /// No receiver
    Static,
}

pub(crate) enum Invoker {
    Const(ConstInvoker),
    Mut(MutInvoker),
    Static(StaticInvoker),
}

/// One overload of a method or global function
pub struct MethodDescriptor {
    name: String,
    signature: Signature,
    returns: NativeType,
    declaring: Option<TypeId>,
    invoker: Invoker,
}

/// Global functions share the method descriptor shape
pub type FunctionDescriptor = MethodDescriptor;

impl MethodDescriptor {
    pub(crate) fn new(
        name: impl Into<String>,
        signature: Signature,
        returns: NativeType,
        declaring: Option<TypeId>,
        invoker: Invoker,
    ) -> Self {
        Self {
            name: name.into(),
            signature,
            returns,
            declaring,
            invoker,
        }
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameters
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub(crate) fn signature_mut(&mut self) -> &mut Signature {
        &mut self.signature
    }

    /// Declared return type
    pub fn returns(&self) -> &NativeType {
        &self.returns
    }

    pub(crate) fn returns_mut(&mut self) -> &mut NativeType {
        &mut self.returns
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.signature.len()
    }

    /// Receiver kind
    pub fn constness(&self) -> Constness {
        match self.invoker {
            Invoker::Const(_) => Constness::Const,
            Invoker::Mut(_) => Constness::Mut,
            Invoker::Static(_) => Constness::Static,
        }
    }

    /// True for static methods and global functions
    pub fn is_static(&self) -> bool {
        self.constness() == Constness::Static
    }

    /// Invoke with converted-in-place arguments.
    ///
    /// Bound methods need a `receiver`; it is viewed as the declaring class,
    /// casting through registered bases when the method is inherited.
    pub fn invoke(
        &self,
        receiver: Option<&Reference>,
        registry: &Registry,
        args: &mut [GuestValue],
        rt: RuntimeTag,
    ) -> GuestResult<GuestValue> {
        match &self.invoker {
            Invoker::Static(invoke) => invoke(args, rt),
            Invoker::Const(invoke) => {
                let (receiver, declaring) = self.bound_receiver(receiver)?;
                receiver.with_ref(Some(registry), declaring, |this| invoke(this, args, rt))?
            }
            Invoker::Mut(invoke) => {
                let (receiver, declaring) = self.bound_receiver(receiver)?;
                receiver.with_mut(Some(registry), declaring, |this| invoke(this, args, rt))?
            }
        }
    }

    fn bound_receiver<'a>(
        &self,
        receiver: Option<&'a Reference>,
    ) -> GuestResult<(&'a Reference, TypeId)> {
        let receiver =
            receiver.ok_or_else(|| NativeError::mismatch(format!("receiver of {}", self.name), "nil"))?;
        Ok((receiver, self.declaring.unwrap_or_else(|| receiver.native_type_id())))
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("signature", &self.signature.to_string())
            .field("returns", &self.returns.to_string())
            .field("constness", &self.constness())
            .finish()
    }
}

/// One constructor overload
pub struct ConstructorDescriptor {
    signature: Signature,
    invoker: CtorInvoker,
}

impl ConstructorDescriptor {
    pub(crate) fn new(signature: Signature, invoker: CtorInvoker) -> Self {
        Self { signature, invoker }
    }

    /// Declared parameters
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub(crate) fn signature_mut(&mut self) -> &mut Signature {
        &mut self.signature
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.signature.len()
    }

    /// Build the object. The returned record carries one native retain the
    /// caller must release.
    pub fn invoke(&self, args: &mut [GuestValue], rt: RuntimeTag) -> GuestResult<Rc<Reference>> {
        (self.invoker)(args, rt)
    }
}

impl fmt::Debug for ConstructorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDescriptor")
            .field("signature", &self.signature.to_string())
            .finish()
    }
}
