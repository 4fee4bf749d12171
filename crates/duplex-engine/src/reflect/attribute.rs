//! Attribute descriptors

use std::any::TypeId;
use std::fmt;

use duplex_sdk::{FromGuest, GuestResult, GuestValue, NativeError, NativeType, RuntimeTag, ToGuest};

use crate::bridge::Reference;
use crate::registry::Registry;

type Getter =
    Box<dyn Fn(&Reference, &Registry, RuntimeTag) -> GuestResult<GuestValue> + Send + Sync>;
type Setter =
    Box<dyn Fn(&Reference, &Registry, &GuestValue, RuntimeTag) -> GuestResult<()> + Send + Sync>;

/// A native data member exposed by name
pub struct AttributeDescriptor {
    name: String,
    ty: NativeType,
    getter: Getter,
    setter: Option<Setter>,
}

impl AttributeDescriptor {
    /// Read-write attribute over the field selected by `get` / `get_mut`
    pub(crate) fn read_write<T, A, G, M>(name: &str, get: G, get_mut: M) -> Self
    where
        T: 'static,
        A: ToGuest + FromGuest + 'static,
        G: Fn(&T) -> &A + Send + Sync + 'static,
        M: Fn(&mut T) -> &mut A + Send + Sync + 'static,
    {
        let setter_name = name.to_string();
        let setter: Setter = Box::new(move |receiver, registry, value, rt| {
            // Convert before borrowing so conversions may touch the receiver.
            let value = A::from_guest(value, rt).map_err(|e| e.at_attribute(setter_name.as_str()))?;
            receiver.with_mut(Some(registry), TypeId::of::<T>(), |this| {
                this.downcast_mut::<T>().map(|this| *get_mut(this) = value)
            })?
            .ok_or_else(|| NativeError::mismatch(std::any::type_name::<T>(), receiver.type_name()))
        });
        Self {
            setter: Some(setter),
            ..Self::read_only::<T, A, G>(name, get)
        }
    }

    /// Attribute without setter
    pub(crate) fn read_only<T, A, G>(name: &str, get: G) -> Self
    where
        T: 'static,
        A: ToGuest + 'static,
        G: Fn(&T) -> &A + Send + Sync + 'static,
    {
        let getter: Getter = Box::new(move |receiver, registry, rt| {
            receiver.with_ref(Some(registry), TypeId::of::<T>(), |this| {
                this.downcast_ref::<T>().map(|this| get(this).to_guest(rt))
            })?
            .unwrap_or_else(|| {
                Err(NativeError::mismatch(std::any::type_name::<T>(), receiver.type_name()))
            })
        });
        Self {
            name: name.to_string(),
            ty: A::native_type(),
            getter,
            setter: None,
        }
    }

    /// Attribute name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared native type
    pub fn native_type(&self) -> &NativeType {
        &self.ty
    }

    pub(crate) fn native_type_mut(&mut self) -> &mut NativeType {
        &mut self.ty
    }

    /// True when `set` is rejected
    pub fn is_read_only(&self) -> bool {
        self.setter.is_none()
    }

    /// Read the attribute of `receiver`
    pub fn get(
        &self,
        receiver: &Reference,
        registry: &Registry,
        rt: RuntimeTag,
    ) -> GuestResult<GuestValue> {
        (self.getter)(receiver, registry, rt).map_err(|e| e.at_attribute(self.name.as_str()))
    }

    /// Assign the attribute of `receiver`; returns the assigned value
    pub fn set(
        &self,
        receiver: &Reference,
        registry: &Registry,
        value: GuestValue,
        rt: RuntimeTag,
    ) -> GuestResult<GuestValue> {
        let setter = self
            .setter
            .as_ref()
            .ok_or_else(|| NativeError::ReadOnly(self.name.clone()))?;
        setter(receiver, registry, &value, rt)?;
        Ok(value)
    }
}

impl fmt::Debug for AttributeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeDescriptor")
            .field("name", &self.name)
            .field("type", &self.ty.to_string())
            .field("read_only", &self.is_read_only())
            .finish()
    }
}
