//! Entry points for guest adapters
//!
//! An adapter turns guest call syntax into one of these calls. Each one
//! resolves the target, converts the arguments, runs native code behind the
//! exception barrier and hands back a guest value or a guest-catchable
//! [`CallError`]. The given registry is the current one while the call runs.
//!
//! ```ignore
//! let registry = duplex_engine::registry::init_global()?;
//! let shape = dispatch::construct(registry, "Shape", &mut [], rt)?;
//! let area = dispatch::call_method(registry, &shape, "area", &mut [GuestValue::Float(2.0)], rt)?;
//! ```

use duplex_sdk::{GuestValue, NativeError, RuntimeTag};

use crate::barrier::protect;
use crate::bridge::{receiver_reference, wrap_for_guest, Reference};
use crate::error::{CallError, ResolutionError};
use crate::reflect::{AttributeDescriptor, ClassDescriptor, EnumDescriptor};
use crate::registry::{self, Registry};
use crate::resolve::{resolve_constructor, resolve_function, resolve_method};

fn receiver_class<'r>(
    registry: &'r Registry,
    reference: &Reference,
) -> Result<&'r ClassDescriptor, CallError> {
    registry
        .class_by_type_id(reference.native_type_id())
        .ok_or_else(|| NativeError::NotExported(reference.type_name().to_string()).into())
}

/// Run `f` behind the barrier with `registry` current
fn guarded<T>(
    registry: &Registry,
    f: impl FnOnce() -> Result<T, CallError>,
) -> Result<T, CallError> {
    registry::scoped(registry, || protect(f))
}

fn class_named<'r>(registry: &'r Registry, class: &str) -> Result<&'r ClassDescriptor, CallError> {
    registry
        .get_class(class)
        .ok_or_else(|| ResolutionError::UnknownClass(class.to_string()).into())
}

/// Call a method on the object held by `receiver`
pub fn call_method(
    registry: &Registry,
    receiver: &GuestValue,
    name: &str,
    args: &mut [GuestValue],
    rt: RuntimeTag,
) -> Result<GuestValue, CallError> {
    guarded(registry, || {
        let reference = receiver_reference(receiver)?;
        let class = receiver_class(registry, &reference)?;
        let call = GuestValue::call_signature(args);
        let method = resolve_method(registry, class, name, &call)?;
        Ok(method.invoke(Some(&reference), registry, args, rt)?)
    })
}

/// Call a static method of `class`
pub fn call_static(
    registry: &Registry,
    class: &str,
    name: &str,
    args: &mut [GuestValue],
    rt: RuntimeTag,
) -> Result<GuestValue, CallError> {
    guarded(registry, || {
        let class = class_named(registry, class)?;
        let call = GuestValue::call_signature(args);
        let function = resolve_function(registry, Some(class), name, &call)?;
        Ok(function.invoke(None, registry, args, rt)?)
    })
}

/// Call a global function
pub fn call_function(
    registry: &Registry,
    name: &str,
    args: &mut [GuestValue],
    rt: RuntimeTag,
) -> Result<GuestValue, CallError> {
    guarded(registry, || {
        let call = GuestValue::call_signature(args);
        let function = resolve_function(registry, None, name, &call)?;
        Ok(function.invoke(None, registry, args, rt)?)
    })
}

/// Construct an object of `class` and hand it to runtime `rt`
pub fn construct(
    registry: &Registry,
    class: &str,
    args: &mut [GuestValue],
    rt: RuntimeTag,
) -> Result<GuestValue, CallError> {
    guarded(registry, || {
        let class = class_named(registry, class)?;
        let call = GuestValue::call_signature(args);
        let constructor = resolve_constructor(registry, class, &call)?;
        let reference = constructor.invoke(args, rt)?;
        let wrapped = wrap_for_guest(registry, &reference, rt);
        // Hand ownership to the guest wrapper; destroys the object if
        // wrapping failed.
        reference.release_from_native();
        Ok(GuestValue::Object(wrapped?))
    })
}

/// Attribute `name` of `class`, searching parent1 then parent2
pub fn find_attribute<'r>(
    registry: &'r Registry,
    class: &'r ClassDescriptor,
    name: &str,
) -> Option<&'r AttributeDescriptor> {
    class
        .attribute(name)
        .or_else(|| registry.parent1(class).and_then(|p| find_attribute(registry, p, name)))
        .or_else(|| registry.parent2(class).and_then(|p| find_attribute(registry, p, name)))
}

fn attribute_of<'r>(
    registry: &'r Registry,
    class: &'r ClassDescriptor,
    name: &str,
) -> Result<&'r AttributeDescriptor, CallError> {
    find_attribute(registry, class, name).ok_or_else(|| {
        ResolutionError::NoSuchAttribute {
            class: class.name().to_string(),
            name: name.to_string(),
        }
        .into()
    })
}

/// Read attribute `name` of the object held by `receiver`
pub fn get_attribute(
    registry: &Registry,
    receiver: &GuestValue,
    name: &str,
    rt: RuntimeTag,
) -> Result<GuestValue, CallError> {
    guarded(registry, || {
        let reference = receiver_reference(receiver)?;
        let class = receiver_class(registry, &reference)?;
        Ok(attribute_of(registry, class, name)?.get(&reference, registry, rt)?)
    })
}

/// Assign attribute `name` of the object held by `receiver`
pub fn set_attribute(
    registry: &Registry,
    receiver: &GuestValue,
    name: &str,
    value: GuestValue,
    rt: RuntimeTag,
) -> Result<GuestValue, CallError> {
    guarded(registry, || {
        let reference = receiver_reference(receiver)?;
        let class = receiver_class(registry, &reference)?;
        Ok(attribute_of(registry, class, name)?.set(&reference, registry, value, rt)?)
    })
}

fn find_enum<'r>(
    registry: &'r Registry,
    class: &'r ClassDescriptor,
    name: &str,
) -> Option<&'r EnumDescriptor> {
    class
        .enumeration(name)
        .or_else(|| registry.parent1(class).and_then(|p| find_enum(registry, p, name)))
        .or_else(|| registry.parent2(class).and_then(|p| find_enum(registry, p, name)))
}

/// Integer value of `class::enumeration::value`
pub fn enum_value(
    registry: &Registry,
    class: &str,
    enumeration: &str,
    value: &str,
) -> Result<i64, CallError> {
    let descriptor = class_named(registry, class)?;
    find_enum(registry, descriptor, enumeration)
        .and_then(|e| e.value(value))
        .ok_or_else(|| {
            ResolutionError::NoSuchEnumValue {
                class: class.to_string(),
                enumeration: enumeration.to_string(),
                value: value.to_string(),
            }
            .into()
        })
}
