//! Overload resolution
//!
//! Picks one descriptor among the overloads registered under a name, given
//! the native types presented by the guest arguments.
//!
//! Each declared parameter is compared with its argument and graded:
//!
//! | call site                 | declared               | fit        |
//! |---------------------------|------------------------|------------|
//! | same type                 | same type              | exact      |
//! | any value                 | `any`                  | compatible |
//! | aliased type              | alias target           | compatible |
//! | integer                   | any integer or float   | compatible |
//! | `f64`                     | `f32`                  | compatible |
//! | `nil`                     | registered class       | compatible |
//! | class                     | one of its bases       | compatible |
//! | `empty array` / `map`     | any array / map        | compatible |
//! | `array<a>`, `map<k, v>`   | element-wise           | recursive  |
//! | mixed array members       | every member must fit  | compatible |
//!
//! A signature fits with its weakest parameter. The best-fitting overload
//! wins. Among compatible overloads the most specific one wins: each
//! argument costs the conversion it needs (one step per base class walked,
//! integer to integer before integer to float, `any` last) and the lowest
//! total is picked. Remaining ties go to registration order. When nothing
//! fits, the class chain is searched through `parent1`.

use duplex_sdk::{CallSignature, NativeType, Signature};

use crate::error::{CallableKind, ResolutionError};
use crate::logging::debug;
use crate::reflect::{ClassDescriptor, ConstructorDescriptor, MethodDescriptor, MAX_ARITY};
use crate::registry::{Registry, GLOBAL_OWNER};

/// How well an argument satisfies a declared parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Fit {
    /// Not acceptable
    No,
    /// Acceptable through widening, nil, ancestry or an alias
    Compatible,
    /// Identical types
    Exact,
}

/// Grade one argument against one declared parameter type
pub fn type_fit(registry: &Registry, call: &NativeType, declared: &NativeType) -> Fit {
    if call == declared {
        return Fit::Exact;
    }
    if matches!(declared, NativeType::Any) {
        return Fit::Compatible;
    }
    if registry
        .aliases()
        .iter()
        .any(|(guest, native)| guest == call && native == declared)
    {
        return Fit::Compatible;
    }
    match (call, declared) {
        (NativeType::AnyOf(members), _) => members
            .iter()
            .map(|m| type_fit(registry, m, declared).min(Fit::Compatible))
            .min()
            .unwrap_or(Fit::No),
        (c, d) if c.is_integer() && (d.is_integer() || d.is_float()) => Fit::Compatible,
        (NativeType::F64, NativeType::F32) => Fit::Compatible,
        (NativeType::Nil, NativeType::Named(class)) if registry.get_class(class).is_some() => {
            Fit::Compatible
        }
        (NativeType::Named(derived), NativeType::Named(base)) => {
            // Synced native arrays report element types by Rust path.
            let derived = registry
                .type_name_to_class_name(derived)
                .unwrap_or(derived.as_str());
            if derived == base.as_str() {
                Fit::Exact
            } else if registry.is_ancestor(derived, base) {
                Fit::Compatible
            } else {
                Fit::No
            }
        }
        (NativeType::EmptySeq, NativeType::Seq(_)) => Fit::Compatible,
        (NativeType::EmptyMap, NativeType::Map(_, _)) => Fit::Compatible,
        (NativeType::Seq(c), NativeType::Seq(d)) => type_fit(registry, c, d).min(Fit::Compatible),
        (NativeType::Map(ck, cv), NativeType::Map(dk, dv)) => type_fit(registry, ck, dk)
            .min(type_fit(registry, cv, dv))
            .min(Fit::Compatible),
        _ => Fit::No,
    }
}

/// Grade a whole call against a declared signature
pub fn signature_fit(registry: &Registry, call: &CallSignature, declared: &Signature) -> Fit {
    if call.len() != declared.len() {
        return Fit::No;
    }
    call.types()
        .iter()
        .zip(declared.types())
        .map(|(c, d)| type_fit(registry, c, d))
        .min()
        .unwrap_or(Fit::Exact)
}

/// Cost of the conversion `type_fit` accepted; lower is more specific.
/// Only meaningful when the fit is not [`Fit::No`].
pub fn conversion_cost(registry: &Registry, call: &NativeType, declared: &NativeType) -> u32 {
    const ANY: u32 = 64;
    if call == declared {
        return 0;
    }
    if matches!(declared, NativeType::Any) {
        return ANY;
    }
    if registry
        .aliases()
        .iter()
        .any(|(guest, native)| guest == call && native == declared)
    {
        return 1;
    }
    match (call, declared) {
        (NativeType::AnyOf(members), _) => members
            .iter()
            .map(|m| conversion_cost(registry, m, declared))
            .max()
            .unwrap_or(0),
        (c, d) if c.is_integer() && d.is_integer() => 1,
        (c, d) if c.is_integer() && d.is_float() => 2,
        (NativeType::F64, NativeType::F32) => 1,
        (NativeType::Named(derived), NativeType::Named(base)) => {
            let derived = registry
                .type_name_to_class_name(derived)
                .unwrap_or(derived.as_str());
            registry.inheritance_distance(derived, base).unwrap_or(ANY)
        }
        (NativeType::Seq(c), NativeType::Seq(d)) => conversion_cost(registry, c, d),
        (NativeType::Map(ck, cv), NativeType::Map(dk, dv)) => {
            conversion_cost(registry, ck, dk) + conversion_cost(registry, cv, dv)
        }
        _ => 1,
    }
}

fn signature_cost(registry: &Registry, call: &CallSignature, declared: &Signature) -> u32 {
    call.types()
        .iter()
        .zip(declared.types())
        .map(|(c, d)| conversion_cost(registry, c, d))
        .sum()
}

fn select<'a, D: 'a>(
    registry: &Registry,
    candidates: impl Iterator<Item = &'a D>,
    signature: impl Fn(&D) -> &Signature,
    call: &CallSignature,
) -> Option<&'a D> {
    let mut best: Option<(&'a D, u32)> = None;
    for candidate in candidates {
        let declared = signature(candidate);
        match signature_fit(registry, call, declared) {
            Fit::No => continue,
            Fit::Exact => return Some(candidate),
            Fit::Compatible => {}
        }
        let cost = signature_cost(registry, call, declared);
        if best.map_or(true, |(_, c)| cost < c) {
            best = Some((candidate, cost));
        }
    }
    best.map(|(d, _)| d)
}

fn check_arity(call: &CallSignature) -> Result<(), ResolutionError> {
    if call.len() > MAX_ARITY {
        return Err(ResolutionError::TooManyArguments {
            got: call.len(),
            max: MAX_ARITY,
        });
    }
    Ok(())
}

/// Class and its `parent1` ancestors, nearest first
fn chain<'r>(registry: &'r Registry, class: &'r ClassDescriptor) -> impl Iterator<Item = &'r ClassDescriptor> {
    std::iter::successors(Some(class), move |c| registry.parent1(c))
}

fn resolve_in_chain<'r>(
    registry: &'r Registry,
    class: &'r ClassDescriptor,
    name: &str,
    call: &CallSignature,
    kind: CallableKind,
    accept: impl Fn(&MethodDescriptor) -> bool + Copy,
) -> Result<&'r MethodDescriptor, ResolutionError> {
    check_arity(call)?;
    for current in chain(registry, class) {
        let overloads = current.overloads(name).iter().filter(|m| accept(*m));
        if let Some(found) = select(registry, overloads, MethodDescriptor::signature, call) {
            return Ok(found);
        }
    }

    let listed = chain(registry, class).find(|c| c.overloads(name).iter().any(accept));
    let Some(owner) = listed else {
        debug!(class = class.name(), name, "no such method");
        return Err(ResolutionError::NoSuchMethod {
            class: class.name().to_string(),
            name: name.to_string(),
        });
    };
    debug!(class = owner.name(), name, call = %call, "signature mismatch");
    Err(ResolutionError::SignatureMismatch {
        kind,
        owner: owner.name().to_string(),
        name: name.to_string(),
        call: call.clone(),
        candidates: owner
            .overloads(name)
            .iter()
            .filter(|m| accept(*m))
            .map(|m| m.signature().clone())
            .collect(),
    })
}

/// Find the method `name` of `class` (bound or static) for a call
pub fn resolve_method<'r>(
    registry: &'r Registry,
    class: &'r ClassDescriptor,
    name: &str,
    call: &CallSignature,
) -> Result<&'r MethodDescriptor, ResolutionError> {
    resolve_in_chain(registry, class, name, call, CallableKind::Method, |_| true)
}

/// Find a global function (`class` is `None`) or a static method of `class`
pub fn resolve_function<'r>(
    registry: &'r Registry,
    class: Option<&'r ClassDescriptor>,
    name: &str,
    call: &CallSignature,
) -> Result<&'r MethodDescriptor, ResolutionError> {
    if let Some(class) = class {
        return resolve_in_chain(registry, class, name, call, CallableKind::Function, |m| {
            m.is_static()
        });
    }
    check_arity(call)?;
    let overloads = registry.functions(name);
    if overloads.is_empty() {
        debug!(name, "no such function");
        return Err(ResolutionError::NoSuchFunction(name.to_string()));
    }
    select(registry, overloads.iter(), MethodDescriptor::signature, call).ok_or_else(|| {
        debug!(name, call = %call, "signature mismatch");
        ResolutionError::SignatureMismatch {
            kind: CallableKind::Function,
            owner: GLOBAL_OWNER.to_string(),
            name: name.to_string(),
            call: call.clone(),
            candidates: overloads.iter().map(|f| f.signature().clone()).collect(),
        }
    })
}

/// Find the constructor of `class` for a call. Constructors are not
/// inherited.
pub fn resolve_constructor<'r>(
    registry: &'r Registry,
    class: &'r ClassDescriptor,
    call: &CallSignature,
) -> Result<&'r ConstructorDescriptor, ResolutionError> {
    check_arity(call)?;
    let constructors = class.constructors();
    if constructors.is_empty() {
        return Err(ResolutionError::NoConstructor(class.name().to_string()));
    }
    select(registry, constructors.iter(), ConstructorDescriptor::signature, call).ok_or_else(|| {
        debug!(class = class.name(), call = %call, "no matching constructor");
        ResolutionError::SignatureMismatch {
            kind: CallableKind::Constructor,
            owner: class.name().to_string(),
            name: class.name().to_string(),
            call: call.clone(),
            candidates: constructors.iter().map(|c| c.signature().clone()).collect(),
        }
    })
}
