//! Class descriptors and the per-class builder

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use duplex_sdk::{FromGuest, NativeType, RuntimeTag, Signature, ToGuest};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::attribute::AttributeDescriptor;
use super::enumeration::EnumDescriptor;
use super::invoke::{ConstMethod, Ctor, MutMethod, StaticFn};
use super::method::{ConstructorDescriptor, Invoker, MethodDescriptor};

/// Index of a class in registry initialization order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    /// Position in [`Registry::get_classes`](crate::registry::Registry::get_classes)
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ============================================================================
// ClassInfo
// ============================================================================

type CastRef = fn(&dyn Any) -> Option<&dyn Any>;
type CastMut = fn(&mut dyn Any) -> Option<&mut dyn Any>;

/// One registered step from a class to a direct base
#[derive(Clone, Copy)]
pub struct Upcast {
    /// Base class type
    pub parent: TypeId,
    pub(crate) cast_ref: CastRef,
    pub(crate) cast_mut: CastMut,
}

impl Upcast {
    pub(crate) fn of<T, P>() -> Self
    where
        T: AsRef<P> + AsMut<P> + 'static,
        P: 'static,
    {
        fn cast_ref<T: AsRef<P> + 'static, P: 'static>(any: &dyn Any) -> Option<&dyn Any> {
            any.downcast_ref::<T>().map(|t| t.as_ref() as &dyn Any)
        }
        fn cast_mut<T: AsMut<P> + 'static, P: 'static>(any: &mut dyn Any) -> Option<&mut dyn Any> {
            any.downcast_mut::<T>().map(|t| t.as_mut() as &mut dyn Any)
        }
        Self {
            parent: TypeId::of::<P>(),
            cast_ref: cast_ref::<T, P>,
            cast_mut: cast_mut::<T, P>,
        }
    }
}

impl fmt::Debug for Upcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upcast").field("parent", &self.parent).finish()
    }
}

/// Native identity of a class plus the adapter extension block
pub struct ClassInfo {
    type_id: TypeId,
    type_name: &'static str,
    upcasts: Vec<Upcast>,
    extensions: RwLock<FxHashMap<RuntimeTag, Arc<dyn Any + Send + Sync>>>,
}

impl ClassInfo {
    pub(crate) fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            upcasts: Vec::new(),
            extensions: RwLock::new(FxHashMap::default()),
        }
    }

    /// Native type
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Rust path of the native type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Registered casts to direct bases
    pub fn upcasts(&self) -> &[Upcast] {
        &self.upcasts
    }

    pub(crate) fn set_upcasts(&mut self, upcasts: Vec<Upcast>) {
        self.upcasts = upcasts;
    }

    /// Cache adapter data (e.g. the guest class object) for runtime `rt`
    pub fn set_extension<E: Any + Send + Sync>(&self, rt: RuntimeTag, extension: E) {
        self.extensions.write().insert(rt, Arc::new(extension));
    }

    /// Adapter data cached for runtime `rt`
    pub fn extension<E: Any + Send + Sync>(&self, rt: RuntimeTag) -> Option<Arc<E>> {
        let ext = self.extensions.read().get(&rt).cloned()?;
        ext.downcast::<E>().ok()
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("type_name", &self.type_name)
            .field("upcasts", &self.upcasts.len())
            .field("extensions", &self.extensions.read().len())
            .finish()
    }
}

// ============================================================================
// ClassDescriptor
// ============================================================================

/// Everything the guest side can reach on one native class
#[derive(Debug)]
pub struct ClassDescriptor {
    pub(crate) id: ClassId,
    name: String,
    pub(crate) parents: [Option<ClassId>; 2],
    attributes: Vec<AttributeDescriptor>,
    methods: FxHashMap<String, Vec<MethodDescriptor>>,
    method_names: Vec<String>,
    constructors: Vec<ConstructorDescriptor>,
    enums: Vec<EnumDescriptor>,
    info: ClassInfo,
}

impl ClassDescriptor {
    /// Registry position
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Registered class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First base class
    pub fn parent1(&self) -> Option<ClassId> {
        self.parents[0]
    }

    /// Second base class
    pub fn parent2(&self) -> Option<ClassId> {
        self.parents[1]
    }

    /// Attributes declared by this class, in declaration order
    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    /// Attribute declared by this class
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    /// Method names with their overloads, in declaration order
    pub fn methods(&self) -> impl Iterator<Item = (&str, &[MethodDescriptor])> {
        self.method_names
            .iter()
            .filter_map(|name| self.methods.get(name).map(|m| (name.as_str(), m.as_slice())))
    }

    /// Overloads declared by this class under `name`
    pub fn overloads(&self, name: &str) -> &[MethodDescriptor] {
        self.methods.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Constructors, in declaration order
    pub fn constructors(&self) -> &[ConstructorDescriptor] {
        &self.constructors
    }

    /// Enumerations
    pub fn enums(&self) -> &[EnumDescriptor] {
        &self.enums
    }

    /// Enumeration by name
    pub fn enumeration(&self, name: &str) -> Option<&EnumDescriptor> {
        self.enums.iter().find(|e| e.name() == name)
    }

    /// Native identity and adapter extensions
    pub fn info(&self) -> &ClassInfo {
        &self.info
    }

    pub(crate) fn info_mut(&mut self) -> &mut ClassInfo {
        &mut self.info
    }

    pub(crate) fn for_each_signature_mut(&mut self, f: &mut dyn FnMut(&mut Signature)) {
        for overloads in self.methods.values_mut() {
            for method in overloads {
                f(method.signature_mut());
            }
        }
        for ctor in &mut self.constructors {
            f(ctor.signature_mut());
        }
    }

    pub(crate) fn for_each_declared_type_mut(&mut self, f: &mut dyn FnMut(&mut NativeType)) {
        for overloads in self.methods.values_mut() {
            for method in overloads {
                f(method.returns_mut());
            }
        }
        for attribute in &mut self.attributes {
            f(attribute.native_type_mut());
        }
    }
}

// ============================================================================
// ClassBuilder
// ============================================================================

/// Collects the descriptors of class `T` at registration time.
///
/// ```ignore
/// registry.register_class::<Shape>("Shape", |c| {
///     c.constructor(|| Shape::default())
///         .attribute("scale", |s: &Shape| &s.scale, |s: &mut Shape| &mut s.scale)
///         .method("area", Shape::area)
///         .method("area", Shape::scaled_area)
///         .enumeration("Kind", [("Circle", 0), ("Square", 1)])
/// });
/// ```
pub struct ClassBuilder<T> {
    name: String,
    attributes: Vec<AttributeDescriptor>,
    methods: Vec<MethodDescriptor>,
    constructors: Vec<ConstructorDescriptor>,
    enums: Vec<EnumDescriptor>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> ClassBuilder<T> {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            enums: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Read-write attribute
    pub fn attribute<A, G, M>(mut self, name: &str, get: G, get_mut: M) -> Self
    where
        A: ToGuest + FromGuest + 'static,
        G: Fn(&T) -> &A + Send + Sync + 'static,
        M: Fn(&mut T) -> &mut A + Send + Sync + 'static,
    {
        self.attributes
            .push(AttributeDescriptor::read_write::<T, A, G, M>(name, get, get_mut));
        self
    }

    /// Read-only attribute
    pub fn readonly<A, G>(mut self, name: &str, get: G) -> Self
    where
        A: ToGuest + 'static,
        G: Fn(&T) -> &A + Send + Sync + 'static,
    {
        self.attributes
            .push(AttributeDescriptor::read_only::<T, A, G>(name, get));
        self
    }

    /// Method on `&T`
    pub fn method<Args, F: ConstMethod<T, Args>>(mut self, name: &str, f: F) -> Self {
        self.methods.push(MethodDescriptor::new(
            name,
            Signature::new(F::params()),
            F::returns(),
            Some(TypeId::of::<T>()),
            Invoker::Const(f.into_invoker()),
        ));
        self
    }

    /// Method on `&mut T`
    pub fn method_mut<Args, F: MutMethod<T, Args>>(mut self, name: &str, f: F) -> Self {
        self.methods.push(MethodDescriptor::new(
            name,
            Signature::new(F::params()),
            F::returns(),
            Some(TypeId::of::<T>()),
            Invoker::Mut(f.into_invoker()),
        ));
        self
    }

    /// Static method
    pub fn function<Args, F: StaticFn<Args>>(mut self, name: &str, f: F) -> Self {
        self.methods.push(static_descriptor(name, f));
        self
    }

    /// Constructor overload
    pub fn constructor<Args, F: Ctor<T, Args>>(mut self, f: F) -> Self {
        self.constructors.push(ConstructorDescriptor::new(
            Signature::new(F::params()),
            f.into_invoker(),
        ));
        self
    }

    /// Enumeration of named integer constants
    pub fn enumeration<S: Into<String>>(
        mut self,
        name: &str,
        values: impl IntoIterator<Item = (S, i64)>,
    ) -> Self {
        self.enums.push(EnumDescriptor::new(name, values));
        self
    }

    pub(crate) fn build(self) -> ClassDescriptor {
        let mut methods: FxHashMap<String, Vec<MethodDescriptor>> = FxHashMap::default();
        let mut method_names = Vec::new();
        for method in self.methods {
            if !methods.contains_key(method.name()) {
                method_names.push(method.name().to_string());
            }
            methods
                .entry(method.name().to_string())
                .or_default()
                .push(method);
        }
        ClassDescriptor {
            id: ClassId(0),
            name: self.name,
            parents: [None, None],
            attributes: self.attributes,
            methods,
            method_names,
            constructors: self.constructors,
            enums: self.enums,
            info: ClassInfo::of::<T>(),
        }
    }
}

pub(crate) fn static_descriptor<Args, F: StaticFn<Args>>(name: &str, f: F) -> MethodDescriptor {
    MethodDescriptor::new(
        name,
        Signature::new(F::params()),
        F::returns(),
        None,
        Invoker::Static(f.into_invoker()),
    )
}
