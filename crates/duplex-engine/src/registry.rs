//! Class registry
//!
//! Two phases, enforced by type:
//!
//! ```text
//!   RegistryBuilder   register_class / register_function / add_type_alias
//!         |
//!         | init()      topological order, parent links, validation
//!         v
//!   Registry          read-only: lookups, ancestry, upcasts
//! ```
//!
//! Classes are initialized bases first. The inheritance edges form a graph
//! parent -> children; a depth-first walk from every class without parents
//! records each class after all its descendants, and reversing that list
//! puts every base before the classes derived from it. Classes that take
//! part in no inheritance edge go last.
//!
//! A process-wide instance is available through [`register_class`],
//! [`init_global`] and [`global`]. Dispatch entry points make their registry
//! [`current`] for the duration of a call, so conversions of `Native<T>`
//! values see the same classes resolution saw.

use std::any::{Any, TypeId};
use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr::NonNull;

use duplex_sdk::{NativeType, Signature};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::BridgeConfig;
use crate::error::ConfigError;
use crate::logging::debug;
use crate::reflect::{
    static_descriptor, ClassBuilder, ClassDescriptor, ClassId, FunctionDescriptor, StaticFn,
    Upcast,
};

/// Maximum number of direct base classes
pub const MAX_PARENTS: usize = 2;

/// Owner label used for global functions in diagnostics
pub const GLOBAL_OWNER: &str = "<global>";

// ============================================================================
// Pending phase
// ============================================================================

struct ParentDecl {
    type_id: TypeId,
    type_name: &'static str,
    upcast: Upcast,
}

struct PendingClass {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    init: Box<dyn FnOnce() -> ClassDescriptor + Send>,
    parents: Vec<ParentDecl>,
}

/// Registrations collected before [`RegistryBuilder::init`]
#[derive(Default)]
pub struct RegistryBuilder {
    pending: Vec<PendingClass>,
    functions: Vec<FunctionDescriptor>,
    aliases: Vec<(NativeType, NativeType)>,
}

/// Returned by [`RegistryBuilder::register_class`] to declare base classes
pub struct ClassRegistration<'a, T> {
    class: &'a mut PendingClass,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: 'static> ClassRegistration<'a, T> {
    /// Declare `P` as a direct base class of `T`.
    ///
    /// `T` embeds its base and exposes it through `AsRef` / `AsMut`; bound
    /// methods and attributes of `P` then work on `T` objects.
    pub fn parent<P: 'static>(self) -> Self
    where
        T: AsRef<P> + AsMut<P>,
    {
        self.class.parents.push(ParentDecl {
            type_id: TypeId::of::<P>(),
            type_name: std::any::type_name::<P>(),
            upcast: Upcast::of::<T, P>(),
        });
        self
    }
}

impl RegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register class `T` under `name`.
    ///
    /// `init` runs during [`init`](Self::init), after every base of `T` has
    /// been built.
    pub fn register_class<T: 'static>(
        &mut self,
        name: &str,
        init: impl FnOnce(ClassBuilder<T>) -> ClassBuilder<T> + Send + 'static,
    ) -> ClassRegistration<'_, T> {
        let class_name = name.to_string();
        self.pending.push(PendingClass {
            name: name.to_string(),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            init: Box::new(move || init(ClassBuilder::new(class_name)).build()),
            parents: Vec::new(),
        });
        let index = self.pending.len() - 1;
        ClassRegistration {
            class: &mut self.pending[index],
            _marker: PhantomData,
        }
    }

    /// Register a global function overload
    pub fn register_function<Args, F: StaticFn<Args>>(&mut self, name: &str, f: F) -> &mut Self {
        self.functions.push(static_descriptor(name, f));
        self
    }

    /// Let a guest value of type `guest` satisfy a `native` parameter
    pub fn add_type_alias(&mut self, guest: NativeType, native: NativeType) -> &mut Self {
        self.aliases.push((guest, native));
        self
    }

    /// Apply the `[[aliases]]` of a configuration
    pub fn apply_config(&mut self, config: &BridgeConfig) -> Result<&mut Self, ConfigError> {
        for (guest, native) in config.type_aliases()? {
            self.add_type_alias(guest, native);
        }
        Ok(self)
    }

    /// Number of registered classes
    pub fn class_count(&self) -> usize {
        self.pending.len()
    }

    /// Resolve the class topology and build every descriptor.
    pub fn init(self) -> Result<Registry, ConfigError> {
        let RegistryBuilder {
            pending,
            functions,
            aliases,
        } = self;

        let index_of = check_declarations(&pending)?;
        let order = topological_order(&pending, &index_of)?;

        let mut pending: Vec<Option<PendingClass>> = pending.into_iter().map(Some).collect();
        let mut classes = Vec::with_capacity(order.len());
        let mut declared_parents = Vec::with_capacity(order.len());
        for (position, &index) in order.iter().enumerate() {
            let Some(class) = pending[index].take() else {
                continue;
            };
            let mut descriptor = (class.init)();
            descriptor.id = ClassId(position as u32);
            descriptor
                .info_mut()
                .set_upcasts(class.parents.iter().map(|p| p.upcast).collect());
            declared_parents.push(class.parents.iter().map(|p| p.type_id).collect::<Vec<_>>());
            classes.push(descriptor);
        }

        let mut registry = Registry {
            classes,
            by_name: FxHashMap::default(),
            by_type: FxHashMap::default(),
            type_names: FxHashMap::default(),
            functions: FxHashMap::default(),
            function_names: Vec::new(),
            aliases,
        };
        registry.index_classes();

        // Second pass: parent links.
        for (position, parents) in declared_parents.into_iter().enumerate() {
            for (slot, parent) in parents.into_iter().enumerate() {
                let id = registry.by_type.get(&parent).copied();
                registry.classes[position].parents[slot] = id;
            }
        }

        for function in functions {
            if !registry.functions.contains_key(function.name()) {
                registry.function_names.push(function.name().to_string());
            }
            registry
                .functions
                .entry(function.name().to_string())
                .or_default()
                .push(function);
        }

        registry.normalize_type_names();
        registry.validate()?;

        debug!(
            classes = registry.classes.len(),
            functions = registry.functions.len(),
            order = ?registry.classes.iter().map(|c| c.name()).collect::<Vec<_>>(),
            "registry initialized"
        );
        Ok(registry)
    }
}

impl std::fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("classes", &self.pending.iter().map(|c| &c.name).collect::<Vec<_>>())
            .field("functions", &self.functions.len())
            .field("aliases", &self.aliases.len())
            .finish()
    }
}

/// Unique names and types, at most two parents, every parent registered.
fn check_declarations(pending: &[PendingClass]) -> Result<FxHashMap<TypeId, usize>, ConfigError> {
    let mut index_of = FxHashMap::default();
    let mut names = FxHashSet::default();
    for (i, class) in pending.iter().enumerate() {
        if !names.insert(class.name.as_str()) || index_of.insert(class.type_id, i).is_some() {
            return Err(ConfigError::DuplicateClass(class.name.clone()));
        }
    }
    for class in pending {
        if class.parents.len() > MAX_PARENTS {
            return Err(ConfigError::TooManyParents {
                class: class.name.clone(),
                count: class.parents.len(),
            });
        }
        if let Some(missing) = class
            .parents
            .iter()
            .find(|p| !index_of.contains_key(&p.type_id))
        {
            return Err(ConfigError::MissingBaseClass {
                class: class.name.clone(),
                base: missing.type_name.to_string(),
            });
        }
    }
    Ok(index_of)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Done,
}

/// Indices of `pending` with every base before its derived classes.
fn topological_order(
    pending: &[PendingClass],
    index_of: &FxHashMap<TypeId, usize>,
) -> Result<Vec<usize>, ConfigError> {
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); pending.len()];
    let mut in_edges = vec![false; pending.len()];
    for (child, class) in pending.iter().enumerate() {
        for parent in &class.parents {
            if let Some(&p) = index_of.get(&parent.type_id) {
                children[p].push(child);
                in_edges[p] = true;
                in_edges[child] = true;
            }
        }
    }

    fn visit(
        node: usize,
        children: &[Vec<usize>],
        marks: &mut [Mark],
        out: &mut Vec<usize>,
        pending: &[PendingClass],
    ) -> Result<(), ConfigError> {
        match marks[node] {
            Mark::Done => return Ok(()),
            Mark::Active => return Err(ConfigError::InheritanceCycle(pending[node].name.clone())),
            Mark::New => {}
        }
        marks[node] = Mark::Active;
        for &child in &children[node] {
            visit(child, children, marks, out, pending)?;
        }
        marks[node] = Mark::Done;
        out.push(node);
        Ok(())
    }

    let mut marks = vec![Mark::New; pending.len()];
    let mut post = Vec::with_capacity(pending.len());
    for (i, class) in pending.iter().enumerate() {
        if in_edges[i] && class.parents.is_empty() {
            visit(i, &children, &mut marks, &mut post, pending)?;
        }
    }
    if let Some(stuck) = (0..pending.len()).find(|&i| in_edges[i] && marks[i] != Mark::Done) {
        return Err(ConfigError::InheritanceCycle(pending[stuck].name.clone()));
    }

    post.reverse();
    post.extend((0..pending.len()).filter(|&i| !in_edges[i]));
    Ok(post)
}

// ============================================================================
// Read-only phase
// ============================================================================

/// Initialized, immutable class registry
pub struct Registry {
    classes: Vec<ClassDescriptor>,
    by_name: FxHashMap<String, ClassId>,
    by_type: FxHashMap<TypeId, ClassId>,
    type_names: FxHashMap<&'static str, ClassId>,
    functions: FxHashMap<String, Vec<FunctionDescriptor>>,
    function_names: Vec<String>,
    aliases: Vec<(NativeType, NativeType)>,
}

impl Registry {
    fn index_classes(&mut self) {
        for class in &self.classes {
            self.by_name.insert(class.name().to_string(), class.id());
            self.by_type.insert(class.info().type_id(), class.id());
            self.type_names.insert(class.info().type_name(), class.id());
        }
    }

    /// Rewrite Rust type paths in declared signatures to class names.
    fn normalize_type_names(&mut self) {
        let names: FxHashMap<&'static str, String> = self
            .type_names
            .iter()
            .map(|(&type_name, &id)| (type_name, self.classes[id.index()].name().to_string()))
            .collect();
        let mut rename = |ty: &mut NativeType| {
            ty.for_each_named_mut(&mut |name: &mut String| {
                if let Some(class) = names.get(name.as_str()) {
                    *name = class.clone();
                }
            })
        };
        for class in &mut self.classes {
            class.for_each_signature_mut(&mut |sig: &mut Signature| sig.map_types(&mut rename));
            class.for_each_declared_type_mut(&mut rename);
        }
        for overloads in self.functions.values_mut() {
            for function in overloads {
                function.signature_mut().map_types(&mut rename);
                rename(function.returns_mut());
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for class in &self.classes {
            for (name, overloads) in class.methods() {
                check_overloads(class.name(), name, overloads.iter().map(|m| m.signature()))?;
            }
            check_overloads(
                class.name(),
                class.name(),
                class.constructors().iter().map(|c| c.signature()),
            )?;
            let attributes = class.attributes();
            for (i, attribute) in attributes.iter().enumerate() {
                if attributes[..i].iter().any(|a| a.name() == attribute.name()) {
                    return Err(ConfigError::DuplicateAttribute {
                        class: class.name().to_string(),
                        name: attribute.name().to_string(),
                    });
                }
            }
        }
        for (name, overloads) in &self.functions {
            check_overloads(GLOBAL_OWNER, name, overloads.iter().map(|f| f.signature()))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// Class by registered name
    pub fn get_class(&self, name: &str) -> Option<&ClassDescriptor> {
        self.by_name.get(name).map(|&id| self.class(id))
    }

    /// Class by id
    pub fn class(&self, id: ClassId) -> &ClassDescriptor {
        &self.classes[id.index()]
    }

    /// Class registered for native type `T`
    pub fn class_for<T: 'static>(&self) -> Option<&ClassDescriptor> {
        self.class_by_type_id(TypeId::of::<T>())
    }

    /// Class registered for a native type
    pub fn class_by_type_id(&self, type_id: TypeId) -> Option<&ClassDescriptor> {
        self.by_type.get(&type_id).map(|&id| self.class(id))
    }

    /// Every class, bases before derived classes
    pub fn get_classes(&self) -> &[ClassDescriptor] {
        &self.classes
    }

    /// First base of `class`
    pub fn parent1(&self, class: &ClassDescriptor) -> Option<&ClassDescriptor> {
        class.parent1().map(|id| self.class(id))
    }

    /// Second base of `class`
    pub fn parent2(&self, class: &ClassDescriptor) -> Option<&ClassDescriptor> {
        class.parent2().map(|id| self.class(id))
    }

    /// Class name registered for a Rust type path
    pub fn type_name_to_class_name(&self, type_name: &str) -> Option<&str> {
        self.type_names
            .get(type_name)
            .map(|&id| self.class(id).name())
    }

    /// Display form of a native type, with class names for registered types
    pub fn nice_type_name(&self, ty: &NativeType) -> String {
        let mut ty = ty.clone();
        ty.for_each_named_mut(&mut |name| {
            if let Some(class) = self.type_name_to_class_name(name) {
                *name = class.to_string();
            }
        });
        ty.to_string()
    }

    /// Global function overloads registered under `name`
    pub fn functions(&self, name: &str) -> &[FunctionDescriptor] {
        self.functions.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Global function names, in registration order
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.function_names.iter().map(String::as_str)
    }

    /// Registered `(guest, native)` type aliases
    pub fn aliases(&self) -> &[(NativeType, NativeType)] {
        &self.aliases
    }

    // ------------------------------------------------------------------------
    // Ancestry
    // ------------------------------------------------------------------------

    /// True when `derived` is `base` or inherits from it, by class name
    pub fn is_ancestor(&self, derived: &str, base: &str) -> bool {
        match (self.by_name.get(derived), self.by_name.get(base)) {
            (Some(&d), Some(&b)) => self.id_inherits(d, b),
            _ => derived == base,
        }
    }

    /// True when native type `derived` is `base` or inherits from it
    pub fn type_inherits(&self, derived: TypeId, base: TypeId) -> bool {
        match (self.by_type.get(&derived), self.by_type.get(&base)) {
            (Some(&d), Some(&b)) => self.id_inherits(d, b),
            _ => derived == base,
        }
    }

    /// Fewest inheritance steps from `derived` up to `base`, by class name
    pub fn inheritance_distance(&self, derived: &str, base: &str) -> Option<u32> {
        match (self.by_name.get(derived), self.by_name.get(base)) {
            (Some(&d), Some(&b)) => self.id_distance(d, b),
            _ => (derived == base).then_some(0),
        }
    }

    fn id_distance(&self, derived: ClassId, base: ClassId) -> Option<u32> {
        if derived == base {
            return Some(0);
        }
        self.class(derived)
            .parents
            .iter()
            .flatten()
            .filter_map(|&parent| self.id_distance(parent, base))
            .min()
            .map(|steps| steps + 1)
    }

    fn id_inherits(&self, derived: ClassId, base: ClassId) -> bool {
        if derived == base {
            return true;
        }
        self.class(derived)
            .parents
            .iter()
            .flatten()
            .any(|&parent| self.id_inherits(parent, base))
    }

    fn upcast_path(&self, from: TypeId, to: TypeId) -> Option<Vec<Upcast>> {
        if from == to {
            return Some(Vec::new());
        }
        let class = self.class_by_type_id(from)?;
        class.info().upcasts().iter().find_map(|step| {
            let mut rest = self.upcast_path(step.parent, to)?;
            rest.insert(0, *step);
            Some(rest)
        })
    }

    /// View an object of native type `from` as its base `to`
    pub fn upcast_ref<'a>(&self, any: &'a dyn Any, from: TypeId, to: TypeId) -> Option<&'a dyn Any> {
        let mut current = any;
        for step in self.upcast_path(from, to)? {
            current = (step.cast_ref)(current)?;
        }
        Some(current)
    }

    /// Mutable counterpart of [`upcast_ref`](Self::upcast_ref)
    pub fn upcast_mut<'a>(
        &self,
        any: &'a mut dyn Any,
        from: TypeId,
        to: TypeId,
    ) -> Option<&'a mut dyn Any> {
        let mut current = any;
        for step in self.upcast_path(from, to)? {
            current = (step.cast_mut)(current)?;
        }
        Some(current)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("classes", &self.classes.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("functions", &self.function_names)
            .field("aliases", &self.aliases.len())
            .finish()
    }
}

fn check_overloads<'a>(
    owner: &str,
    name: &str,
    signatures: impl Iterator<Item = &'a Signature>,
) -> Result<(), ConfigError> {
    let signatures: Vec<&Signature> = signatures.collect();
    for (i, sig) in signatures.iter().enumerate() {
        if signatures[..i].iter().any(|other| other.same_types(sig)) {
            return Err(ConfigError::DuplicateSignature {
                owner: owner.to_string(),
                name: name.to_string(),
                signature: (*sig).clone(),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Process-wide registry
// ============================================================================

static PENDING: Lazy<Mutex<Option<RegistryBuilder>>> =
    Lazy::new(|| Mutex::new(Some(RegistryBuilder::new())));

static GLOBAL: OnceCell<Registry> = OnceCell::new();

/// Add registrations to the process-wide builder
pub fn register(f: impl FnOnce(&mut RegistryBuilder)) -> Result<(), ConfigError> {
    let mut pending = PENDING.lock();
    let builder = pending.as_mut().ok_or(ConfigError::AlreadyInitialized)?;
    f(builder);
    Ok(())
}

/// Register a class without bases in the process-wide builder
pub fn register_class<T: 'static>(
    name: &str,
    init: impl FnOnce(ClassBuilder<T>) -> ClassBuilder<T> + Send + 'static,
) -> Result<(), ConfigError> {
    register(|builder| {
        builder.register_class::<T>(name, init);
    })
}

/// Register a global function in the process-wide builder
pub fn register_function<Args, F: StaticFn<Args>>(name: &str, f: F) -> Result<(), ConfigError> {
    register(|builder| {
        builder.register_function(name, f);
    })
}

/// Initialize the process-wide registry. Only the first call succeeds.
pub fn init_global() -> Result<&'static Registry, ConfigError> {
    let builder = PENDING
        .lock()
        .take()
        .ok_or(ConfigError::AlreadyInitialized)?;
    let registry = builder.init()?;
    GLOBAL
        .set(registry)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    GLOBAL.get().ok_or(ConfigError::AlreadyInitialized)
}

/// The process-wide registry, once initialized
pub fn global() -> Option<&'static Registry> {
    GLOBAL.get()
}

// ============================================================================
// Active registry
// ============================================================================

thread_local! {
    static ACTIVE: Cell<Option<NonNull<Registry>>> = const { Cell::new(None) };
}

/// Restores the previously active registry when dropped
struct ActiveGuard {
    previous: Option<NonNull<Registry>>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.set(self.previous));
    }
}

/// Run `f` with `registry` as the current registry of this thread.
/// Scopes nest; the previous one is restored on return and on unwind.
pub fn scoped<R>(registry: &Registry, f: impl FnOnce() -> R) -> R {
    let previous = ACTIVE.with(|active| active.replace(Some(NonNull::from(registry))));
    let _guard = ActiveGuard { previous };
    f()
}

/// Run `f` with the innermost scoped registry, or the process-wide one
/// outside any scope.
pub fn current<R>(f: impl FnOnce(Option<&Registry>) -> R) -> R {
    match ACTIVE.with(Cell::get) {
        // SAFETY: the pointer was taken from a live borrow in `scoped`, whose
        // guard clears it before that borrow ends.
        Some(active) => f(Some(unsafe { active.as_ref() })),
        None => f(global()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Animal {
        legs: u32,
    }

    struct Dog {
        animal: Animal,
    }

    impl AsRef<Animal> for Dog {
        fn as_ref(&self) -> &Animal {
            &self.animal
        }
    }

    impl AsMut<Animal> for Dog {
        fn as_mut(&mut self) -> &mut Animal {
            &mut self.animal
        }
    }

    struct Loner;

    fn sample() -> Registry {
        let mut builder = RegistryBuilder::new();
        builder.register_class::<Loner>("Loner", |c| c);
        builder
            .register_class::<Dog>("Dog", |c| c.method("legs", |d: &Dog| d.animal.legs))
            .parent::<Animal>();
        builder.register_class::<Animal>("Animal", |c| c);
        builder.init().unwrap()
    }

    #[test]
    fn test_bases_first_isolated_last() {
        let registry = sample();
        let names: Vec<&str> = registry.get_classes().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["Animal", "Dog", "Loner"]);
        for (i, class) in registry.get_classes().iter().enumerate() {
            assert_eq!(class.id().index(), i);
        }
    }

    #[test]
    fn test_parent_links_and_ancestry() {
        let registry = sample();
        let dog = registry.get_class("Dog").unwrap();
        assert_eq!(registry.parent1(dog).map(|c| c.name()), Some("Animal"));
        assert!(registry.parent2(dog).is_none());
        assert!(registry.is_ancestor("Dog", "Animal"));
        assert!(registry.is_ancestor("Dog", "Dog"));
        assert!(!registry.is_ancestor("Animal", "Dog"));
        assert!(registry.type_inherits(TypeId::of::<Dog>(), TypeId::of::<Animal>()));
        assert_eq!(registry.inheritance_distance("Dog", "Animal"), Some(1));
        assert_eq!(registry.inheritance_distance("Dog", "Dog"), Some(0));
        assert_eq!(registry.inheritance_distance("Animal", "Dog"), None);
    }

    #[test]
    fn test_upcast_through_registry() {
        let registry = sample();
        let dog = Dog {
            animal: Animal { legs: 4 },
        };
        let animal = registry
            .upcast_ref(&dog, TypeId::of::<Dog>(), TypeId::of::<Animal>())
            .and_then(|a| a.downcast_ref::<Animal>());
        assert_eq!(animal.map(|a| a.legs), Some(4));
        assert!(registry
            .upcast_ref(&dog, TypeId::of::<Dog>(), TypeId::of::<Loner>())
            .is_none());
    }

    #[test]
    fn test_type_names_rewritten_to_class_names() {
        let registry = sample();
        assert_eq!(
            registry.type_name_to_class_name(std::any::type_name::<Dog>()),
            Some("Dog")
        );
        assert_eq!(
            registry.nice_type_name(&NativeType::seq(NativeType::named(std::any::type_name::<
                Animal,
            >()))),
            "array<Animal>"
        );
    }

    #[test]
    fn test_duplicate_class_name() {
        let mut builder = RegistryBuilder::new();
        builder.register_class::<Animal>("Same", |c| c);
        builder.register_class::<Loner>("Same", |c| c);
        assert!(matches!(builder.init(), Err(ConfigError::DuplicateClass(ref n)) if n == "Same"));
    }

    #[test]
    fn test_duplicate_global_function_signature() {
        let mut builder = RegistryBuilder::new();
        builder
            .register_function("twice", |x: i32| x * 2)
            .register_function("twice", |x: i32| x + x);
        match builder.init() {
            Err(ConfigError::DuplicateSignature { owner, name, .. }) => {
                assert_eq!(owner, GLOBAL_OWNER);
                assert_eq!(name, "twice");
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_scoped_registry_nests() {
        let outer = sample();
        let mut builder = RegistryBuilder::new();
        builder.register_class::<Loner>("Solo", |c| c);
        let inner = builder.init().unwrap();

        let count = |r: Option<&Registry>| r.map(|r| r.get_classes().len());
        scoped(&outer, || {
            assert_eq!(current(count), Some(3));
            scoped(&inner, || assert_eq!(current(count), Some(1)));
            assert_eq!(current(count), Some(3));
        });
        assert_eq!(current(|r| r.is_some()), global().is_some());
    }

    #[test]
    fn test_scope_restored_after_panic() {
        let registry = sample();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            scoped(&registry, || panic!("inside scope"))
        }));
        assert!(outcome.is_err());
        assert_eq!(current(|r| r.is_some()), global().is_some());
    }
}
