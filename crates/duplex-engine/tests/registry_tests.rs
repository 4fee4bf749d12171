//! Class Registry Tests
//!
//! Registration and initialization of class registries. Tests validate:
//! - Bases are initialized before derived classes in any registration order
//! - Diamond hierarchies are ordered without duplicates
//! - Missing bases, cycles, excess parents and duplicate overloads fail init
//! - Configured type aliases take part in overload resolution
//!
//! # Running Tests
//! ```bash
//! cargo test --test registry_tests
//! ```

use std::any::TypeId;
use std::io::Write;

use duplex_engine::dispatch::{self, find_attribute};
use duplex_engine::registry::{RegistryBuilder, MAX_PARENTS};
use duplex_engine::{
    BridgeConfig, CallError, ConfigError, FromGuest, GuestResult, GuestType, GuestValue,
    NativeType, Registry, ResolutionError, RuntimeTag,
};

const RT: RuntimeTag = RuntimeTag::PRIMARY;

fn class_order(registry: &Registry) -> Vec<&str> {
    registry.get_classes().iter().map(|c| c.name()).collect()
}

fn position(registry: &Registry, name: &str) -> usize {
    registry.get_class(name).unwrap().id().index()
}

// ============================================================================
// Fixture hierarchy
// ============================================================================

#[derive(Default)]
struct Base {
    id: u32,
}

#[derive(Default)]
struct Derived {
    base: Base,
}

impl AsRef<Base> for Derived {
    fn as_ref(&self) -> &Base {
        &self.base
    }
}

impl AsMut<Base> for Derived {
    fn as_mut(&mut self) -> &mut Base {
        &mut self.base
    }
}

#[derive(Default)]
struct Left {
    base: Base,
    left: i32,
}

#[derive(Default)]
struct Right {
    base: Base,
    right: i32,
}

#[derive(Default)]
struct Bottom {
    left: Left,
    right: Right,
}

macro_rules! embeds {
    ($outer:ty => $inner:ty, $field:ident) => {
        impl AsRef<$inner> for $outer {
            fn as_ref(&self) -> &$inner {
                &self.$field
            }
        }

        impl AsMut<$inner> for $outer {
            fn as_mut(&mut self) -> &mut $inner {
                &mut self.$field
            }
        }
    };
}

embeds!(Left => Base, base);
embeds!(Right => Base, base);
embeds!(Bottom => Left, left);
embeds!(Bottom => Right, right);

fn diamond() -> Registry {
    let mut builder = RegistryBuilder::new();
    builder
        .register_class::<Bottom>("Bottom", |c| c)
        .parent::<Left>()
        .parent::<Right>();
    builder
        .register_class::<Right>("Right", |c| {
            c.attribute("right", |r: &Right| &r.right, |r: &mut Right| &mut r.right)
        })
        .parent::<Base>();
    builder.register_class::<Base>("Base", |c| {
        c.readonly("id", |b: &Base| &b.id)
    });
    builder
        .register_class::<Left>("Left", |c| {
            c.attribute("left", |l: &Left| &l.left, |l: &mut Left| &mut l.left)
        })
        .parent::<Base>();
    builder.init().unwrap()
}

// ============================================================================
// Initialization order
// ============================================================================

#[test]
fn test_base_before_derived_either_order() {
    let mut derived_first = RegistryBuilder::new();
    derived_first
        .register_class::<Derived>("Derived", |c| c)
        .parent::<Base>();
    derived_first.register_class::<Base>("Base", |c| c);
    let registry = derived_first.init().unwrap();
    assert_eq!(class_order(&registry), vec!["Base", "Derived"]);

    let mut base_first = RegistryBuilder::new();
    base_first.register_class::<Base>("Base", |c| c);
    base_first
        .register_class::<Derived>("Derived", |c| c)
        .parent::<Base>();
    let registry = base_first.init().unwrap();
    assert_eq!(class_order(&registry), vec!["Base", "Derived"]);
}

#[test]
fn test_diamond_ordered_once() {
    let registry = diamond();
    let order = class_order(&registry);
    assert_eq!(order.len(), 4);
    assert_eq!(order[0], "Base");
    assert_eq!(order[3], "Bottom");
    assert!(position(&registry, "Left") < position(&registry, "Bottom"));
    assert!(position(&registry, "Right") < position(&registry, "Bottom"));
}

#[test]
fn test_diamond_links_and_ancestry() {
    let registry = diamond();
    let bottom = registry.get_class("Bottom").unwrap();
    assert_eq!(registry.parent1(bottom).map(|c| c.name()), Some("Left"));
    assert_eq!(registry.parent2(bottom).map(|c| c.name()), Some("Right"));
    assert!(registry.is_ancestor("Bottom", "Base"));
    assert!(registry.is_ancestor("Bottom", "Right"));
    assert!(!registry.is_ancestor("Left", "Right"));
    assert!(registry.type_inherits(TypeId::of::<Bottom>(), TypeId::of::<Base>()));
}

#[test]
fn test_attribute_found_through_second_parent() {
    let registry = diamond();
    let bottom = registry.get_class("Bottom").unwrap();
    assert!(bottom.attribute("right").is_none());
    assert_eq!(
        find_attribute(&registry, bottom, "right").map(|a| a.name()),
        Some("right")
    );
    assert_eq!(
        find_attribute(&registry, bottom, "id").map(|a| a.is_read_only()),
        Some(true)
    );
    assert!(find_attribute(&registry, bottom, "missing").is_none());
}

#[test]
fn test_upcast_follows_first_parent() {
    let registry = diamond();
    let mut bottom = Bottom::default();
    bottom.left.base.id = 1;
    bottom.right.base.id = 2;
    let base = registry
        .upcast_ref(&bottom, TypeId::of::<Bottom>(), TypeId::of::<Base>())
        .and_then(|b| b.downcast_ref::<Base>());
    assert_eq!(base.map(|b| b.id), Some(1));
    let right = registry
        .upcast_ref(&bottom, TypeId::of::<Bottom>(), TypeId::of::<Right>())
        .and_then(|r| r.downcast_ref::<Right>());
    assert_eq!(right.map(|r| r.base.id), Some(2));
}

// ============================================================================
// Declaration errors
// ============================================================================

struct Orphan;

struct Unregistered;

impl AsRef<Unregistered> for Orphan {
    fn as_ref(&self) -> &Unregistered {
        &UNREGISTERED
    }
}

impl AsMut<Unregistered> for Orphan {
    fn as_mut(&mut self) -> &mut Unregistered {
        unimplemented!("never upcast in tests")
    }
}

static UNREGISTERED: Unregistered = Unregistered;

#[test]
fn test_missing_base_named_in_error() {
    let mut builder = RegistryBuilder::new();
    builder
        .register_class::<Orphan>("Orphan", |c| c)
        .parent::<Unregistered>();
    let err = builder.init().unwrap_err();
    match &err {
        ConfigError::MissingBaseClass { class, base } => {
            assert_eq!(class, "Orphan");
            assert_eq!(base, std::any::type_name::<Unregistered>());
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(err.to_string().contains("Unregistered"));
}

struct Hen;

struct Egg;

static HEN: Hen = Hen;

static EGG: Egg = Egg;

impl AsRef<Egg> for Hen {
    fn as_ref(&self) -> &Egg {
        &EGG
    }
}

impl AsMut<Egg> for Hen {
    fn as_mut(&mut self) -> &mut Egg {
        unimplemented!("never upcast in tests")
    }
}

impl AsRef<Hen> for Egg {
    fn as_ref(&self) -> &Hen {
        &HEN
    }
}

impl AsMut<Hen> for Egg {
    fn as_mut(&mut self) -> &mut Hen {
        unimplemented!("never upcast in tests")
    }
}

#[test]
fn test_inheritance_cycle_rejected() {
    let mut builder = RegistryBuilder::new();
    builder.register_class::<Hen>("Hen", |c| c).parent::<Egg>();
    builder.register_class::<Egg>("Egg", |c| c).parent::<Hen>();
    builder.register_class::<Base>("Base", |c| c);
    assert!(matches!(builder.init(), Err(ConfigError::InheritanceCycle(_))));
}

#[derive(Default)]
struct Triple {
    left: Left,
    right: Right,
    base: Base,
}

embeds!(Triple => Left, left);
embeds!(Triple => Right, right);
embeds!(Triple => Base, base);

#[test]
fn test_too_many_parents() {
    let mut builder = RegistryBuilder::new();
    builder.register_class::<Base>("Base", |c| c);
    builder.register_class::<Left>("Left", |c| c).parent::<Base>();
    builder.register_class::<Right>("Right", |c| c).parent::<Base>();
    builder
        .register_class::<Triple>("Triple", |c| c)
        .parent::<Left>()
        .parent::<Right>()
        .parent::<Base>();
    match builder.init() {
        Err(ConfigError::TooManyParents { class, count }) => {
            assert_eq!(class, "Triple");
            assert_eq!(count, MAX_PARENTS + 1);
        }
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_duplicate_method_signature() {
    let mut builder = RegistryBuilder::new();
    builder.register_class::<Base>("Base", |c| {
        c.method("scaled", |b: &Base, k: u32| b.id * k)
            .method("scaled", |b: &Base, k: u32| k * b.id)
    });
    match builder.init() {
        Err(ConfigError::DuplicateSignature { owner, name, signature }) => {
            assert_eq!(owner, "Base");
            assert_eq!(name, "scaled");
            assert_eq!(signature.to_string(), "u32");
        }
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_duplicate_constructor_signature() {
    let mut builder = RegistryBuilder::new();
    builder.register_class::<Base>("Base", |c| {
        c.constructor(Base::default)
            .constructor(|| Base { id: 1 })
    });
    assert!(matches!(
        builder.init(),
        Err(ConfigError::DuplicateSignature { .. })
    ));
}

#[test]
fn test_pass_mode_does_not_distinguish_overloads() {
    let mut builder = RegistryBuilder::new();
    builder
        .register_function("bump", |x: i64| x + 1)
        .register_function("bump", |x: duplex_engine::InOut<i64>| {
            *x.borrow_mut() += 1;
        });
    match builder.init() {
        Err(ConfigError::DuplicateSignature { signature, .. }) => {
            assert_eq!(signature.to_string(), "&mut i64");
        }
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_duplicate_attribute() {
    let mut builder = RegistryBuilder::new();
    builder.register_class::<Base>("Base", |c| {
        c.readonly("id", |b: &Base| &b.id)
            .readonly("id", |b: &Base| &b.id)
    });
    assert!(matches!(
        builder.init(),
        Err(ConfigError::DuplicateAttribute { .. })
    ));
}

// ============================================================================
// Type aliases
// ============================================================================

/// A native path type that guest code passes as a plain string
struct Path(String);

impl GuestType for Path {
    fn native_type() -> NativeType {
        NativeType::named("Path")
    }
}

impl FromGuest for Path {
    fn from_guest(value: &GuestValue, rt: RuntimeTag) -> GuestResult<Self> {
        String::from_guest(value, rt).map(Path)
    }
}

fn basename(path: Path) -> String {
    path.0.rsplit('/').next().unwrap_or_default().to_string()
}

fn path_registry(config: Option<&BridgeConfig>) -> Registry {
    let mut builder = RegistryBuilder::new();
    builder.register_function("basename", basename);
    if let Some(config) = config {
        builder.apply_config(config).unwrap();
    }
    builder.init().unwrap()
}

#[test]
fn test_without_alias_string_does_not_match() {
    let registry = path_registry(None);
    let err = dispatch::call_function(&registry, "basename", &mut [GuestValue::str("/a/b")], RT)
        .unwrap_err();
    assert!(matches!(
        err,
        CallError::Resolution(ResolutionError::SignatureMismatch { .. })
    ));
    assert!(err.to_string().contains("\n  Path"));
}

#[test]
fn test_alias_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[[aliases]]").unwrap();
    writeln!(file, "guest = \"string\"").unwrap();
    writeln!(file, "native = \"Path\"").unwrap();
    let config = BridgeConfig::from_path(file.path()).unwrap();

    let registry = path_registry(Some(&config));
    assert_eq!(
        registry.aliases(),
        &[(NativeType::Str, NativeType::named("Path"))]
    );
    let name = dispatch::call_function(&registry, "basename", &mut [GuestValue::str("/a/b")], RT)
        .unwrap();
    assert_eq!(name.as_string().as_deref(), Some("b"));
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    assert!(matches!(
        BridgeConfig::from_path(&missing),
        Err(ConfigError::Io { .. })
    ));
}
