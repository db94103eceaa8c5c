use std::cell::Cell;
use std::rc::Rc;

use postfetch_engine::{PluginEntry, PluginRegistry, ResolveError, Resolver, StaticResolver};
use serde_json::json;

fn init_logging() {
    postfetch_logging::initialize_for_tests();
}

/// Delegates to the built-in table and counts resolution attempts.
struct CountingResolver {
    calls: Rc<Cell<usize>>,
    fail: bool,
}

impl Resolver for CountingResolver {
    fn resolve(&self, category: &str, symbol: &str) -> Result<Option<PluginEntry>, ResolveError> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(ResolveError::Load {
                category: category.to_string(),
                message: "loader exploded".to_string(),
            });
        }
        StaticResolver.resolve(category, symbol)
    }

    fn categories(&self) -> Vec<&'static str> {
        StaticResolver.categories()
    }
}

fn counting(fail: bool) -> (PluginRegistry<CountingResolver>, Rc<Cell<usize>>) {
    let calls = Rc::new(Cell::new(0));
    let registry = PluginRegistry::with_resolver(CountingResolver {
        calls: calls.clone(),
        fail,
    });
    (registry, calls)
}

#[test]
fn find_returns_capitalized_symbols_for_all_modules() {
    init_logging();
    let mut registry = PluginRegistry::new();
    let modules = registry.modules();
    assert_eq!(modules, vec!["classify", "metadata", "mtime", "zip"]);

    for name in modules {
        let entry = registry.find(name).expect("builtin plugin");
        assert_eq!(entry.category(), name);
        let mut expected = name[..1].to_uppercase();
        expected.push_str(&name[1..]);
        expected.push_str("PP");
        assert_eq!(entry.symbol(), expected);
    }
}

#[test]
fn unknown_and_non_string_names_are_absent() {
    init_logging();
    let mut registry = PluginRegistry::new();
    assert!(registry.find("foo").is_none());
    assert!(registry.find("").is_none());
    assert!(registry.find_value(Some(&json!(1234))).is_none());
    assert!(registry.find_value(Some(&json!(null))).is_none());
    assert!(registry.find_value(None).is_none());
    assert!(registry.find_value(Some(&json!("zip"))).is_some());
}

#[test]
fn resolution_runs_once_per_name() {
    init_logging();
    let (mut registry, calls) = counting(false);
    let modules = registry.modules();

    for name in &modules {
        assert!(registry.find(name).is_some());
    }
    assert_eq!(calls.get(), modules.len());

    // no new resolution attempts
    for name in &modules {
        assert!(registry.find(name).is_some());
    }
    assert_eq!(calls.get(), modules.len());
}

#[test]
fn loader_errors_are_reported_as_absent() {
    init_logging();
    let (mut registry, calls) = counting(true);
    assert!(registry.find("zip").is_none());
    assert!(registry.find("zip").is_none());
    assert_eq!(calls.get(), 1);
}

#[test]
fn reset_forces_new_resolution() {
    init_logging();
    let (mut registry, calls) = counting(false);
    registry.find("mtime");
    registry.find("mtime");
    assert_eq!(calls.get(), 1);

    registry.reset();
    registry.find("mtime");
    assert_eq!(calls.get(), 2);
}
