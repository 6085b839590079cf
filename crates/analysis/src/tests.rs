use crate::*;

fn unresolved(source: &str) -> Vec<String> {
    analyze_source(source)
        .unresolved
        .into_iter()
        .map(|u| u.name)
        .collect()
}

fn symbol<'a>(analysis: &'a StaticAnalysis, name: &str) -> &'a Symbol {
    analysis
        .symbols
        .iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("symbol {name} not found"))
}

#[test]
fn test_free_variable_in_function() {
    let analysis = analyze_source("def f(a):\n    return a + b\n");
    assert!(analysis.is_success());
    assert_eq!(analysis.unresolved.len(), 1);

    let b = &analysis.unresolved[0];
    assert_eq!(b.name, "b");
    assert_eq!(b.use_line, 2);
    assert_eq!(b.column, 15);
    assert_eq!(b.context_snippet, "return a + b");
    assert_eq!(analysis.scopes[b.enclosing_scope_id.index()].kind, ScopeKind::Function);
}

#[test]
fn test_builtins_and_keywords_resolve() {
    let source = "print(len([1, 2]), True, None)\nx = sorted(range(3))\n";
    assert!(unresolved(source).is_empty());
}

#[test]
fn test_module_reads_follow_statement_order() {
    assert_eq!(unresolved("print(x)\nx = 1\n"), vec!["x"]);
    assert!(unresolved("x = 1\nprint(x)\n").is_empty());
}

#[test]
fn test_function_bodies_see_later_definitions() {
    let source = "def main():\n    return helper()\n\ndef helper():\n    return 1\n";
    assert!(unresolved(source).is_empty());
}

#[test]
fn test_class_scope_is_hidden_from_methods() {
    let source = "\
class Config:
    retries = 3
    doubled = retries * 2

    def total(self):
        return retries
";
    let analysis = analyze_source(source);
    let names: Vec<_> = analysis.unresolved.iter().map(|u| (u.name.as_str(), u.use_line)).collect();
    assert_eq!(names, vec![("retries", 6)]);
}

#[test]
fn test_global_and_nonlocal() {
    let source = "\
def outer():
    count = 0
    def inner():
        nonlocal count
        count += 1
        return count
    return inner

def bump():
    global total
    total = 1

def read():
    return total
";
    assert!(unresolved(source).is_empty());
}

#[test]
fn test_augmented_assignment_reads_first() {
    assert_eq!(unresolved("counter += 1\n"), vec!["counter"]);
}

#[test]
fn test_comprehension_scoping() {
    let source = "\
values = [1, 2, 3]
squares = [v * v for v in values if v > limit]
pairs = {k: w for k, w in zip(values, values)}
print(v)
";
    assert_eq!(unresolved(source), vec!["limit", "v"]);
}

#[test]
fn test_walrus_binds_outside_comprehension() {
    let source = "data = [1, 2]\nfound = [last := d for d in data]\nprint(last)\n";
    assert!(unresolved(source).is_empty());
}

#[test]
fn test_lambda_parameters_and_defaults() {
    let source = "scale = lambda x, factor=default_factor: x * factor * ratio\n";
    assert_eq!(unresolved(source), vec!["default_factor", "ratio"]);
}

#[test]
fn test_decorators_and_annotations_run_in_enclosing_scope() {
    let source = "\
@register
def handle(event: Event, retries: int = MAX) -> Result:
    return event
";
    assert_eq!(unresolved(source), vec!["register", "Event", "MAX", "Result"]);
}

#[test]
fn test_imports_and_exception_names() {
    let source = "\
import os.path
from collections import OrderedDict as OD
from . import sibling

try:
    os.path.join(OD(), sibling)
except ValueError as err:
    print(err)
";
    let analysis = analyze_source(source);
    assert!(analysis.unresolved.is_empty());

    let od = symbol(&analysis, "OD");
    assert_eq!(od.kind, SymbolKind::Import);
    assert_eq!(
        od.details,
        SymbolDetails::Import {
            module: Some("collections".to_string()),
            imported: Some("OrderedDict".to_string()),
        }
    );
    assert_eq!(symbol(&analysis, "os").kind, SymbolKind::Import);
}

#[test]
fn test_symbol_details() {
    let source = "\
class Cart(Base):
    def add(self, item, qty=1):
        return len(item) * 2

def describe(n):
    if n:
        return 'many'
    return 'none'

def walk(items):
    for i in items:
        yield i

def unknown(x):
    return x.value

def nothing():
    pass

count = 0
";
    let analysis = analyze_source(source);
    assert_eq!(analysis.unresolved_names(), vec!["Base"]);

    let cart = symbol(&analysis, "Cart");
    assert_eq!(
        cart.details,
        SymbolDetails::Class {
            bases: vec!["Base".to_string()],
            decorators: vec![],
        }
    );

    match &symbol(&analysis, "add").details {
        SymbolDetails::Function {
            parameters,
            inferred_return,
            is_method,
            ..
        } => {
            assert!(*is_method);
            assert_eq!(parameters.len(), 3);
            assert!(parameters[2].has_default);
            assert_eq!(inferred_return.as_deref(), Some("int"));
        }
        other => panic!("unexpected details {other:?}"),
    }

    let inferred = |name: &str| match &symbol(&analysis, name).details {
        SymbolDetails::Function {
            inferred_return, ..
        } => inferred_return.clone(),
        other => panic!("unexpected details {other:?}"),
    };
    assert_eq!(inferred("describe").as_deref(), Some("str"));
    assert_eq!(inferred("walk").as_deref(), Some("Generator"));
    assert_eq!(inferred("unknown"), None);
    assert_eq!(inferred("nothing").as_deref(), Some("None"));

    assert_eq!(
        symbol(&analysis, "count").details,
        SymbolDetails::Variable {
            annotation: None,
            value_type: Some("int".to_string()),
        }
    );
}

#[test]
fn test_first_binding_creates_symbol() {
    let analysis = analyze_source("x = 1\nx = 'a'\n");
    let xs: Vec<_> = analysis.symbols.iter().filter(|s| s.name == "x").collect();
    assert_eq!(xs.len(), 1);
    assert_eq!(xs[0].decl_line, 1);
}

#[test]
fn test_parse_failure_is_deterministic() {
    let first = analyze_source("def broken(:\n    pass\n");
    let second = analyze_source("def broken(:\n    pass\n");

    assert!(!first.is_success());
    assert!(first.symbols.is_empty());
    assert!(first.unresolved.is_empty());
    assert_eq!(first, second);
}

#[test]
fn test_unresolved_sorted_by_position() {
    let source = "def later():\n    return alpha\n\nresult = beta + gamma\n";
    let analysis = analyze_source(source);
    let positions: Vec<_> = analysis
        .unresolved
        .iter()
        .map(|u| (u.name.as_str(), u.use_line))
        .collect();
    assert_eq!(positions, vec![("alpha", 2), ("beta", 4), ("gamma", 4)]);
}

#[test]
fn test_context_snippet_is_truncated() {
    let long = format!("value = missing + {}\n", "1 + ".repeat(80) + "1");
    let analysis = analyze_source(&long);
    let snippet = &analysis.unresolved[0].context_snippet;
    assert!(snippet.starts_with("value = missing"));
    assert_eq!(snippet.chars().count(), 160);
}

#[test]
fn test_analysis_serializes() {
    let analysis = analyze_source("def f(a):\n    return a + b\n");
    let json = serde_json::to_value(&analysis.unresolved).unwrap();
    assert_eq!(json[0]["name"], "b");
    assert_eq!(json[0]["enclosing_scope_id"], 1);
}

#[test]
fn test_fstring_interpolations_are_reads() {
    let analysis = analyze_source("def greet():\n    return f\"hello {name}\"\n");
    assert_eq!(analysis.unresolved.len(), 1);
    assert_eq!(analysis.unresolved[0].name, "name");
    assert_eq!(analysis.unresolved[0].use_line, 2);
    assert_eq!(analysis.unresolved[0].column, 20);

    assert_eq!(unresolved("print(f'{a!r:>{width}}')\n"), vec!["a", "width"]);
    assert!(unresolved("width = 8\na = 1\nprint(f'{a:>{width}}')\n").is_empty());
}

#[test]
fn test_match_captures_bind_and_patterns_read() {
    let source = "\
match cmd:
    case ['go', direction] if direction != 'up':
        print(direction)
    case Point(x=0, y=py):
        print(py)
    case Color.RED | _:
        pass
print(direction, py)
";
    assert_eq!(unresolved(source), vec!["cmd", "Point", "Color"]);
}

#[test]
fn test_type_parameters_resolve() {
    assert!(unresolved("def first[T](items: list[T]) -> T:\n    return items[0]\n").is_empty());

    let source = "\
class Box[T: Hashable]:
    def get(self) -> T:
        value: T = self.item
        return value
";
    assert_eq!(unresolved(source), vec!["Hashable"]);
    assert_eq!(unresolved("def f[T](x: T) -> U:\n    return x\n"), vec!["U"]);
}

#[test]
fn test_type_alias_values_are_lazy() {
    assert!(unresolved("type Pair[K] = tuple[K, Later]\nclass Later: pass\n").is_empty());
    assert_eq!(unresolved("type Alias = list[Missing]\n"), vec!["Missing"]);
    let analysis = analyze_source("type Alias = list[int]\n");
    assert_eq!(symbol(&analysis, "Alias").kind, SymbolKind::Variable);
}

#[test]
fn test_nesting_limit_fails_gracefully() {
    let deep = format!("x = {}1{}\n", "(".repeat(1000), ")".repeat(1000));
    let analysis = analyze_source(&deep);
    assert!(!analysis.is_success());
    assert!(analysis.error.as_ref().is_some_and(|e| e.message.contains("nested")));

    let moderate = format!("x = {}1{}\n", "(".repeat(100), ")".repeat(100));
    assert!(analyze_source(&moderate).is_success());
}
