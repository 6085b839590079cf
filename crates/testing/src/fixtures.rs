use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// One free variable inside a function body.
pub const FREE_VARIABLE: &str = "def f(a):\n    return a + b\n";

/// `price` is never bound.
pub const PRICE_TOTAL: &str = "total = price * 2\n";

/// Same shape as [`PRICE_TOTAL`] with different names and literal.
pub const COST_AMOUNT: &str = "amount = cost * 3\n";

pub const CART: &str = r#"import json

TAX = 0.2


def load(path):
    with open(path) as handle:
        return json.load(handle)


def subtotal(items):
    total = 0
    for item in items:
        total += item["price"] * quantity
    return total


def describe(name, count=1):
    label = "cart"
    return f"{label}: {name} x{count}"


class Cart:
    def __init__(self, owner):
        self.owner = owner
        self.items = []

    def add(self, item):
        self.items.append(item)
        return len(self.items)


print(subtotal(load(source)) * (1 + TAX) - discount)
"#;

pub const MALFORMED: &str = "def broken(:\n    return\n";

/// Structured reply typing the unresolved names of [`CART`].
pub const CART_REPLY: &str = r#"Here are the types:
```json
{
  "inferences": {"quantity": "int", "source": "str", "discount": "float"},
  "explanations": {"quantity": "multiplies a price"},
  "confidence": {"quantity": 0.9, "source": 0.8, "discount": 0.85}
}
```"#;

/// Writes `contents` to `dir/name` and returns the path.
pub fn write_fixture(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, contents)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_fixture() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(dir.path(), "nested/cart.py", CART).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), CART);
    }
}
