//! Renders expressions back to source text.
//!
//! Used for annotations, decorators and base classes, so the output favours
//! readability over byte-exact reproduction of the input.

use crate::ast::*;

const PREC_LAMBDA: u8 = 1;
const PREC_IFEXP: u8 = 2;
const PREC_OR: u8 = 3;
const PREC_AND: u8 = 4;
const PREC_NOT: u8 = 5;
const PREC_COMPARE: u8 = 6;
const PREC_BITOR: u8 = 7;
const PREC_BITXOR: u8 = 8;
const PREC_BITAND: u8 = 9;
const PREC_SHIFT: u8 = 10;
const PREC_ARITH: u8 = 11;
const PREC_TERM: u8 = 12;
const PREC_UNARY: u8 = 13;
const PREC_POWER: u8 = 14;
const PREC_AWAIT: u8 = 15;
const PREC_ATOM: u8 = 16;

pub fn unparse(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, 0);
    out
}

fn precedence(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::Lambda { .. } => PREC_LAMBDA,
        ExprKind::IfExp { .. } => PREC_IFEXP,
        ExprKind::NamedExpr { .. } => PREC_LAMBDA,
        ExprKind::BoolOp {
            op: BoolOperator::Or,
            ..
        } => PREC_OR,
        ExprKind::BoolOp {
            op: BoolOperator::And,
            ..
        } => PREC_AND,
        ExprKind::UnaryOp {
            op: UnaryOperator::Not,
            ..
        } => PREC_NOT,
        ExprKind::UnaryOp { .. } => PREC_UNARY,
        ExprKind::Compare { .. } => PREC_COMPARE,
        ExprKind::BinOp { op, .. } => operator_precedence(*op),
        ExprKind::Await(_) => PREC_AWAIT,
        ExprKind::Yield(_) | ExprKind::YieldFrom(_) => 0,
        _ => PREC_ATOM,
    }
}

fn operator_precedence(op: Operator) -> u8 {
    match op {
        Operator::BitOr => PREC_BITOR,
        Operator::BitXor => PREC_BITXOR,
        Operator::BitAnd => PREC_BITAND,
        Operator::LShift | Operator::RShift => PREC_SHIFT,
        Operator::Add | Operator::Sub => PREC_ARITH,
        Operator::Mult | Operator::MatMult | Operator::Div | Operator::Mod | Operator::FloorDiv => {
            PREC_TERM
        }
        Operator::Pow => PREC_POWER,
    }
}

fn operator_text(op: Operator) -> &'static str {
    match op {
        Operator::Add => "+",
        Operator::Sub => "-",
        Operator::Mult => "*",
        Operator::MatMult => "@",
        Operator::Div => "/",
        Operator::Mod => "%",
        Operator::Pow => "**",
        Operator::LShift => "<<",
        Operator::RShift => ">>",
        Operator::BitOr => "|",
        Operator::BitXor => "^",
        Operator::BitAnd => "&",
        Operator::FloorDiv => "//",
    }
}

fn compare_text(op: CmpOperator) -> &'static str {
    match op {
        CmpOperator::Eq => "==",
        CmpOperator::NotEq => "!=",
        CmpOperator::Lt => "<",
        CmpOperator::LtE => "<=",
        CmpOperator::Gt => ">",
        CmpOperator::GtE => ">=",
        CmpOperator::Is => "is",
        CmpOperator::IsNot => "is not",
        CmpOperator::In => "in",
        CmpOperator::NotIn => "not in",
    }
}

fn write_expr(out: &mut String, expr: &Expr, min_precedence: u8) {
    let own = precedence(expr);
    let wrap = own < min_precedence;
    if wrap {
        out.push('(');
    }

    match &expr.kind {
        ExprKind::Name(id) => out.push_str(id),
        ExprKind::Constant(constant) => write_constant(out, constant),
        ExprKind::FString { text, .. } => out.push_str(text),
        ExprKind::Attribute { value, attr } => {
            write_expr(out, value, PREC_ATOM);
            out.push('.');
            out.push_str(attr);
        }
        ExprKind::Subscript { value, slice } => {
            write_expr(out, value, PREC_ATOM);
            out.push('[');
            match &slice.kind {
                ExprKind::Tuple(elts) if !elts.is_empty() => write_sequence(out, elts),
                _ => write_expr(out, slice, 0),
            }
            out.push(']');
        }
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            write_expr(out, func, PREC_ATOM);
            out.push('(');
            let mut first = true;
            for arg in args {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                write_expr(out, arg, 0);
            }
            for keyword in keywords {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                match &keyword.arg {
                    Some(name) => {
                        out.push_str(name);
                        out.push('=');
                    }
                    None => out.push_str("**"),
                }
                write_expr(out, &keyword.value, 0);
            }
            out.push(')');
        }
        ExprKind::BinOp { left, op, right } => {
            // `**` is right-associative, everything else left-associative.
            let (left_min, right_min) = if *op == Operator::Pow {
                (own + 1, own)
            } else {
                (own, own + 1)
            };
            write_expr(out, left, left_min);
            out.push(' ');
            out.push_str(operator_text(*op));
            out.push(' ');
            write_expr(out, right, right_min);
        }
        ExprKind::UnaryOp { op, operand } => {
            out.push_str(match op {
                UnaryOperator::Not => "not ",
                UnaryOperator::Invert => "~",
                UnaryOperator::UAdd => "+",
                UnaryOperator::USub => "-",
            });
            write_expr(out, operand, own);
        }
        ExprKind::BoolOp { op, values } => {
            let text = match op {
                BoolOperator::And => " and ",
                BoolOperator::Or => " or ",
            };
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    out.push_str(text);
                }
                write_expr(out, value, own + 1);
            }
        }
        ExprKind::Compare {
            left,
            ops,
            comparators,
        } => {
            write_expr(out, left, own + 1);
            for (op, comparator) in ops.iter().zip(comparators) {
                out.push(' ');
                out.push_str(compare_text(*op));
                out.push(' ');
                write_expr(out, comparator, own + 1);
            }
        }
        ExprKind::IfExp { test, body, orelse } => {
            write_expr(out, body, own + 1);
            out.push_str(" if ");
            write_expr(out, test, own + 1);
            out.push_str(" else ");
            write_expr(out, orelse, own);
        }
        ExprKind::Lambda { params, body } => {
            out.push_str("lambda");
            let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
            if !names.is_empty() {
                out.push(' ');
                out.push_str(&names.join(", "));
            }
            out.push_str(": ");
            write_expr(out, body, 0);
        }
        ExprKind::NamedExpr { target, value } => {
            write_expr(out, target, PREC_ATOM);
            out.push_str(" := ");
            write_expr(out, value, PREC_IFEXP);
        }
        ExprKind::List(elts) => {
            out.push('[');
            write_sequence(out, elts);
            out.push(']');
        }
        ExprKind::Tuple(elts) => {
            out.push('(');
            write_sequence(out, elts);
            if elts.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        ExprKind::Set(elts) => {
            out.push('{');
            write_sequence(out, elts);
            out.push('}');
        }
        ExprKind::Dict { keys, values } => {
            out.push('{');
            for (i, (key, value)) in keys.iter().zip(values).enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match key {
                    Some(key) => {
                        write_expr(out, key, 0);
                        out.push_str(": ");
                    }
                    None => out.push_str("**"),
                }
                write_expr(out, value, 0);
            }
            out.push('}');
        }
        ExprKind::ListComp { elt, generators } => {
            out.push('[');
            write_expr(out, elt, 0);
            write_generators(out, generators);
            out.push(']');
        }
        ExprKind::SetComp { elt, generators } => {
            out.push('{');
            write_expr(out, elt, 0);
            write_generators(out, generators);
            out.push('}');
        }
        ExprKind::GeneratorExp { elt, generators } => {
            out.push('(');
            write_expr(out, elt, 0);
            write_generators(out, generators);
            out.push(')');
        }
        ExprKind::DictComp {
            key,
            value,
            generators,
        } => {
            out.push('{');
            write_expr(out, key, 0);
            out.push_str(": ");
            write_expr(out, value, 0);
            write_generators(out, generators);
            out.push('}');
        }
        ExprKind::Await(value) => {
            out.push_str("await ");
            write_expr(out, value, PREC_ATOM);
        }
        ExprKind::Yield(value) => {
            out.push_str("yield");
            if let Some(value) = value {
                out.push(' ');
                write_expr(out, value, 0);
            }
        }
        ExprKind::YieldFrom(value) => {
            out.push_str("yield from ");
            write_expr(out, value, 0);
        }
        ExprKind::Starred(value) => {
            out.push('*');
            write_expr(out, value, PREC_BITOR);
        }
        ExprKind::Slice { lower, upper, step } => {
            if let Some(lower) = lower {
                write_expr(out, lower, 0);
            }
            out.push(':');
            if let Some(upper) = upper {
                write_expr(out, upper, 0);
            }
            if let Some(step) = step {
                out.push(':');
                write_expr(out, step, 0);
            }
        }
    }

    if wrap {
        out.push(')');
    }
}

fn write_sequence(out: &mut String, elts: &[Expr]) {
    for (i, elt) in elts.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, elt, 0);
    }
}

fn write_generators(out: &mut String, generators: &[Comprehension]) {
    for generator in generators {
        out.push_str(if generator.is_async {
            " async for "
        } else {
            " for "
        });
        match &generator.target.kind {
            ExprKind::Tuple(elts) if !elts.is_empty() => write_sequence(out, elts),
            _ => write_expr(out, &generator.target, 0),
        }
        out.push_str(" in ");
        write_expr(out, &generator.iter, PREC_OR);
        for condition in &generator.ifs {
            out.push_str(" if ");
            write_expr(out, condition, PREC_OR);
        }
    }
}

fn write_constant(out: &mut String, constant: &Constant) {
    match constant {
        Constant::None => out.push_str("None"),
        Constant::Bool(true) => out.push_str("True"),
        Constant::Bool(false) => out.push_str("False"),
        Constant::Int(text) | Constant::Float(text) | Constant::Complex(text) => {
            out.push_str(text)
        }
        Constant::Str(value) => write_quoted(out, "", value),
        Constant::Bytes(value) => write_quoted(out, "b", value),
        Constant::Ellipsis => out.push_str("..."),
    }
}

fn write_quoted(out: &mut String, prefix: &str, value: &str) {
    out.push_str(prefix);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_module;

    fn roundtrip(source: &str) -> String {
        let module = parse_module(source).unwrap();
        match &module.body[0].kind {
            StmtKind::Expr(expr) => unparse(expr),
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn test_annotation_shapes() {
        assert_eq!(roundtrip("dict[str, list[int]]\n"), "dict[str, list[int]]");
        assert_eq!(roundtrip("int | None\n"), "int | None");
        assert_eq!(roundtrip("typing.Optional[Foo]\n"), "typing.Optional[Foo]");
        assert_eq!(roundtrip("'Forward'\n"), "'Forward'");
    }

    #[test]
    fn test_parentheses_follow_precedence() {
        assert_eq!(roundtrip("(a + b) * c\n"), "(a + b) * c");
        assert_eq!(roundtrip("a + b * c\n"), "a + b * c");
        assert_eq!(roundtrip("a - (b - c)\n"), "a - (b - c)");
        assert_eq!(roundtrip("(a ** b) ** c\n"), "(a ** b) ** c");
        assert_eq!(roundtrip("not (a and b)\n"), "not (a and b)");
    }

    #[test]
    fn test_calls_and_comprehensions() {
        assert_eq!(
            roundtrip("app.route('/x', methods=m, **kw)\n"),
            "app.route('/x', methods=m, **kw)"
        );
        assert_eq!(
            roundtrip("[x * 2 for x, y in pairs if y]\n"),
            "[x * 2 for x, y in pairs if y]"
        );
    }

    #[test]
    fn test_fstrings_are_kept_verbatim() {
        assert_eq!(roundtrip("f'{a!r:>{width}}'\n"), "f'{a!r:>{width}}'");
    }
}
