//! Textual rendering and free-parameter analysis of compiled trees.

use std::collections::BTreeSet;
use std::fmt::Write;
use std::sync::Arc;

use crate::types::Value;

use super::{ConstantCell, Expr, Lambda, ParamId};

pub(super) fn render(expr: &Expr, plan: bool) -> String {
    let mut renderer = Renderer::new(plan);
    renderer.expr(expr);
    renderer.out
}

pub(super) fn render_lambda(lambda: &Lambda, plan: bool) -> String {
    let mut renderer = Renderer::new(plan);
    renderer.lambda(lambda);
    renderer.out
}

struct Renderer {
    plan: bool,
    cells: Vec<Arc<ConstantCell>>,
    out: String,
}

impl Renderer {
    fn new(plan: bool) -> Self {
        Renderer {
            plan,
            cells: Vec::new(),
            out: String::new(),
        }
    }

    fn text(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn cell(&mut self, cell: &Arc<ConstantCell>) {
        if !self.plan {
            let literal = literal(cell.value());
            let _ = write!(self.out, "@{literal}");
            return;
        }
        let index = match self.cells.iter().position(|c| Arc::ptr_eq(c, cell)) {
            Some(index) => index,
            None => {
                self.cells.push(Arc::clone(cell));
                self.cells.len() - 1
            }
        };
        let _ = write!(self.out, "@p{index}");
    }

    fn lambda(&mut self, lambda: &Lambda) {
        let _ = write!(self.out, "{} => ", lambda.param);
        self.expr(&lambda.body);
    }

    fn list(&mut self, exprs: &[Expr]) {
        for (i, e) in exprs.iter().enumerate() {
            if i > 0 {
                self.text(", ");
            }
            self.expr(e);
        }
    }

    fn method(&mut self, source: &Expr, name: &str, lambda: Option<&Lambda>) {
        self.expr(source);
        let _ = write!(self.out, ".{name}(");
        if let Some(lambda) = lambda {
            self.lambda(lambda);
        }
        self.text(")");
    }

    #[allow(clippy::too_many_lines)]
    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Constant { value, .. } => {
                let literal = literal(value);
                self.text(&literal);
            }
            Expr::Parameterized(cell) => self.cell(cell),
            Expr::Parameter { id, .. } => {
                let _ = write!(self.out, "{id}");
            }
            Expr::Property { source, name, .. } => {
                self.expr(source);
                let _ = write!(self.out, ".{name}");
            }
            Expr::DynamicProperty { source, name } => {
                self.expr(source);
                let _ = write!(self.out, "[\"{name}\"]");
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                self.text("(");
                self.expr(left);
                let _ = write!(self.out, " {} ", op.as_str());
                self.expr(right);
                self.text(")");
            }
            Expr::AndAlso(left, right) | Expr::OrElse(left, right) => {
                let op = if matches!(expr, Expr::AndAlso(..)) {
                    "AndAlso"
                } else {
                    "OrElse"
                };
                self.text("(");
                self.expr(left);
                let _ = write!(self.out, " {op} ");
                self.expr(right);
                self.text(")");
            }
            Expr::Not(operand) => {
                self.text("Not(");
                self.expr(operand);
                self.text(")");
            }
            Expr::Negate(operand) => {
                self.text("-(");
                self.expr(operand);
                self.text(")");
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
                ..
            } => {
                self.text("IIF(");
                self.expr(test);
                self.text(", ");
                self.expr(if_true);
                self.text(", ");
                self.expr(if_false);
                self.text(")");
            }
            Expr::IsNull(operand) => {
                self.text("(");
                self.expr(operand);
                self.text(" == null)");
            }
            Expr::IsTrue(operand) => {
                self.text("IsTrue(");
                self.expr(operand);
                self.text(")");
            }
            Expr::Convert {
                operand, target, ..
            } => {
                self.text("Convert(");
                self.expr(operand);
                let _ = write!(self.out, ", {target})");
            }
            Expr::TryConvert {
                operand, target, ..
            } => {
                self.text("TryConvert(");
                self.expr(operand);
                let _ = write!(self.out, ", {target})");
            }
            Expr::TypeIs {
                operand, type_name, ..
            } => {
                self.text("(");
                self.expr(operand);
                let _ = write!(self.out, " is {type_name})");
            }
            Expr::TypeAs {
                operand, type_name, ..
            } => {
                self.text("(");
                self.expr(operand);
                let _ = write!(self.out, " as {type_name})");
            }
            Expr::Call { function, args, .. } => {
                let _ = write!(self.out, "{}(", function.name());
                self.list(args);
                self.text(")");
            }
            Expr::Invoke { function, args, .. } => {
                let _ = write!(self.out, "Invoke {}(", function.name());
                self.list(args);
                self.text(")");
            }
            Expr::In { item, list } => {
                self.text("(");
                self.expr(item);
                self.text(" in ");
                self.expr(list);
                self.text(")");
            }
            Expr::Any { source, predicate } => self.method(source, "Any", predicate.as_ref()),
            Expr::All { source, predicate } => self.method(source, "All", Some(predicate)),
            Expr::Count(source) => self.method(source, "Count", None),
            Expr::Where { source, predicate } => self.method(source, "Where", Some(predicate)),
            Expr::OfType {
                source, type_name, ..
            } => {
                self.expr(source);
                let _ = write!(self.out, ".OfType<{type_name}>()");
            }
            Expr::OrderBy { source, keys } => {
                self.expr(source);
                self.text(".OrderBy(");
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        self.text(", ");
                    }
                    self.lambda(&key.selector);
                    self.text(if key.descending { " desc" } else { " asc" });
                }
                self.text(")");
            }
            Expr::Skip { source, count } => {
                self.expr(source);
                let _ = write!(self.out, ".Skip({count})");
            }
            Expr::Take { source, count } => {
                self.expr(source);
                let _ = write!(self.out, ".Take({count})");
            }
            Expr::Select { source, selector } => self.method(source, "Select", Some(selector)),
            Expr::SelectMany { source, selector } => {
                self.method(source, "SelectMany", Some(selector));
            }
            Expr::Buffer(source) => self.method(source, "Buffer", None),
            Expr::Let { param, value, body } => {
                let _ = write!(self.out, "Let({param} = ");
                self.expr(value);
                self.text(" in ");
                self.expr(body);
                self.text(")");
            }
            Expr::MakeBag {
                shape,
                instance,
                slots,
            } => {
                self.text("Bag {");
                let mut first = true;
                if let Some(instance) = instance {
                    self.text(" Instance = ");
                    self.expr(instance);
                    first = false;
                }
                for (slot, value) in shape.slots.iter().zip(slots) {
                    self.text(if first { " " } else { ", " });
                    first = false;
                    let _ = write!(self.out, "{} = ", slot.name);
                    self.expr(value);
                }
                self.text(" }");
            }
            Expr::GroupBy { source, key } => self.method(source, "GroupBy", Some(key)),
            Expr::GroupKey(source) => {
                self.expr(source);
                self.text(".Key");
            }
            Expr::GroupElements(source) => {
                self.expr(source);
                self.text(".Elements");
            }
            Expr::MakeGroupResult {
                key, aggregates, ..
            } => {
                self.text("Group(");
                self.expr(key);
                self.text(", ");
                self.expr(aggregates);
                self.text(")");
            }
            Expr::Aggregate {
                source,
                method,
                selector,
                ..
            } => self.method(source, method.as_str(), selector.as_ref()),
        }
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::String(s) => format!("'{s}'"),
        Value::Int32(v) => v.to_string(),
        Value::Int64(v) => format!("{v}L"),
        Value::Double(v) => format!("{v}d"),
        Value::Decimal(v) => format!("{v}m"),
        Value::Enum(e) => format!("{}'{}'", e.type_name, e.value),
        Value::Collection(items) => {
            let rendered: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", rendered.join(", "))
        }
        other => format!("{other:?}"),
    }
}

/// Collects parameters referenced outside the lambda or let that binds them.
pub(super) fn collect_free(expr: &Expr, bound: &mut Vec<ParamId>, free: &mut BTreeSet<ParamId>) {
    fn lambda(l: &Lambda, bound: &mut Vec<ParamId>, free: &mut BTreeSet<ParamId>) {
        bound.push(l.param);
        collect_free(&l.body, bound, free);
        bound.pop();
    }

    match expr {
        Expr::Constant { .. } | Expr::Parameterized(_) => {}
        Expr::Parameter { id, .. } => {
            if !bound.contains(id) {
                free.insert(*id);
            }
        }
        Expr::Property { source, .. }
        | Expr::DynamicProperty { source, .. }
        | Expr::Not(source)
        | Expr::Negate(source)
        | Expr::IsNull(source)
        | Expr::IsTrue(source)
        | Expr::Convert {
            operand: source, ..
        }
        | Expr::TryConvert {
            operand: source, ..
        }
        | Expr::TypeIs {
            operand: source, ..
        }
        | Expr::TypeAs {
            operand: source, ..
        }
        | Expr::Count(source)
        | Expr::OfType { source, .. }
        | Expr::Skip { source, .. }
        | Expr::Take { source, .. }
        | Expr::Buffer(source)
        | Expr::GroupKey(source)
        | Expr::GroupElements(source) => collect_free(source, bound, free),
        Expr::Binary { left, right, .. }
        | Expr::AndAlso(left, right)
        | Expr::OrElse(left, right)
        | Expr::In {
            item: left,
            list: right,
        }
        | Expr::MakeGroupResult {
            key: left,
            aggregates: right,
            ..
        } => {
            collect_free(left, bound, free);
            collect_free(right, bound, free);
        }
        Expr::Conditional {
            test,
            if_true,
            if_false,
            ..
        } => {
            collect_free(test, bound, free);
            collect_free(if_true, bound, free);
            collect_free(if_false, bound, free);
        }
        Expr::Call { args, .. } | Expr::Invoke { args, .. } => {
            for arg in args {
                collect_free(arg, bound, free);
            }
        }
        Expr::Any { source, predicate } => {
            collect_free(source, bound, free);
            if let Some(predicate) = predicate {
                lambda(predicate, bound, free);
            }
        }
        Expr::All {
            source, predicate, ..
        }
        | Expr::Where { source, predicate } => {
            collect_free(source, bound, free);
            lambda(predicate, bound, free);
        }
        Expr::Select {
            source,
            selector: predicate,
        }
        | Expr::SelectMany {
            source,
            selector: predicate,
        }
        | Expr::GroupBy {
            source,
            key: predicate,
        } => {
            collect_free(source, bound, free);
            lambda(predicate, bound, free);
        }
        Expr::OrderBy { source, keys } => {
            collect_free(source, bound, free);
            for key in keys {
                lambda(&key.selector, bound, free);
            }
        }
        Expr::Aggregate {
            source, selector, ..
        } => {
            collect_free(source, bound, free);
            if let Some(selector) = selector {
                lambda(selector, bound, free);
            }
        }
        Expr::Let { param, value, body } => {
            collect_free(value, bound, free);
            bound.push(*param);
            collect_free(body, bound, free);
            bound.pop();
        }
        Expr::MakeBag {
            instance, slots, ..
        } => {
            if let Some(instance) = instance {
                collect_free(instance, bound, free);
            }
            for slot in slots {
                collect_free(slot, bound, free);
            }
        }
    }
}
