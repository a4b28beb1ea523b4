use serde_json::{Map, Value};

use crate::ast::{CompareOp, Expr, LogicalOp};
use crate::error::{ExprError, Result};
use crate::functions::FunctionTable;

/// Truthiness used by every boolean position in a condition.
///
/// `null`, `false`, numeric zero, the empty string, the empty array and
/// the empty object are false. Everything else is true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Numeric view of a value for equality. Booleans count as 0 and 1.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    if !left.is_number() && !right.is_number() {
        return left == right;
    }
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => l == r,
        _ => false,
    }
}

/// Evaluates an [`Expr`] against a run-time context.
///
/// `context` holds the reserved `$output`, `$status` and `$state` keys.
/// `state_context` is the node's own free-form context. A `$` name reads
/// only from `context`; a bare name tries `state_context` first.
pub struct Evaluator<'a> {
    pub context: &'a Map<String, Value>,
    pub state_context: &'a Map<String, Value>,
    pub functions: &'a FunctionTable,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        context: &'a Map<String, Value>,
        state_context: &'a Map<String, Value>,
        functions: &'a FunctionTable,
    ) -> Self {
        Self {
            context,
            state_context,
            functions,
        }
    }

    pub fn evaluate(&self, expr: &Expr) -> Result<bool> {
        match expr {
            Expr::Literal(lit) => Ok(truthy(&lit.to_value())),
            Expr::Variable(name) => Ok(truthy(self.resolve(name)?)),
            Expr::Comparison { op, left, right } => {
                let left = self.operand(left)?;
                let right = self.operand(right)?;
                compare(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                // Both sides run before combining.
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                Ok(match op {
                    LogicalOp::And => left && right,
                    LogicalOp::Or => left || right,
                })
            }
            Expr::Not(inner) => Ok(!self.evaluate(inner)?),
            Expr::FunctionRef(path) => Ok(truthy(&self.functions.call(path)?)),
        }
    }

    fn operand(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(lit) => Ok(lit.to_value()),
            Expr::Variable(name) => self.resolve(name).cloned(),
            Expr::FunctionRef(path) => self.functions.call(path),
            other => self.evaluate(other).map(Value::Bool),
        }
    }

    /// Look a variable up, following dotted segments into nested objects.
    pub fn resolve(&self, name: &str) -> Result<&'a Value> {
        let mut segments = name.split('.');
        let head = segments.next().unwrap_or_default();

        let root = if head.starts_with('$') {
            self.context.get(head)
        } else {
            self.state_context
                .get(head)
                .or_else(|| self.context.get(head))
        };
        let mut current = root.ok_or_else(|| ExprError::UnresolvedVariable(name.to_string()))?;

        for segment in segments {
            current = current
                .as_object()
                .and_then(|map| map.get(segment))
                .ok_or_else(|| ExprError::UnresolvedVariable(name.to_string()))?;
        }
        Ok(current)
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool> {
    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::NotEq => Ok(!values_equal(left, right)),
        CompareOp::Gt | CompareOp::Lt => {
            let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) else {
                return Err(ExprError::TypeMismatch {
                    op: op.to_string(),
                    left: type_name(left).to_string(),
                    right: type_name(right).to_string(),
                });
            };
            Ok(if op == CompareOp::Gt { l > r } else { l < r })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::lower;
    use crate::parser::parse;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    fn eval_with(input: &str, context: Value, state: Value) -> Result<bool> {
        let context = map(context);
        let state = map(state);
        let functions = FunctionTable::new();
        let expr = lower(&parse(input)?)?;
        Evaluator::new(&context, &state, &functions).evaluate(&expr)
    }

    fn eval(input: &str) -> Result<bool> {
        eval_with(input, json!({}), json!({}))
    }

    #[test]
    fn test_boolean_literals() {
        assert!(eval("true").unwrap());
        assert!(!eval("false").unwrap());
    }

    #[test]
    fn test_literal_truthiness() {
        assert!(!eval("''").unwrap());
        assert!(!eval("0").unwrap());
        assert!(eval("'x'").unwrap());
        assert!(eval("-1").unwrap());
    }

    #[test]
    fn test_truthy_rule() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!([])));
        assert!(!truthy(&json!({})));
        assert!(!truthy(&json!(0.0)));
        assert!(truthy(&json!([0])));
        assert!(truthy(&json!({"a": false})));
    }

    #[test]
    fn test_comparison_against_state_context() {
        let state = json!({"x": 5});
        assert!(eval_with("x == 5", json!({}), state.clone()).unwrap());
        assert!(eval_with("x > 4", json!({}), state.clone()).unwrap());
        assert!(!eval_with("x > 6", json!({}), state.clone()).unwrap());
        assert!(eval_with("x < 6", json!({}), state.clone()).unwrap());
        assert!(!eval_with("x < 4", json!({}), state).unwrap());
    }

    #[test]
    fn test_numeric_equality_by_value() {
        assert!(eval_with("x == 5.0", json!({}), json!({"x": 5})).unwrap());
        assert!(eval("1 != 2").unwrap());
    }

    #[test]
    fn test_bool_equals_number_as_zero_or_one() {
        let state = json!({"flag": true, "off": false, "n": 1});
        assert!(eval_with("flag == 1", json!({}), state.clone()).unwrap());
        assert!(!eval_with("flag == 0", json!({}), state.clone()).unwrap());
        assert!(eval_with("off == 0", json!({}), state.clone()).unwrap());
        assert!(eval_with("flag != 2", json!({}), state.clone()).unwrap());
        assert!(eval_with("n == true", json!({}), state.clone()).unwrap());
        assert!(!eval_with("flag == 'true'", json!({}), state.clone()).unwrap());
        let nulls = json!({"off": false, "none": null});
        assert!(!eval_with("off == none", json!({}), nulls).unwrap());
    }

    #[test]
    fn test_bare_name_prefers_state_context() {
        let ctx = json!({"mode": "ctx"});
        let state = json!({"mode": "state"});
        assert!(eval_with("mode == 'state'", ctx.clone(), state).unwrap());
        assert!(eval_with("mode == 'ctx'", ctx, json!({})).unwrap());
    }

    #[test]
    fn test_dollar_name_ignores_state_context() {
        let err = eval_with("$status == 'ok'", json!({}), json!({"$status": "ok"})).unwrap_err();
        assert_eq!(err, ExprError::UnresolvedVariable("$status".into()));
    }

    #[test]
    fn test_nested_output_path() {
        let ctx = json!({"$output": {"count": 3, "meta": {"tag": "b"}}, "$status": "executing"});
        assert!(eval_with("$output.count > 2", ctx.clone(), json!({})).unwrap());
        assert!(eval_with("$output.meta.tag == 'b'", ctx.clone(), json!({})).unwrap());
        assert!(eval_with("$status == \"executing\"", ctx.clone(), json!({})).unwrap());
        assert!(eval_with("$output.missing", ctx, json!({})).is_err());
    }

    #[test]
    fn test_unresolved_variable_is_error() {
        assert_eq!(
            eval("ghost").unwrap_err(),
            ExprError::UnresolvedVariable("ghost".into())
        );
    }

    #[test]
    fn test_ordering_requires_numbers() {
        let err = eval("'a' > 1").unwrap_err();
        assert!(matches!(err, ExprError::TypeMismatch { .. }));
    }

    #[test]
    fn test_logical_evaluates_both_sides() {
        // The right side fails even though the left already decides.
        assert!(eval("false && ghost").is_err());
        assert!(eval("true || ghost").is_err());
        assert!(eval("true and not false").unwrap());
    }

    #[test]
    fn test_parenthesised_operand() {
        assert!(eval("(1 < 2) == true").unwrap());
        assert!(eval("!(1 > 2)").unwrap());
    }

    #[test]
    fn test_function_ref() {
        let ctx = Map::new();
        let mut functions = FunctionTable::new();
        functions.register("checks.ready", || Ok(json!(true)));
        functions.register("checks.count", || Ok(json!(4)));
        let evaluator = Evaluator::new(&ctx, &ctx, &functions);

        let ready = lower(&parse("checks.ready").unwrap()).unwrap();
        assert!(evaluator.evaluate(&ready).unwrap());

        let count = lower(&parse("checks.count > 3").unwrap()).unwrap();
        assert!(evaluator.evaluate(&count).unwrap());

        let missing = lower(&parse("checks.nope").unwrap()).unwrap();
        assert!(matches!(
            evaluator.evaluate(&missing),
            Err(ExprError::InvalidSpec(_))
        ));
    }
}
