//! Vectorized evaluator for parsed derived-column expressions.

use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};

use super::parser::{BinaryOp, Expr};

/// Environment of numeric-coerced columns visible to one evaluation.
pub type Env = BTreeMap<String, Vec<Option<f64>>>;

/// Evaluate `expr` against `env`, producing one value per row.
///
/// Null operands propagate; ±∞ in the final result becomes null (NaN is kept
/// and dropped by downstream numeric filters).
pub fn evaluate(expr: &Expr, env: &Env, rows: usize, context: &str) -> CoreResult<Vec<Option<f64>>> {
    let raw = eval_node(expr, env, rows, context)?;
    Ok(raw
        .into_iter()
        .map(|v| v.filter(|x| !x.is_infinite()))
        .collect())
}

fn eval_node(expr: &Expr, env: &Env, rows: usize, context: &str) -> CoreResult<Vec<Option<f64>>> {
    match expr {
        Expr::Literal(value) => Ok(vec![Some(*value); rows]),
        Expr::Ref(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::ColumnNotFound {
                column: name.clone(),
                context: context.to_string(),
            }),
        Expr::Neg(inner) => {
            let values = eval_node(inner, env, rows, context)?;
            Ok(values.into_iter().map(|v| v.map(|x| -x)).collect())
        }
        Expr::Binary { op, lhs, rhs } => {
            let left = eval_node(lhs, env, rows, context)?;
            let right = eval_node(rhs, env, rows, context)?;
            Ok(left
                .into_iter()
                .zip(right)
                .map(|(a, b)| match (a, b) {
                    (Some(a), Some(b)) => Some(apply_binary(*op, a, b)),
                    _ => None,
                })
                .collect())
        }
        Expr::Call { func, arg } => {
            let values = eval_node(arg, env, rows, context)?;
            Ok(values.into_iter().map(|v| v.map(|x| func.apply(x))).collect())
        }
    }
}

fn apply_binary(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
    }
}

#[cfg(test)]
mod tests {
    use super::{Env, evaluate};
    use crate::derived::parser::parse;

    fn env_of(pairs: &[(&str, Vec<Option<f64>>)]) -> Env {
        pairs
            .iter()
            .map(|(name, values)| (name.to_string(), values.clone()))
            .collect()
    }

    #[test]
    fn arithmetic_follows_precedence() {
        let env = env_of(&[("a", vec![Some(3.0)]), ("b", vec![Some(4.0)])]);
        let expr = parse("[a] + [b] * 2").unwrap();
        assert_eq!(evaluate(&expr, &env, 1, "test").unwrap(), vec![Some(11.0)]);
    }

    #[test]
    fn pythagoras_example() {
        let env = env_of(&[("a", vec![Some(3.0)]), ("b", vec![Some(4.0)])]);
        let expr = parse("sqrt(([a]*[a])+([b]*[b]))").unwrap();
        assert_eq!(evaluate(&expr, &env, 1, "test").unwrap(), vec![Some(5.0)]);
    }

    #[test]
    fn nulls_propagate() {
        let env = env_of(&[("a", vec![Some(1.0), None])]);
        let expr = parse("[a] * 2").unwrap();
        assert_eq!(
            evaluate(&expr, &env, 2, "test").unwrap(),
            vec![Some(2.0), None]
        );
    }

    #[test]
    fn division_by_zero_becomes_null() {
        let env = env_of(&[("a", vec![Some(1.0), Some(-1.0), Some(0.0)])]);
        let expr = parse("[a] / 0").unwrap();
        let out = evaluate(&expr, &env, 3, "test").unwrap();
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        // 0/0 is NaN, which is kept for downstream numeric filters.
        assert!(out[2].is_some_and(f64::is_nan));
    }

    #[test]
    fn natural_log_and_log10_differ() {
        let env = env_of(&[("a", vec![Some(100.0)])]);
        let ln = parse("log([a])").unwrap();
        let l10 = parse("log10([a])").unwrap();
        let ln_out = evaluate(&ln, &env, 1, "test").unwrap()[0].unwrap();
        let l10_out = evaluate(&l10, &env, 1, "test").unwrap()[0].unwrap();
        assert!((ln_out - 100.0_f64.ln()).abs() < 1e-12);
        assert!((l10_out - 2.0).abs() < 1e-12);
    }
}
