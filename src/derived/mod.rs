//! Derived-column engine.
//!
//! Validates an ordered list of `{name, expression}` specs against a base
//! schema, plans the minimal column reads for a target set, and evaluates
//! specs chunk-by-chunk with ordered dependencies (each spec may reference
//! base columns and previously defined derived names only).

pub mod eval;
pub mod parser;

pub use eval::{Env, evaluate};
pub use parser::{Expr, ExprError, ExprErrorKind, Func, parse};

use std::collections::BTreeSet;

use crate::error::{CoreError, CoreResult};
use crate::frame::{Column, Frame};
use crate::types::DerivedSpec;

/// Expression length cap.
pub const MAX_EXPRESSION_LEN: usize = 500;

/// A validated spec with its parsed expression and references.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSpec {
    pub name: String,
    pub expression: String,
    pub expr: Expr,
    pub refs: Vec<String>,
}

/// Column-read plan for a target set over base + derived columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormulaPlan {
    /// Transitive closure of required specs, in original list order.
    pub derived: Vec<DerivedSpec>,
    /// Base columns that must be read, in base-schema order.
    pub read_columns: Vec<String>,
    /// Names of the required derived columns, in original list order.
    pub derived_names: Vec<String>,
}

/// Trim, drop fully-empty entries, reject half-filled entries and duplicate
/// names. The returned list preserves order.
pub fn normalize(items: &[DerivedSpec]) -> CoreResult<Vec<DerivedSpec>> {
    let mut out: Vec<DerivedSpec> = Vec::new();
    for item in items {
        let name = item.name.trim();
        let expression = item.expression.trim();
        if name.is_empty() && expression.is_empty() {
            continue;
        }
        if name.is_empty() || expression.is_empty() {
            return Err(CoreError::InvalidJob(
                "each derived column requires both name and expression".to_string(),
            ));
        }
        out.push(DerivedSpec::new(name, expression));
    }

    let mut seen = BTreeSet::new();
    for spec in &out {
        if !seen.insert(spec.name.clone()) {
            return Err(CoreError::DuplicateName(spec.name.clone()));
        }
    }
    Ok(out)
}

/// Validate normalized specs against base columns: name collisions, length
/// caps, unknown references and forward references all fail here, before any
/// data is scanned.
pub fn validate(base_columns: &[String], specs: &[DerivedSpec]) -> CoreResult<Vec<ParsedSpec>> {
    let base: BTreeSet<&str> = base_columns.iter().map(String::as_str).collect();
    let names: BTreeSet<&str> = specs.iter().map(|s| s.name.as_str()).collect();

    for spec in specs {
        if base.contains(spec.name.as_str()) {
            return Err(CoreError::InvalidJob(format!(
                "derived column '{}' already exists in dataset",
                spec.name
            )));
        }
        if spec.expression.len() > MAX_EXPRESSION_LEN {
            return Err(CoreError::ExpressionTooLong {
                name: spec.name.clone(),
                len: spec.expression.len(),
                max: MAX_EXPRESSION_LEN,
            });
        }
    }

    let mut available: BTreeSet<String> = base_columns.iter().cloned().collect();
    let mut parsed = Vec::with_capacity(specs.len());
    for spec in specs {
        let expr = parse(&spec.expression).map_err(|e| match e.kind {
            ExprErrorKind::UnknownFunction(func) => CoreError::UnknownFunction(func),
            ExprErrorKind::Syntax(detail) => CoreError::Expression {
                name: spec.name.clone(),
                position: e.position,
                detail,
            },
        })?;
        let refs = expr.refs();

        for reference in &refs {
            if available.contains(reference) {
                continue;
            }
            if names.contains(reference.as_str()) {
                return Err(CoreError::ForwardReference {
                    name: spec.name.clone(),
                    reference: reference.clone(),
                });
            }
            return Err(CoreError::ColumnNotFound {
                column: reference.clone(),
                context: format!("expression for '{}'", spec.name),
            });
        }

        available.insert(spec.name.clone());
        parsed.push(ParsedSpec {
            name: spec.name.clone(),
            expression: spec.expression.clone(),
            expr,
            refs,
        });
    }
    Ok(parsed)
}

/// Build the minimal read plan for `targets` over `base_columns` plus
/// `derived_columns`: which specs must run (transitive closure, original
/// order) and which base columns must be read.
pub fn build_formula_plan(
    base_columns: &[String],
    derived_columns: &[DerivedSpec],
    targets: &[&str],
) -> CoreResult<FormulaPlan> {
    let targets: Vec<&str> = targets.iter().copied().filter(|t| !t.is_empty()).collect();
    let specs = normalize(derived_columns)?;
    if specs.is_empty() {
        let read_columns = targets
            .iter()
            .filter(|t| base_columns.iter().any(|b| b == *t))
            .map(|t| t.to_string())
            .collect();
        return Ok(FormulaPlan {
            derived: Vec::new(),
            read_columns,
            derived_names: Vec::new(),
        });
    }

    let parsed = validate(base_columns, &specs)?;

    // Transitive closure of derived specs required by the targets.
    let mut needed: BTreeSet<String> = BTreeSet::new();
    fn visit(name: &str, parsed: &[ParsedSpec], needed: &mut BTreeSet<String>) {
        if needed.contains(name) {
            return;
        }
        let Some(spec) = parsed.iter().find(|s| s.name == name) else {
            return;
        };
        needed.insert(name.to_string());
        for reference in &spec.refs {
            visit(reference, parsed, needed);
        }
    }
    for target in &targets {
        visit(target, &parsed, &mut needed);
    }

    let required: Vec<&ParsedSpec> = parsed.iter().filter(|s| needed.contains(&s.name)).collect();
    let derived_names: Vec<String> = required.iter().map(|s| s.name.clone()).collect();
    let derived_set: BTreeSet<&str> = derived_names.iter().map(String::as_str).collect();

    let mut read_set: BTreeSet<String> = BTreeSet::new();
    for target in &targets {
        if base_columns.iter().any(|b| b == target) && !derived_set.contains(target) {
            read_set.insert(target.to_string());
        }
    }
    for spec in &required {
        for reference in &spec.refs {
            if !derived_set.contains(reference.as_str()) {
                read_set.insert(reference.clone());
            }
        }
    }

    let read_columns = base_columns
        .iter()
        .filter(|c| read_set.contains(*c))
        .cloned()
        .collect();

    Ok(FormulaPlan {
        derived: required
            .iter()
            .map(|s| DerivedSpec::new(s.name.clone(), s.expression.clone()))
            .collect(),
        read_columns,
        derived_names,
    })
}

/// Evaluate specs over one frame, returning the frame extended with the
/// derived columns (in spec order). Later specs see earlier results.
pub fn apply_to_frame(frame: &Frame, derived_columns: &[DerivedSpec]) -> CoreResult<Frame> {
    let specs = normalize(derived_columns)?;
    if specs.is_empty() {
        return Ok(frame.clone());
    }
    let parsed = validate(frame.names(), &specs)?;

    let rows = frame.len();
    let mut env: Env = Env::new();
    for name in frame.names() {
        if let Some(column) = frame.column_by_name(name) {
            env.insert(name.clone(), column.numeric());
        }
    }

    let mut out = frame.clone();
    for spec in &parsed {
        let context = format!("derived column '{}'", spec.name);
        let values = evaluate(&spec.expr, &env, rows, &context)?;
        env.insert(spec.name.clone(), values.clone());
        out.push_column(spec.name.clone(), Column::Float64(values));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{apply_to_frame, build_formula_plan, normalize, validate};
    use crate::error::CoreError;
    use crate::frame::{Column, Frame};
    use crate::types::DerivedSpec;

    fn base() -> Vec<String> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    }

    #[test]
    fn normalize_drops_empty_and_rejects_half_filled() {
        let specs = vec![
            DerivedSpec::new("  ", "  "),
            DerivedSpec::new(" d ", " [a]+[b] "),
        ];
        let out = normalize(&specs).unwrap();
        assert_eq!(out, vec![DerivedSpec::new("d", "[a]+[b]")]);

        let err = normalize(&[DerivedSpec::new("d", "")]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidJob(_)));
    }

    #[test]
    fn duplicate_names_fail() {
        let specs = vec![DerivedSpec::new("d", "1"), DerivedSpec::new("d", "2")];
        assert!(matches!(
            normalize(&specs).unwrap_err(),
            CoreError::DuplicateName(_)
        ));
    }

    #[test]
    fn forward_references_fail_but_backward_succeed() {
        let forward = vec![
            DerivedSpec::new("d", "[e] + 1"),
            DerivedSpec::new("e", "[a]"),
        ];
        assert!(matches!(
            validate(&base(), &forward).unwrap_err(),
            CoreError::ForwardReference { .. }
        ));

        let backward = vec![
            DerivedSpec::new("e", "[a]"),
            DerivedSpec::new("d", "[e] + 1"),
        ];
        assert!(validate(&base(), &backward).is_ok());
    }

    #[test]
    fn unknown_reference_names_the_spec() {
        let specs = vec![DerivedSpec::new("d", "[missing]")];
        match validate(&base(), &specs).unwrap_err() {
            CoreError::ColumnNotFound { column, context } => {
                assert_eq!(column, "missing");
                assert!(context.contains("'d'"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn base_collision_is_rejected() {
        let specs = vec![DerivedSpec::new("a", "1")];
        assert!(validate(&base(), &specs).is_err());
    }

    #[test]
    fn expression_length_cap() {
        let long = format!("[a]{}", " + 1".repeat(200));
        let specs = vec![DerivedSpec::new("d", long)];
        assert!(matches!(
            validate(&base(), &specs).unwrap_err(),
            CoreError::ExpressionTooLong { .. }
        ));
    }

    #[test]
    fn plan_computes_transitive_closure_and_reads() {
        let derived = vec![
            DerivedSpec::new("d", "[a] + [b]"),
            DerivedSpec::new("e", "[d] * 2"),
            DerivedSpec::new("unused", "[c]"),
        ];
        let plan = build_formula_plan(&base(), &derived, &["e", "a"]).unwrap();
        assert_eq!(plan.derived_names, ["d", "e"]);
        assert_eq!(plan.read_columns, ["a", "b"]);
    }

    #[test]
    fn plan_without_specs_filters_targets_to_base() {
        let plan = build_formula_plan(&base(), &[], &["a", "nope"]).unwrap();
        assert_eq!(plan.read_columns, ["a"]);
        assert!(plan.derived.is_empty());
    }

    #[test]
    fn apply_extends_frame_in_order() {
        let frame = Frame::new(
            vec!["a".into(), "b".into()],
            vec![
                Column::Float64(vec![Some(3.0)]),
                Column::Float64(vec![Some(4.0)]),
            ],
        );
        let specs = vec![
            DerivedSpec::new("c", "[a]+[b]"),
            DerivedSpec::new("d", "sqrt(([a]*[a])+([b]*[b]))"),
        ];
        let out = apply_to_frame(&frame, &specs).unwrap();
        assert_eq!(out.names(), ["a", "b", "c", "d"]);
        assert_eq!(out.numeric_by_name("c", "t").unwrap(), vec![Some(7.0)]);
        assert_eq!(out.numeric_by_name("d", "t").unwrap(), vec![Some(5.0)]);
    }

    #[test]
    fn apply_is_order_preserving_versus_sequential_extension() {
        let frame = Frame::new(
            vec!["a".into()],
            vec![Column::Float64(vec![Some(2.0), Some(5.0)])],
        );
        let s1 = DerivedSpec::new("x", "[a] * 10");
        let s2 = DerivedSpec::new("y", "[x] + 1");

        let all_at_once = apply_to_frame(&frame, &[s1.clone(), s2.clone()]).unwrap();
        let stepwise = {
            let step1 = apply_to_frame(&frame, &[s1]).unwrap();
            apply_to_frame(&step1, &[s2]).unwrap()
        };
        assert_eq!(all_at_once, stepwise);
    }
}
