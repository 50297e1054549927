//! Instructions → query text.
//!
//! Clauses are emitted in the fixed order START, MATCH, WHERE, ORDER BY,
//! RETURN, SKIP, LIMIT whatever order the instructions were recorded in.
//! A counting RETURN drops ORDER BY, SKIP and LIMIT.

use super::ast::Instruction;

pub fn render(instructions: &[Instruction]) -> String {
    let mut start = Vec::new();
    let mut legs = Vec::new();
    let mut predicates = Vec::new();
    let mut order = None;
    let mut returns = None;
    let mut skip = None;
    let mut limit = None;

    for instruction in instructions {
        match instruction {
            Instruction::Start { alias, param } => start.push(format!("{alias}=node(${param})")),
            Instruction::Match { legs: hop, .. } => legs.extend(hop.iter().map(ToString::to_string)),
            Instruction::Where(predicate) => predicates.push(predicate.as_str()),
            Instruction::Order { expr, descending } => {
                order = Some(if *descending { format!("{expr} DESC") } else { expr.clone() });
            }
            Instruction::Return { items, count } => returns = Some((items, *count)),
            Instruction::Skip(param) => skip = Some(param),
            Instruction::Limit(param) => limit = Some(param),
        }
    }

    let counting = matches!(returns, Some((_, true)));
    let mut clauses = Vec::new();
    if !start.is_empty() {
        clauses.push(format!("START {}", start.join(", ")));
    }
    if !legs.is_empty() {
        clauses.push(format!("MATCH {}", legs.join(", ")));
    }
    if !predicates.is_empty() {
        clauses.push(format!("WHERE {}", predicates.join(" AND ")));
    }
    if let (Some(order), false) = (order, counting) {
        clauses.push(format!("ORDER BY {order}"));
    }
    if let Some((items, count)) = returns {
        if count {
            let counted: Vec<String> = items.iter().map(|i| format!("count({i})")).collect();
            clauses.push(format!("RETURN {}", counted.join(", ")));
        } else {
            clauses.push(format!("RETURN {}", items.join(", ")));
        }
    }
    if !counting {
        if let Some(param) = skip {
            clauses.push(format!("SKIP ${param}"));
        }
        if let Some(param) = limit {
            clauses.push(format!("LIMIT ${param}"));
        }
    }
    clauses.join(" ")
}
