//! Evaluates a parsed rule against one transaction.
//!
//! The only inputs are the transaction's fields. Nothing in the language
//! can reach the ledger, the chain or the host.

use thiserror::Error;

use super::parser::{CmpOp, Decision, Expr, Field, Program, Stmt};
use crate::blockchain::transaction::Transaction;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("type mismatch: cannot apply {op} to {left} and {right}")]
    TypeMismatch {
        op: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("condition must be a boolean, got {0}")]
    NonBooleanCondition(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Number(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
        }
    }
}

/// Runs `program`, returning the first decision reached
///
/// `None` means the rule finished without choosing.
pub fn run(program: &Program, transaction: &Transaction) -> Result<Option<Decision>, EvalError> {
    execute_block(&program.statements, transaction)
}

fn execute_block(statements: &[Stmt], transaction: &Transaction) -> Result<Option<Decision>, EvalError> {
    for statement in statements {
        let decision = match statement {
            Stmt::Decide(decision) => Some(*decision),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if truthy(condition, transaction)? {
                    execute_block(then_branch, transaction)?
                } else {
                    execute_block(else_branch, transaction)?
                }
            }
        };

        if decision.is_some() {
            return Ok(decision);
        }
    }

    Ok(None)
}

fn truthy(expr: &Expr, transaction: &Transaction) -> Result<bool, EvalError> {
    match evaluate(expr, transaction)? {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::NonBooleanCondition(other.kind())),
    }
}

fn evaluate(expr: &Expr, transaction: &Transaction) -> Result<Value, EvalError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Field(field) => Ok(read_field(*field, transaction)),
        Expr::Not(inner) => Ok(Value::Bool(!truthy(inner, transaction)?)),
        Expr::And(left, right) => {
            Ok(Value::Bool(truthy(left, transaction)? && truthy(right, transaction)?))
        }
        Expr::Or(left, right) => {
            Ok(Value::Bool(truthy(left, transaction)? || truthy(right, transaction)?))
        }
        Expr::Compare(op, left, right) => {
            let left = evaluate(left, transaction)?;
            let right = evaluate(right, transaction)?;
            compare(*op, &left, &right).map(Value::Bool)
        }
    }
}

fn read_field(field: Field, transaction: &Transaction) -> Value {
    match field {
        Field::Sender => Value::Str(transaction.sender.0.clone()),
        Field::Recipient => Value::Str(transaction.recipient.0.clone()),
        Field::Amount => Value::Number(transaction.amount),
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) if matches!(op, CmpOp::Eq | CmpOp::Ne) => Some(a.cmp(b)),
        _ => {
            return Err(EvalError::TypeMismatch {
                op: format!("{:?}", op),
                left: left.kind(),
                right: right.kind(),
            })
        }
    };

    // NaN never compares; only `!=` holds
    let Some(ordering) = ordering else {
        return Ok(op == CmpOp::Ne);
    };

    Ok(match op {
        CmpOp::Eq => ordering.is_eq(),
        CmpOp::Ne => ordering.is_ne(),
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
    })
}
