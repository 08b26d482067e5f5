/*
Copyright 2021 Robin Marchart

   Licensed under the Apache License, Version 2.0 (the "License");
   you may not use this file except in compliance with the License.
   You may obtain a copy of the License at

       http://www.apache.org/licenses/LICENSE-2.0

   Unless required by applicable law or agreed to in writing, software
   distributed under the License is distributed on an "AS IS" BASIS,
   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
   See the License for the specific language governing permissions and
   limitations under the License.
*/

//! Prefix-notation arithmetic expressions over a caller-supplied base value.
//!
//! An [Expression] is an ordered list of (operator, operand) pairs parsed
//! from strings like `"* 3 - 1"` and folded left to right over a base value,
//! so that with a base of 3 the example yields `(3 * 3) - 1 = 8`. Dice
//! formulas bind expressions to their `$NAME` variables to compute component
//! values at evaluation time.

#[cfg(feature = "logging")]
use log::debug;
use std::num::IntErrorKind;

/// Supplies the starting value for evaluation, typically some dynamic game
/// quantity such as the current character level. Shared, never owned.
pub type BaseValue = fn() -> i32;

/// Upper bound on operations accepted by a single parsing call. Tokens past
/// the limit are dropped, not rejected.
const MAX_OPERATIONS: usize = 50;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Neg,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
struct Operation {
    operator: Operator,
    operand: i16,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum ExpressionError {
    #[error("unrecognized operator token")]
    InvalidOperator,
    #[error("operator is missing its operand")]
    ExpectedOperand,
    #[error("expression must start with an operator")]
    ExpectedOperator,
    #[error("literal division by zero")]
    DivideByZero,
    #[error("operand does not fit in 16 bits")]
    OperandOutOfBounds,
}

/// Parser states: either at a clean start, just behind an operator that
/// still owes an operand, or behind at least one operand.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum State {
    Start,
    Operator,
    Operand,
}

enum Token {
    Operator(Operator),
    Value(i64),
}

impl Token {
    /// A token is an integer if it parses as one; otherwise its leading
    /// character decides the operator.
    fn classify(raw: &str) -> Result<Token, ExpressionError> {
        match raw.parse::<i64>() {
            Ok(value) => return Ok(Token::Value(value)),
            Err(err)
                if *err.kind() == IntErrorKind::PosOverflow
                    || *err.kind() == IntErrorKind::NegOverflow =>
            {
                return Err(ExpressionError::OperandOutOfBounds)
            }
            Err(_) => {}
        }

        let operator = match raw.bytes().next() {
            Some(b'+') => Operator::Add,
            Some(b'-') => Operator::Sub,
            Some(b'*') => Operator::Mul,
            Some(b'/') => Operator::Div,
            Some(b'n') | Some(b'N') => Operator::Neg,
            _ => return Err(ExpressionError::InvalidOperator),
        };
        Ok(Token::Operator(operator))
    }
}

/// A compiled arithmetic expression. Cloning produces a fully independent
/// copy; the base value function pointer is shared.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Expression {
    base_value: Option<BaseValue>,
    operations: Vec<Operation>,
}

impl Expression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the callback evaluation starts from. Without one, evaluation
    /// starts at zero.
    pub fn set_base_value(&mut self, function: BaseValue) {
        self.base_value = Some(function);
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Parse a prefix-notation string and append its operations.
    ///
    /// Tokens are space separated. The string must begin with an operator.
    /// The binary operators `+ - * /` are variadic: each following integer
    /// token becomes one operation reusing that operator, so `"+ 1 2 3"`
    /// compiles to three additions. The unary `n`/`N` negates the running
    /// value and must be followed by another operator, never by a number.
    /// An empty string is the identity and adds nothing.
    ///
    /// Calls accumulate: parsing `"* 3"` and later `"- 1"` onto the same
    /// expression behaves exactly like parsing `"* 3 - 1"` once.
    ///
    /// At most 50 operations are taken per call; anything past that is
    /// silently dropped. Operands must fit in 16 bits and a literal `/ 0`
    /// is rejected here so evaluation can never fail.
    ///
    /// Returns the number of operations added.
    pub fn add_operations_string(&mut self, input: &str) -> Result<usize, ExpressionError> {
        let mut pending: Vec<Operation> = Vec::new();
        let mut state = State::Start;
        // Never read before an operator token assigns it.
        let mut current_operator = Operator::Add;

        for raw in input.split(' ') {
            if raw.is_empty() {
                continue;
            }

            match (state, Token::classify(raw)?) {
                (State::Start, Token::Operator(Operator::Neg))
                | (State::Operand, Token::Operator(Operator::Neg)) => {
                    pending.push(Operation {
                        operator: Operator::Neg,
                        operand: 0,
                    });
                    state = State::Start;
                }
                (State::Start, Token::Operator(operator))
                | (State::Operand, Token::Operator(operator)) => {
                    current_operator = operator;
                    state = State::Operator;
                }
                (State::Start, Token::Value(_)) => return Err(ExpressionError::ExpectedOperator),
                (State::Operator, Token::Operator(_)) => {
                    return Err(ExpressionError::ExpectedOperand)
                }
                (State::Operator, Token::Value(value))
                | (State::Operand, Token::Value(value)) => {
                    if value < i64::from(i16::MIN) || value > i64::from(i16::MAX) {
                        return Err(ExpressionError::OperandOutOfBounds);
                    }
                    if current_operator == Operator::Div && value == 0 {
                        return Err(ExpressionError::DivideByZero);
                    }
                    pending.push(Operation {
                        operator: current_operator,
                        operand: value as i16,
                    });
                    state = State::Operand;
                }
            }

            if pending.len() >= MAX_OPERATIONS {
                break;
            }
        }

        let count = pending.len();
        self.operations.extend(pending);

        #[cfg(feature = "logging")]
        debug!(
            "added {} operations from {:?}, {} total",
            count,
            input,
            self.operations.len()
        );

        Ok(count)
    }

    /// Fold the base value through every stored operation in order. No
    /// operator precedence: strictly `value = value OP operand`, with
    /// negation replacing the running value by its negative.
    pub fn evaluate(&self) -> i32 {
        let mut value = self.base_value.map_or(0, |function| function());

        for operation in &self.operations {
            let operand = i32::from(operation.operand);
            value = match operation.operator {
                Operator::Add => value.wrapping_add(operand),
                Operator::Sub => value.wrapping_sub(operand),
                Operator::Mul => value.wrapping_mul(operand),
                // operand is non-zero, enforced at parse time
                Operator::Div => value.wrapping_div(operand),
                Operator::Neg => value.wrapping_neg(),
            };
        }

        value
    }
}
