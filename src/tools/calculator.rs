//! Calculator tools
//!
//! Thirteen small arithmetic tools. Integral results are reported without a
//! fractional part so the model sees `6` rather than `6.0`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{ParleyError, Result};
use crate::tools::{ToolExecutor, ToolResult};

/// Largest `n` whose factorial is a finite `f64`
const MAX_FACTORIAL: f64 = 170.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Exponentiate,
    Factorial,
    IsPrime,
    SquareRoot,
    Sin,
    Cos,
    Tan,
    Log,
    Exp,
}

impl Operation {
    pub const ALL: [Operation; 13] = [
        Operation::Add,
        Operation::Subtract,
        Operation::Multiply,
        Operation::Divide,
        Operation::Exponentiate,
        Operation::Factorial,
        Operation::IsPrime,
        Operation::SquareRoot,
        Operation::Sin,
        Operation::Cos,
        Operation::Tan,
        Operation::Log,
        Operation::Exp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Subtract => "subtract",
            Operation::Multiply => "multiply",
            Operation::Divide => "divide",
            Operation::Exponentiate => "exponentiate",
            Operation::Factorial => "factorial",
            Operation::IsPrime => "isPrime",
            Operation::SquareRoot => "squareRoot",
            Operation::Sin => "sin",
            Operation::Cos => "cos",
            Operation::Tan => "tan",
            Operation::Log => "log",
            Operation::Exp => "exp",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Operation::Add => "Add two numbers",
            Operation::Subtract => "Subtract two numbers",
            Operation::Multiply => "Multiply two numbers",
            Operation::Divide => "Divide two numbers",
            Operation::Exponentiate => "Exponentiate a number",
            Operation::Factorial => "Calculate the factorial of a number",
            Operation::IsPrime => "Check if a number is prime",
            Operation::SquareRoot => "Calculate the square root of a number",
            Operation::Sin => "Calculate the sine of a number",
            Operation::Cos => "Calculate the cosine of a number",
            Operation::Tan => "Calculate the tangent of a number",
            Operation::Log => "Calculate the natural logarithm of a number",
            Operation::Exp => "Calculate the exponential of a number",
        }
    }

    fn parameter_names(self) -> &'static [&'static str] {
        match self {
            Operation::Add | Operation::Subtract | Operation::Multiply | Operation::Divide => {
                &["a", "b"]
            }
            Operation::Exponentiate => &["base", "exponent"],
            _ => &["n"],
        }
    }
}

/// One calculator operation exposed as a tool
#[derive(Debug, Clone, Copy)]
pub struct CalculatorTool {
    op: Operation,
}

impl CalculatorTool {
    pub fn new(op: Operation) -> Self {
        Self { op }
    }

    /// Evaluate against already parsed operands
    pub fn evaluate(&self, operands: &[f64]) -> Result<Value> {
        let x = operands.first().copied().unwrap_or_default();
        let y = operands.get(1).copied().unwrap_or_default();

        let value = match self.op {
            Operation::Add => x + y,
            Operation::Subtract => x - y,
            Operation::Multiply => x * y,
            Operation::Divide => x / y,
            Operation::Exponentiate => x.powf(y),
            Operation::Factorial => factorial(x)?,
            Operation::IsPrime => return Ok(Value::Bool(is_prime(x))),
            Operation::SquareRoot => x.sqrt(),
            Operation::Sin => x.sin(),
            Operation::Cos => x.cos(),
            Operation::Tan => x.tan(),
            Operation::Log => x.ln(),
            Operation::Exp => x.exp(),
        };

        number(value)
    }
}

/// All calculator tools
pub fn calculator_tools() -> Vec<Arc<dyn ToolExecutor>> {
    Operation::ALL
        .iter()
        .map(|op| Arc::new(CalculatorTool::new(*op)) as Arc<dyn ToolExecutor>)
        .collect()
}

#[async_trait]
impl ToolExecutor for CalculatorTool {
    fn tool_definition(&self) -> Value {
        let names = self.op.parameter_names();
        let properties: serde_json::Map<String, Value> = names
            .iter()
            .map(|n| (n.to_string(), json!({"type": "number"})))
            .collect();
        json!({
            "name": self.op.name(),
            "description": self.op.description(),
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": names,
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let operands = self
            .op
            .parameter_names()
            .iter()
            .map(|name| {
                args.get(*name).and_then(Value::as_f64).ok_or_else(|| {
                    ParleyError::ToolExecution(format!(
                        "{} requires a numeric argument '{}'",
                        self.op.name(),
                        name
                    ))
                })
            })
            .collect::<std::result::Result<Vec<f64>, _>>()?;

        Ok(ToolResult::json(self.evaluate(&operands)?))
    }
}

fn factorial(n: f64) -> Result<f64> {
    if n > MAX_FACTORIAL {
        return Err(ParleyError::ToolExecution(format!(
            "factorial is only supported up to {}",
            MAX_FACTORIAL
        ))
        .into());
    }
    let mut result = 1.0;
    let mut i = 1.0;
    while i <= n {
        result *= i;
        i += 1.0;
    }
    Ok(result)
}

fn is_prime(n: f64) -> bool {
    if n <= 1.0 {
        return false;
    }
    let limit = n.sqrt();
    let mut i = 2.0;
    while i <= limit {
        if n % i == 0.0 {
            return false;
        }
        i += 1.0;
    }
    true
}

fn number(value: f64) -> Result<Value> {
    if !value.is_finite() {
        return Err(ParleyError::ToolExecution(format!(
            "Result is not a finite number ({})",
            value
        ))
        .into());
    }
    // 2^53: beyond this not every integer is representable.
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return Ok(json!(value as i64));
    }
    Ok(json!(value))
}
