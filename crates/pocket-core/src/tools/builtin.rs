//! Built-in local tools

use std::time::Duration;

use rand::Rng;
use serde_json::{Value, json};

use crate::error::ToolError;
use crate::tools::{Tool, ToolInput};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// All built-in tools
pub fn standard_tools() -> Vec<Tool> {
    vec![calculator(), http_get(), get_temperature()]
}

/// `calculator(expression)`: evaluate an arithmetic expression.
///
/// Supports `+ - * / %`, `^` for powers, parentheses and unary minus.
/// Whole results come back as integers.
pub fn calculator() -> Tool {
    Tool::blocking("calculator", |input: ToolInput| {
        let expression = input
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("expression is required".into()))?;

        let value = Calculator::new(expression)
            .evaluate()
            .map_err(|e| ToolError::ExecutionFailed(format!("Cannot evaluate '{}': {}", expression, e)))?;

        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            Ok(json!(value as i64))
        } else {
            Ok(json!(value))
        }
    })
    .with_description("Evaluate a math expression and return the result.")
    .with_schema(crate::tool_params!(expression: "string" => "Arithmetic expression, e.g. 10+14"))
}

/// Deepest nesting of parentheses, signs and exponents accepted
const MAX_NESTING: usize = 100;

/// Recursive-descent evaluator over a byte cursor
struct Calculator<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Calculator<'a> {
    fn new(expression: &'a str) -> Self {
        Self {
            src: expression.as_bytes(),
            pos: 0,
            depth: 0,
        }
    }

    fn evaluate(mut self) -> Result<f64, String> {
        let value = self.expr()?;
        self.skip_ws();
        if self.pos < self.src.len() {
            return Err(format!("unexpected '{}'", self.src[self.pos] as char));
        }
        if !value.is_finite() {
            return Err("result is not a finite number".to_string());
        }
        Ok(value)
    }

    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.src.get(self.pos).copied()
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == b'+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    // term := unary (('*' | '/' | '%') unary)*
    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        while let Some(op @ (b'*' | b'/' | b'%')) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = match op {
                b'*' => value * rhs,
                _ if rhs == 0.0 => return Err("division by zero".to_string()),
                b'/' => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    // unary := ('-' | '+') unary | power
    //
    // Every recursive path passes through here, so nesting is bounded here.
    fn unary(&mut self) -> Result<f64, String> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(format!("expression nested deeper than {}", MAX_NESTING));
        }

        let value = match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                self.unary().map(|v| -v)
            }
            Some(b'+') => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        };

        self.depth -= 1;
        value
    }

    // power := atom ('^' unary)?
    fn power(&mut self) -> Result<f64, String> {
        let base = self.atom()?;
        if self.peek() == Some(b'^') {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek() != Some(b')') {
                    return Err("missing ')'".to_string());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => {
                let start = self.pos;
                while self.pos < self.src.len()
                    && (self.src[self.pos].is_ascii_digit() || self.src[self.pos] == b'.')
                {
                    self.pos += 1;
                }
                let literal = std::str::from_utf8(&self.src[start..self.pos])
                    .map_err(|e| e.to_string())?;
                literal
                    .parse::<f64>()
                    .map_err(|_| format!("bad number '{}'", literal))
            }
            Some(c) => Err(format!("unexpected '{}'", c as char)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

/// `http_get(url, params?)`: send a GET request.
///
/// Returns `{"status_code": <int>, "result": <body>}` where the body is
/// parsed JSON when the server says it is JSON, and text otherwise.
pub fn http_get() -> Tool {
    Tool::suspending("http_get", |input: ToolInput| async move { fetch(input).await })
        .with_description(
            "Send an HTTP GET request. Returns an object with the HTTP status_code and \
             the result, parsed as JSON when the response is JSON, else the raw text.",
        )
        .with_schema(json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "Absolute http(s) URL"},
                "params": {"type": "object", "description": "Optional query parameters"}
            },
            "required": ["url"]
        }))
}

async fn fetch(input: ToolInput) -> Result<Value, ToolError> {
    let url = input
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidParams("url is required".into()))?;

    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ToolError::InvalidParams(
            "Only HTTP and HTTPS URLs are supported".into(),
        ));
    }

    let query = query_pairs(input.get("params"));

    let client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| ToolError::ExecutionFailed(format!("Failed to create client: {}", e)))?;

    let response = client
        .get(url)
        .query(&query)
        .send()
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("Request failed: {}", e)))?;

    let status = response.status().as_u16();
    let is_json = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));

    let body = response
        .text()
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("Failed to read response: {}", e)))?;

    let result = if is_json {
        serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body))
    } else {
        Value::String(body)
    };

    Ok(json!({ "status_code": status, "result": result }))
}

/// Flatten a JSON object of parameters into query pairs
fn query_pairs(params: Option<&Value>) -> Vec<(String, String)> {
    let Some(Value::Object(map)) = params else {
        return Vec::new();
    };

    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

/// `get_temperature(place_name)`: demo tool returning a made-up reading
pub fn get_temperature() -> Tool {
    Tool::blocking("get_temperature", |_input| {
        let degrees: i64 = rand::thread_rng().gen_range(23..40);
        Ok(json!(degrees))
    })
    .with_description("Returns atmosphere temperature in place.")
    .with_schema(crate::tool_params!(place_name: "string" => "Name of the place"))
}
