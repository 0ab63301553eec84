//! System instruction rendering
//!
//! The template fixes the step vocabulary the model must answer in and
//! carries two placeholders: `{context}` for caller-supplied background and
//! `{tools}` for one descriptor line per registered tool.

use crate::tools::ToolDescriptor;

/// Default system instruction template
pub const DEFAULT_TEMPLATE: &str = r#"You are an assistant that works in steps: USER, PLAN, ACTION, OBSERVATION and OUTPUT.
Wait for the user prompt, then PLAN using the available tools.
After planning, take an ACTION with an appropriate tool and wait for its OBSERVATION.
Once you have the observations you need, return the OUTPUT based on the user prompt and the observations.

{context}

### Rules:
1. Always respond in JSON.
2. Always give `input` as a JSON object mapping argument names to values, even for a single argument.
3. Every step is one JSON object whose "type" is one of: "user", "plan", "action", "observation", "output".
4. Only use the available tools.
5. Never write an "observation" yourself; it is supplied after each action.

### Available tools:
{tools}

### Example:
{ "type": "user", "user": "What is the sum of the temperatures in Patiala and Mohali?" }
{ "type": "plan", "plan": "I will call get_temperature for Patiala" }
{ "type": "action", "function": "get_temperature", "input": {"place_name": "Patiala"} }
{ "type": "observation", "observation": 10 }
{ "type": "plan", "plan": "I will call get_temperature for Mohali" }
{ "type": "action", "function": "get_temperature", "input": {"place_name": "Mohali"} }
{ "type": "observation", "observation": 14 }
{ "type": "plan", "plan": "I will add the two temperatures" }
{ "type": "action", "function": "calculator", "input": {"expression": "10+14"} }
{ "type": "observation", "observation": 24 }
{ "type": "output", "output": "The sum of the temperatures in Patiala and Mohali is 24°C" }
"#;

const NO_TOOLS: &str = "(none)";

/// System instruction builder
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    template: String,
    context: String,
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemPrompt {
    pub fn new() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            context: String::new(),
        }
    }

    /// Use a custom template. It should contain `{tools}` and may contain `{context}`.
    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            context: String::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Render the instruction for the given tools
    pub fn render(&self, tools: &[ToolDescriptor]) -> String {
        let tool_lines = if tools.is_empty() {
            NO_TOOLS.to_string()
        } else {
            tools
                .iter()
                .map(|t| format!("- {}", t))
                .collect::<Vec<_>>()
                .join("\n")
        };

        // Plain substitution: the template body is full of literal braces
        fill_placeholders(
            &self.template,
            &[("{context}", self.context.trim()), ("{tools}", &tool_lines)],
        )
    }
}

/// Replace placeholders in one left-to-right pass; inserted text is never
/// scanned again
fn fill_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    loop {
        let next = values
            .iter()
            .filter_map(|&(key, value)| rest.find(key).map(|at| (at, key, value)))
            .min_by_key(|&(at, _, _)| at);

        match next {
            Some((at, key, value)) => {
                out.push_str(&rest[..at]);
                out.push_str(value);
                rest = &rest[at + key.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}
