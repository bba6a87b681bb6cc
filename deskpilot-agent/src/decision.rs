//! OpenAI-compatible chat-completions decision client.
//!
//! Each call sends the system prompt and one user message holding the
//! screenshot as a `data:image/png;base64,…` URL, together with the five
//! tool definitions and `tool_choice: "required"`. The first tool call of
//! the first choice is the decision.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use deskpilot_core::{DecisionError, DecisionService, ProposedAction, ProposedArgs};
use serde_json::{Value, json};

use crate::config::DecisionConfig;

/// Longest error body carried in [`DecisionError::Status`].
pub const MAX_ERROR_BODY: usize = 4096;

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You operate a Windows desktop through a single screenshot per turn.

Each turn you see the whole primary display, scaled down. Pointer \
positions use a normalized grid: x and y run from 0 (left, top) to 1000 \
(right, bottom) regardless of the real resolution.

The numbered white text in the top-left corner is your own note from the \
previous turn. It is the only memory you have. It is not part of the \
desktop and clicking it does nothing.

Call exactly one tool per turn:
- observe: wait and look again
- click: left-click at (x, y)
- type: type text into the focused control
- scroll: scroll the wheel by dy units, 120 units per notch \
  (positive scrolls up, dy = 360 is three notches)
- done: the task is complete

Every call needs a `reason`. Write it as the note you want to read next \
turn: what you see, what you just did and what you plan to do next.";

// ── ChatCompletionsClient ────────────────────────────────────────

/// Blocking client for `/v1/chat/completions`.
///
/// Must be created and used off the async runtime.
pub struct ChatCompletionsClient {
    http: reqwest::blocking::Client,
    config: DecisionConfig,
    tools: Value,
}

impl ChatCompletionsClient {
    pub fn new(config: DecisionConfig) -> Result<Self, DecisionError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| DecisionError::Unreachable(e.to_string()))?;
        Ok(Self {
            http,
            config,
            tools: tool_definitions(),
        })
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Request body for one decision on `png`.
    pub fn payload(&self, png: &[u8]) -> Value {
        let image_url = format!("data:image/png;base64,{}", STANDARD.encode(png));
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": self.config.system_prompt },
                {
                    "role": "user",
                    "content": [
                        { "type": "image_url", "image_url": { "url": image_url } }
                    ]
                }
            ],
            "tools": self.tools,
            "tool_choice": "required",
            "temperature": self.config.temperature,
            "top_p": self.config.top_p,
            "max_tokens": self.config.max_tokens,
        })
    }
}

impl DecisionService for ChatCompletionsClient {
    fn decide(&mut self, png: &[u8], timeout: Duration) -> Result<ProposedAction, DecisionError> {
        let body = self.payload(png);
        tracing::debug!(
            endpoint = %self.config.endpoint,
            model = %self.config.model,
            png_bytes = png.len(),
            "requesting decision"
        );

        let response = self
            .http
            .post(&self.config.endpoint)
            .timeout(timeout)
            .json(&body)
            .send()
            .map_err(|e| transport_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(DecisionError::Status {
                status: status.as_u16(),
                body: truncate_body(&text, MAX_ERROR_BODY).to_owned(),
            });
        }

        let data: Value = response
            .json()
            .map_err(|e| transport_error(e, timeout))?;
        parse_response(&data)
    }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> DecisionError {
    if e.is_timeout() {
        DecisionError::Timeout(timeout)
    } else if e.is_decode() {
        DecisionError::Malformed(format!("response is not JSON: {e}"))
    } else {
        DecisionError::Unreachable(e.to_string())
    }
}

// ── Tool schema ──────────────────────────────────────────────────

fn tool(name: &str, description: &str, mut properties: Value, required: &[&str]) -> Value {
    if let Some(map) = properties.as_object_mut() {
        map.insert(
            "reason".into(),
            json!({
                "type": "string",
                "description": "Note shown on screen next turn: what you see, did and plan."
            }),
        );
    }
    let mut required: Vec<&str> = required.to_vec();
    required.push("reason");
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        }
    })
}

/// The five tools the model must choose from.
pub fn tool_definitions() -> Value {
    let coord = |axis: &str| {
        json!({
            "type": "number",
            "minimum": 0,
            "maximum": 1000,
            "description": format!("{axis} on the 0..1000 grid"),
        })
    };
    Value::Array(vec![
        tool("observe", "Do nothing and look again.", json!({}), &[]),
        tool(
            "click",
            "Left-click at a point.",
            json!({ "x": coord("horizontal position"), "y": coord("vertical position") }),
            &["x", "y"],
        ),
        tool(
            "type",
            "Type text into the focused control.",
            json!({ "text": { "type": "string" } }),
            &["text"],
        ),
        tool(
            "scroll",
            "Scroll the mouse wheel.",
            json!({
                "dy": {
                    "type": "number",
                    "description": "Wheel units, 120 per notch. Positive scrolls up, negative down."
                }
            }),
            &["dy"],
        ),
        tool("done", "The task is finished.", json!({}), &[]),
    ])
}

// ── Response parsing ─────────────────────────────────────────────

/// Extract the decision from a chat-completions response body.
pub fn parse_response(data: &Value) -> Result<ProposedAction, DecisionError> {
    let message = data
        .pointer("/choices/0/message")
        .ok_or_else(|| DecisionError::Malformed("response has no choices[0].message".into()))?;
    parse_tool_call(message)
}

/// Read the first tool call of an assistant message.
///
/// `function.arguments` is normally a JSON-encoded string but some
/// servers send the object itself; both are accepted.
pub fn parse_tool_call(message: &Value) -> Result<ProposedAction, DecisionError> {
    let call = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .and_then(|calls| calls.first())
        .ok_or_else(|| DecisionError::Malformed("no tool call found".into()))?;

    let function = call.get("function").unwrap_or(&Value::Null);
    let name = function
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let arguments = match function.get("arguments") {
        None | Some(Value::Null) => ProposedArgs::default(),
        Some(Value::String(raw)) if raw.trim().is_empty() => ProposedArgs::default(),
        Some(Value::String(raw)) => serde_json::from_str(raw)
            .map_err(|e| DecisionError::Malformed(format!("arguments of `{name}`: {e}")))?,
        Some(object) => serde_json::from_value(object.clone())
            .map_err(|e| DecisionError::Malformed(format!("arguments of `{name}`: {e}")))?,
    };

    Ok(ProposedAction::new(name, arguments))
}

/// Longest prefix of `body` that fits in `max` bytes on a char boundary.
pub fn truncate_body(body: &str, max: usize) -> &str {
    if body.len() <= max {
        return body;
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use deskpilot_core::input::{WHEEL_DELTA, quantize_wheel};
    use deskpilot_core::{Action, validate};
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    fn client(endpoint: String) -> ChatCompletionsClient {
        ChatCompletionsClient::new(DecisionConfig {
            endpoint,
            ..DecisionConfig::default()
        })
        .unwrap()
    }

    /// Serve exactly one HTTP response on an ephemeral port.
    ///
    /// The returned handle yields the request body the client sent.
    fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/v1/chat/completions", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((key, value)) = line.split_once(':') {
                    if key.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut request = vec![0u8; content_length];
            reader.read_exact(&mut request).unwrap();

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            String::from_utf8(request).unwrap()
        });
        (endpoint, handle)
    }

    fn reply(name: &str, arguments: Value) -> Value {
        json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "call_0",
                        "type": "function",
                        "function": { "name": name, "arguments": arguments }
                    }]
                }
            }]
        })
    }

    #[test]
    fn payload_carries_image_and_tools() {
        let c = client("http://localhost:1/".into());
        let p = c.payload(&[0x89, b'P', b'N', b'G']);

        assert_eq!(p["model"], "qwen3-vl-2b-instruct");
        assert_eq!(p["tool_choice"], "required");
        assert_eq!(p["max_tokens"], 2000);
        assert_eq!(p["messages"][0]["role"], "system");
        assert_eq!(
            p["messages"][1]["content"][0]["image_url"]["url"],
            "data:image/png;base64,iVBORw=="
        );

        let names: Vec<&str> = p["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["function"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["observe", "click", "type", "scroll", "done"]);
    }

    #[test]
    fn every_tool_requires_reason() {
        for t in tool_definitions().as_array().unwrap() {
            let required = t["function"]["parameters"]["required"].as_array().unwrap();
            assert!(required.contains(&json!("reason")), "{t}");
        }
        let tools = tool_definitions();
        let click = &tools[1]["function"]["parameters"]["required"];
        assert_eq!(click, &json!(["x", "y", "reason"]));
    }

    #[test]
    fn parses_string_arguments() {
        let data = reply("click", json!(r#"{"x": 500, "y": "300", "reason": "open menu"}"#));
        let action = parse_response(&data).unwrap();
        assert_eq!(action.name, "click");
        assert_eq!(action.arguments.x, Some(500.0));
        assert_eq!(action.arguments.y, Some(300.0));
        assert_eq!(action.arguments.reason.as_deref(), Some("open menu"));
    }

    #[test]
    fn parses_object_arguments() {
        let data = reply("scroll", json!({ "dy": -240, "story": "down" }));
        let action = parse_response(&data).unwrap();
        assert_eq!(action.arguments.dy, Some(-240.0));
        assert_eq!(action.arguments.reason.as_deref(), Some("down"));
    }

    #[test]
    fn missing_arguments_are_empty() {
        let data = json!({
            "choices": [{ "message": { "tool_calls": [{ "function": { "name": "done" } }] } }]
        });
        let action = parse_response(&data).unwrap();
        assert_eq!(action, ProposedAction::new("done", ProposedArgs::default()));
    }

    #[test]
    fn scroll_dy_is_in_wheel_units() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("120 units per notch"));
        let tools = tool_definitions();
        let dy = tools[3]["function"]["parameters"]["properties"]["dy"]["description"]
            .as_str()
            .unwrap();
        assert!(dy.contains("120 per notch"), "{dy}");

        let data = reply("scroll", json!(r#"{"dy": 360, "reason": "three notches up"}"#));
        let action = validate(&parse_response(&data).unwrap()).unwrap();
        let Action::Scroll { dy, .. } = action else {
            panic!("expected scroll, got {action:?}");
        };
        assert_eq!(quantize_wheel(dy), Some(3 * WHEEL_DELTA));
    }

    #[test]
    fn rejects_response_without_tool_call() {
        let data = json!({
            "choices": [{ "message": { "role": "assistant", "content": "I will click." } }]
        });
        assert!(matches!(parse_response(&data), Err(DecisionError::Malformed(_))));
        assert!(matches!(parse_response(&json!({})), Err(DecisionError::Malformed(_))));
    }

    #[test]
    fn rejects_unparseable_arguments() {
        let data = reply("type", json!("{not json"));
        assert!(matches!(parse_response(&data), Err(DecisionError::Malformed(_))));
    }

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate_body("short", 4096), "short");
        let body = "é".repeat(3000);
        let cut = truncate_body(&body, MAX_ERROR_BODY);
        assert_eq!(cut.len(), 4096);
        assert_eq!(truncate_body("aé", 2), "a");
    }

    #[test]
    fn decides_over_http() {
        let (endpoint, server) = serve_once(
            "200 OK",
            reply("type", json!(r#"{"text":"hello","reason":"fill the field"}"#)).to_string(),
        );
        let mut c = client(endpoint);
        let action = c.decide(b"png", Duration::from_secs(5)).unwrap();
        assert_eq!(action.name, "type");
        assert_eq!(action.arguments.text.as_deref(), Some("hello"));

        let sent: Value = serde_json::from_str(&server.join().unwrap()).unwrap();
        assert_eq!(sent["tool_choice"], "required");
        assert_eq!(
            sent["messages"][1]["content"][0]["image_url"]["url"],
            "data:image/png;base64,cG5n"
        );
    }

    #[test]
    fn http_error_keeps_truncated_body() {
        let (endpoint, server) = serve_once("503 Service Unavailable", "x".repeat(5000));
        let mut c = client(endpoint);
        match c.decide(b"png", Duration::from_secs(5)) {
            Err(DecisionError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body.len(), MAX_ERROR_BODY);
            }
            other => panic!("unexpected {other:?}"),
        }
        server.join().unwrap();
    }

    #[test]
    fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/v1/chat/completions", listener.local_addr().unwrap());
        // Accept, then hold the connection open without answering.
        std::thread::spawn(move || {
            let (_stream, _) = listener.accept().unwrap();
            std::thread::sleep(Duration::from_secs(5));
        });

        let mut c = client(endpoint);
        let timeout = Duration::from_millis(300);
        let started = std::time::Instant::now();
        let err = c.decide(b"png", timeout).unwrap_err();
        assert!(matches!(err, DecisionError::Timeout(t) if t == timeout), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn refused_connection_is_unreachable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut c = client(format!("http://127.0.0.1:{port}/v1/chat/completions"));
        let err = c.decide(b"png", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, DecisionError::Unreachable(_)), "{err:?}");
    }
}
