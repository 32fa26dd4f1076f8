use std::io::{self, Write};

use claude_stream::{ContentBlock, Message};

/// Renders messages to stdout, either as readable text or as JSON lines.
pub struct Printer<W: Write = io::Stdout> {
    out: W,
    json: bool,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self::with_writer(io::stdout(), json)
    }
}

impl<W: Write> Printer<W> {
    pub fn with_writer(out: W, json: bool) -> Self {
        Self { out, json }
    }

    pub fn message(&mut self, msg: &Message) -> anyhow::Result<()> {
        if self.json {
            let line = serde_json::to_string(msg)?;
            writeln!(self.out, "{line}")?;
            return Ok(());
        }

        match msg {
            Message::Assistant(a) => {
                for block in &a.content {
                    self.block(block)?;
                }
            }
            Message::System(s) => {
                tracing::debug!(subtype = %s.subtype, session_id = ?s.session_id(), "system message");
            }
            Message::User(_) => {}
            Message::Result(r) => {
                writeln!(self.out, "\n---")?;
                writeln!(
                    self.out,
                    "Turns: {}  Cost: ${:.4}  Duration: {:.1}s",
                    r.num_turns,
                    r.total_cost_usd.max(r.cost_usd),
                    r.duration_ms as f64 / 1000.0
                )?;
                if !r.is_success() {
                    writeln!(self.out, "Result: {}", r.subtype)?;
                }
            }
        }
        self.out.flush()?;
        Ok(())
    }

    fn block(&mut self, block: &ContentBlock) -> io::Result<()> {
        match block {
            ContentBlock::Text { text } => writeln!(self.out, "{text}"),
            ContentBlock::ToolUse { name, input, .. } => {
                let args = serde_json::Value::Object(input.clone());
                writeln!(self.out, "→ {name} {args}")
            }
            ContentBlock::ToolResult { is_error: true, .. } => writeln!(self.out, "← tool error"),
            ContentBlock::ToolResult { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claude_stream::{AssistantMessage, ResultMessage, UserMessage};

    fn render(json: bool, msgs: &[Message]) -> String {
        let mut p = Printer::with_writer(Vec::new(), json);
        for m in msgs {
            p.message(m).unwrap();
        }
        String::from_utf8(p.out).unwrap()
    }

    #[test]
    fn text_mode_prints_blocks_and_summary() {
        let mut input = serde_json::Map::new();
        input.insert("file_path".into(), "/tmp/a".into());
        let out = render(
            false,
            &[
                Message::User(UserMessage {
                    content: "hi".into(),
                    blocks: vec![],
                }),
                Message::Assistant(AssistantMessage {
                    content: vec![
                        ContentBlock::Text {
                            text: "Reading.".into(),
                        },
                        ContentBlock::ToolUse {
                            id: "t1".into(),
                            name: "Read".into(),
                            input,
                        },
                    ],
                }),
                Message::Result(ResultMessage {
                    subtype: "success".into(),
                    num_turns: 2,
                    total_cost_usd: 0.0125,
                    duration_ms: 1500,
                    ..Default::default()
                }),
            ],
        );
        assert!(out.starts_with("Reading.\n→ Read {\"file_path\":\"/tmp/a\"}\n"));
        assert!(out.contains("Turns: 2  Cost: $0.0125  Duration: 1.5s"));
        assert!(!out.contains("Result:"));
    }

    #[test]
    fn json_mode_is_one_object_per_line() {
        let out = render(
            true,
            &[
                Message::User(UserMessage {
                    content: "hi".into(),
                    blocks: vec![],
                }),
                Message::Result(ResultMessage::default()),
            ],
        );
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["type"], "user");
        assert_eq!(first["content"], "hi");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["type"], "result");
    }
}
