#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: Vec<u8>,
    // A CR ended the previous chunk; an LF opening the next one belongs to it.
    after_cr: bool,
}

impl SseStreamParser {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        for &byte in bytes {
            match byte {
                b'\r' => {
                    self.buffer.push(b'\n');
                    self.after_cr = true;
                }
                b'\n' if self.after_cr => self.after_cr = false,
                _ => {
                    self.buffer.push(byte);
                    self.after_cr = false;
                }
            }
        }
        let mut payloads = Vec::new();

        while let Some(split) = self.buffer.windows(2).position(|pair| pair == b"\n\n") {
            let frame: Vec<u8> = self.buffer.drain(..split + 2).take(split).collect();

            if let Some(payload) = extract_data_payload(&String::from_utf8_lossy(&frame)) {
                payloads.push(payload);
            }
        }

        payloads
    }

    pub fn parse_frames(input: &str) -> Vec<String> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    let payload = data_lines.join("\n");
    if payload.trim().is_empty() {
        None
    } else {
        Some(payload)
    }
}
