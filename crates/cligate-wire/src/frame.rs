use serde_json::Value;

/// One server-sent-event unit, already shaped for a wire format.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// `data: {json}\n\n`
    Data(Value),
    /// `event: <name>\ndata: {json}\n\n`
    Event { event: String, data: Value },
    /// Written verbatim (native passthrough).
    Raw(String),
    /// `data: [DONE]\n\n`
    Done,
}

impl Frame {
    pub fn event(event: impl Into<String>, data: Value) -> Self {
        Self::Event {
            event: event.into(),
            data,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Data(data) => format!("data: {data}\n\n"),
            Self::Event { event, data } => format!("event: {event}\ndata: {data}\n\n"),
            Self::Raw(text) => text.clone(),
            Self::Done => "data: [DONE]\n\n".to_string(),
        }
    }

    /// JSON payload, if the frame has one.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Data(data) | Self::Event { data, .. } => Some(data),
            Self::Raw(_) | Self::Done => None,
        }
    }

    pub fn event_name(&self) -> Option<&str> {
        match self {
            Self::Event { event, .. } => Some(event),
            _ => None,
        }
    }
}

/// Decode SSE text into frames. Blocks whose data is not JSON are dropped.
pub fn parse_sse(raw: &str) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut current_event: Option<String> = None;
    let mut current_data: Option<String> = None;

    let mut flush = |event: &mut Option<String>, data: &mut Option<String>| {
        let Some(payload) = data.take() else {
            event.take();
            return;
        };
        if payload == "[DONE]" {
            frames.push(Frame::Done);
        } else if let Ok(value) = serde_json::from_str::<Value>(&payload) {
            frames.push(match event.take() {
                Some(name) => Frame::Event { event: name, data: value },
                None => Frame::Data(value),
            });
        }
        event.take();
    };

    for line in raw.lines() {
        if let Some(event) = line.strip_prefix("event: ") {
            current_event = Some(event.to_string());
        } else if let Some(data) = line.strip_prefix("data: ") {
            current_data = Some(data.to_string());
        } else if line.is_empty() {
            flush(&mut current_event, &mut current_data);
        }
    }
    flush(&mut current_event, &mut current_data);

    frames
}
