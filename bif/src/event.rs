use serde::{Deserialize, Serialize};

/// File name of the event list of a session
pub const EVENT_FILE_NAME: &str = ".event";

/// Something that happened during a session, like a stimulus or an annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// seconds since the start of the recording
    pub time: f64,
    pub event_name: String,
    #[serde(default)]
    pub description: String,
}

impl SessionEvent {
    pub fn new(time: f64, event_name: impl Into<String>) -> Self {
        Self {
            time,
            event_name: event_name.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_shape() -> anyhow::Result<()> {
        let events = vec![
            SessionEvent::new(1.5, "Eyes closed").with_description("rest"),
            SessionEvent::new(3.0, "Eyes open"),
        ];
        let value = serde_json::to_value(&events)?;
        assert_eq!(
            value,
            json!([
                {"time": 1.5, "event_name": "Eyes closed", "description": "rest"},
                {"time": 3.0, "event_name": "Eyes open", "description": ""}
            ])
        );
        // older files do not always have a description
        let parsed: Vec<SessionEvent> =
            serde_json::from_str(r#"[{"time": 3.0, "event_name": "Eyes open"}]"#)?;
        assert_eq!(parsed, events[1..].to_vec());
        Ok(())
    }
}
