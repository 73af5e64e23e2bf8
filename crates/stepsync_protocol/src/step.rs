//! The opaque step payload.

use serde::{Deserialize, Serialize};

/// An atomic document mutation.
///
/// The sync core never looks inside a step; its shape belongs to whatever
/// [`StepTransform`](crate::StepTransform) engine produced it. Steps are
/// carried as arbitrary JSON and compared structurally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Step(serde_json::Value);

impl Step {
    /// Wraps a JSON payload.
    pub fn new(payload: serde_json::Value) -> Self {
        Self(payload)
    }

    /// Builds a step from any serializable payload.
    pub fn from_payload<T: Serialize>(payload: &T) -> serde_json::Result<Self> {
        serde_json::to_value(payload).map(Self)
    }

    /// Interprets the payload as `T`.
    pub fn to_payload<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.0)
    }

    /// Returns the raw payload.
    pub fn payload(&self) -> &serde_json::Value {
        &self.0
    }

    /// Consumes the step, returning the raw payload.
    pub fn into_payload(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for Step {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Insert {
        pos: usize,
        text: String,
    }

    #[test]
    fn typed_payload() {
        let step = Step::from_payload(&Insert {
            pos: 3,
            text: "hi".into(),
        })
        .unwrap();
        assert_eq!(step.payload(), &json!({"pos": 3, "text": "hi"}));

        let back: Insert = step.to_payload().unwrap();
        assert_eq!(back.pos, 3);
    }

    #[test]
    fn serializes_transparently() {
        let step = Step::new(json!({"stepType": "replace", "from": 1, "to": 1}));
        let text = serde_json::to_string(&step).unwrap();
        assert_eq!(text, r#"{"from":1,"stepType":"replace","to":1}"#);
    }
}
