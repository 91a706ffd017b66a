use crate::domain::errors::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Performative {
    Request,
    Reply,
    Failure,
}

impl fmt::Display for Performative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Performative::Request => "request",
            Performative::Reply => "reply",
            Performative::Failure => "failure",
        };
        f.write_str(name)
    }
}

/// Topic of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ontology {
    CostComputation,
    Decision,
}

/// Typed message exchanged over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: String,
    pub receiver: String,
    pub performative: Performative,
    pub ontology: Ontology,
    pub correlation_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub body: String,
}

impl Envelope {
    pub fn request(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        ontology: Ontology,
        correlation_id: Uuid,
        body: String,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            performative: Performative::Request,
            ontology,
            correlation_id,
            answer: None,
            body,
        }
    }

    /// Reply to the sender, keeping topic and correlation id.
    pub fn reply(&self, body: String) -> Self {
        self.respond(Performative::Reply, body)
    }

    pub fn failure(&self, reason: impl Into<String>) -> Self {
        self.respond(Performative::Failure, reason.into())
    }

    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }

    fn respond(&self, performative: Performative, body: String) -> Self {
        Self {
            sender: self.receiver.clone(),
            receiver: self.sender.clone(),
            performative,
            ontology: self.ontology,
            correlation_id: self.correlation_id,
            answer: None,
            body,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Decode {
            what: "envelope",
            reason: e.to_string(),
        })
    }

    /// Parses and validates an envelope received from the wire.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(raw).map_err(|e| ProtocolError::Decode {
            what: "envelope",
            reason: e.to_string(),
        })?;

        if envelope.sender.is_empty() || envelope.receiver.is_empty() {
            return Err(ProtocolError::Decode {
                what: "envelope",
                reason: "sender and receiver must be set".to_string(),
            });
        }
        Ok(envelope)
    }
}

/// Routing key used by the dispatcher.
///
/// `correlation_id: None` matches any conversation for the address and topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub address: String,
    pub performative: Performative,
    pub ontology: Ontology,
    pub correlation_id: Option<Uuid>,
}

impl Route {
    pub fn any(address: impl Into<String>, performative: Performative, ontology: Ontology) -> Self {
        Self {
            address: address.into(),
            performative,
            ontology,
            correlation_id: None,
        }
    }

    pub fn correlated(
        address: impl Into<String>,
        performative: Performative,
        ontology: Ontology,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            address: address.into(),
            performative,
            ontology,
            correlation_id: Some(correlation_id),
        }
    }

    /// Exact route an envelope is delivered to first.
    pub fn exact_for(envelope: &Envelope) -> Self {
        Self::correlated(
            envelope.receiver.clone(),
            envelope.performative,
            envelope.ontology,
            envelope.correlation_id,
        )
    }

    /// Fallback route ignoring the correlation id.
    pub fn wildcard_for(envelope: &Envelope) -> Self {
        Self::any(
            envelope.receiver.clone(),
            envelope.performative,
            envelope.ontology,
        )
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.correlation_id {
            Some(id) => write!(
                f,
                "{}/{}/{:?}/{}",
                self.address, self.performative, self.ontology, id
            ),
            None => write!(
                f,
                "{}/{}/{:?}/*",
                self.address, self.performative, self.ontology
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> Envelope {
        Envelope::request(
            "optimizer",
            "worker-1",
            Ontology::CostComputation,
            Uuid::new_v4(),
            "[[2,4]]".to_string(),
        )
    }

    #[test]
    fn test_reply_swaps_addresses_and_keeps_correlation() {
        let request = sample_request();
        let reply = request.reply("[1.0]".to_string());

        assert_eq!(reply.sender, "worker-1");
        assert_eq!(reply.receiver, "optimizer");
        assert_eq!(reply.performative, Performative::Reply);
        assert_eq!(reply.correlation_id, request.correlation_id);
        assert_eq!(reply.ontology, Ontology::CostComputation);
    }

    #[test]
    fn test_failure_carries_reason() {
        let failure = sample_request().failure("bad payload");
        assert_eq!(failure.performative, Performative::Failure);
        assert_eq!(failure.body, "bad payload");
    }

    #[test]
    fn test_envelope_encode_decode() {
        let request = sample_request().with_answer("yes");
        let raw = request.encode().unwrap();
        let decoded = Envelope::decode(&raw).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_decode_rejects_unknown_performative() {
        let raw = r#"{"sender":"a","receiver":"b","performative":"propose","ontology":"decision","correlation_id":"67e55044-10b1-426f-9247-bb680e5fe0c8","body":""}"#;
        assert!(matches!(
            Envelope::decode(raw),
            Err(ProtocolError::Decode { what: "envelope", .. })
        ));
    }

    #[test]
    fn test_decode_rejects_missing_receiver() {
        let raw = r#"{"sender":"a","receiver":"","performative":"request","ontology":"decision","correlation_id":"67e55044-10b1-426f-9247-bb680e5fe0c8","body":""}"#;
        assert!(Envelope::decode(raw).is_err());
    }

    #[test]
    fn test_routes_for_envelope() {
        let request = sample_request();
        let exact = Route::exact_for(&request);
        let wildcard = Route::wildcard_for(&request);

        assert_eq!(exact.correlation_id, Some(request.correlation_id));
        assert_eq!(wildcard.correlation_id, None);
        assert_eq!(exact.address, wildcard.address);
    }
}
